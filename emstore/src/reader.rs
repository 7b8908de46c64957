//! Streaming reader for word-vector text files.
//!
//! Lines look like `key v1 v2 ... vN`, separated by single ASCII spaces. The
//! reader yields one [`Record`] per line in a single forward pass; it cannot
//! be restarted, a fresh reader over a rewound source is needed for that.

use std::io::{self, BufRead};

use tracing::debug;

use crate::error::{EmstoreError, Result};
use crate::sniffer::{self, FormatDescriptor};
use crate::source::ByteSource;

/// One key and its vector, as read from the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Raw key bytes.
    pub key: Vec<u8>,

    /// Vector components, all finite.
    pub vector: Vec<f32>,
}

/// Line-oriented iterator over embedding text.
pub struct EmbeddingStreamReader<R> {
    source: R,
    descriptor: FormatDescriptor,
    line: Vec<u8>,
    line_number: u64,
    header_pending: bool,
    finished: bool,
}

impl<S: ByteSource> EmbeddingStreamReader<S> {
    /// Create a reader, inferring the format when `vector_size` is not given.
    ///
    /// Inference rewinds the source afterwards, so it only works on sources
    /// that can seek. With an explicit `vector_size` only the header is
    /// detected, which any source supports.
    pub fn open(mut source: S, vector_size: Option<usize>) -> Result<Self> {
        let descriptor = match vector_size {
            Some(vector_size) => sniffer::describe_with_size(&mut source, vector_size)?,
            None => sniffer::sniff(&mut source)?,
        };
        Ok(Self::with_descriptor(source, descriptor))
    }
}

impl<R: BufRead> EmbeddingStreamReader<R> {
    /// Create a reader over a source whose format is already known.
    pub fn with_descriptor(source: R, descriptor: FormatDescriptor) -> Self {
        Self {
            source,
            descriptor,
            line: Vec::new(),
            line_number: 0,
            header_pending: descriptor.has_header_line,
            finished: false,
        }
    }

    /// The format this reader parses lines under.
    pub fn descriptor(&self) -> FormatDescriptor {
        self.descriptor
    }

    /// Number of physical lines consumed so far, header included.
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    fn next_line(&mut self) -> io::Result<bool> {
        if read_line(&mut self.source, &mut self.line)? == 0 {
            return Ok(false);
        }
        self.line_number += 1;
        Ok(true)
    }

    fn next_record(&mut self) -> Option<Result<Record>> {
        while self.header_pending {
            match self.next_line() {
                Ok(true) if self.line.is_empty() => continue,
                Ok(true) => debug!("Skipped header line"),
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
            }
            self.header_pending = false;
        }

        loop {
            match self.next_line() {
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
                // Blank lines carry no record.
                Ok(true) if self.line.is_empty() => continue,
                Ok(true) => {
                    return Some(parse_line(
                        &self.line,
                        self.descriptor.vector_size,
                        self.line_number,
                    ));
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for EmbeddingStreamReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = self.next_record();
        match &item {
            None => self.finished = true,
            Some(Err(e)) if !e.is_recoverable() => self.finished = true,
            Some(_) => {}
        }
        item
    }
}

/// Parse one data line (terminator already stripped).
///
/// The last `vector_size` tokens are the components. When more tokens precede
/// them than the single key token, they are joined without a separator, so
/// `New York 0.1 0.2` yields the key `NewYork`.
pub fn parse_line(line: &[u8], vector_size: usize, line_number: u64) -> Result<Record> {
    let parts: Vec<&[u8]> = tokens(line).collect();
    if parts.len() < vector_size + 1 {
        return Err(EmstoreError::MalformedRecord {
            line: line_number,
            reason: format!(
                "expected at least {} tokens, found {}",
                vector_size + 1,
                parts.len()
            ),
        });
    }

    let (key_parts, components) = parts.split_at(parts.len() - vector_size);
    let vector = components
        .iter()
        .map(|token| parse_component(token))
        .collect::<std::result::Result<Vec<f32>, String>>()
        .map_err(|reason| EmstoreError::MalformedRecord {
            line: line_number,
            reason,
        })?;

    Ok(Record {
        key: key_parts.concat(),
        vector,
    })
}

fn parse_component(token: &[u8]) -> std::result::Result<f32, String> {
    std::str::from_utf8(token)
        .ok()
        .and_then(|text| text.parse::<f32>().ok())
        .filter(|value| value.is_finite())
        .ok_or_else(|| format!("invalid number {:?}", String::from_utf8_lossy(token)))
}

/// Read one line into `buf`, dropping the terminator and trailing spaces.
///
/// Returns the number of raw bytes consumed, 0 at end of input.
pub(crate) fn read_line<R: BufRead>(source: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    buf.clear();
    let consumed = source.read_until(b'\n', buf)?;
    let kept = trim_line_end(buf).len();
    buf.truncate(kept);
    Ok(consumed)
}

/// `line` without its terminator and trailing spaces.
pub(crate) fn trim_line_end(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r' | b' '] = line {
        line = rest;
    }
    line
}

/// Split a line on the ASCII space byte.
pub(crate) fn tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|&byte| byte == b' ')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Streaming;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn collect(text: &str, vector_size: Option<usize>) -> Vec<Result<Record>> {
        EmbeddingStreamReader::open(Cursor::new(text.to_string()), vector_size)
            .unwrap()
            .collect()
    }

    #[test]
    fn test_reads_glove_lines() {
        let records: Vec<Record> = collect("the 0.1 0.2\nof -1 2.5e-1\n", None)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(
            records,
            vec![
                Record {
                    key: b"the".to_vec(),
                    vector: vec![0.1, 0.2],
                },
                Record {
                    key: b"of".to_vec(),
                    vector: vec![-1.0, 0.25],
                },
            ]
        );
    }

    #[test]
    fn test_skips_fasttext_header() {
        let records = collect("2 2\nthe 0.1 0.2\nof 0.3 0.4\n", None);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap().key, b"the".to_vec());
    }

    #[test]
    fn test_multi_token_key() {
        let record = parse_line(b"New York 0.1 0.2", 2, 1).unwrap();
        assert_eq!(record.key, b"NewYork".to_vec());
        assert_eq!(record.vector, vec![0.1, 0.2]);
    }

    #[test]
    fn test_malformed_lines_report_line_number() {
        let records = collect("the 0.1 0.2\nbad 0.1 oops\nshort 0.1\nof 0.3 0.4\n", None);
        assert_eq!(records.len(), 4);
        assert!(records[0].is_ok());
        assert!(matches!(
            records[1],
            Err(EmstoreError::MalformedRecord { line: 2, .. })
        ));
        assert!(matches!(
            records[2],
            Err(EmstoreError::MalformedRecord { line: 3, .. })
        ));
        assert!(records[3].is_ok());
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(parse_line(b"w inf 0.1", 2, 7).is_err());
        assert!(parse_line(b"w NaN 0.1", 2, 7).is_err());
    }

    #[test]
    fn test_last_line_without_newline_keeps_digits() {
        let records = collect("the 0.1 0.25", Some(2));
        assert_eq!(records[0].as_ref().unwrap().vector, vec![0.1, 0.25]);
    }

    #[test]
    fn test_explicit_size_skips_fasttext_header() {
        let records = collect("\n2 2\nhello 0.1 0.2\nworld 0.3 0.4\n", Some(2));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].as_ref().unwrap().key, b"hello".to_vec());
        assert_eq!(records[1].as_ref().unwrap().key, b"world".to_vec());
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let records = collect("the 0.1 0.2\n\nof 0.3 0.4\n\n", None);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_streaming_source_needs_vector_size() {
        let source = Streaming::new(&b"the 0.1 0.2\n"[..]);
        assert!(matches!(
            EmbeddingStreamReader::open(source, None),
            Err(EmstoreError::UnseekableSource)
        ));

        let source = Streaming::new(&b"the 0.1 0.2\n"[..]);
        let reader = EmbeddingStreamReader::open(source, Some(2)).unwrap();
        assert_eq!(reader.count(), 1);
    }
}
