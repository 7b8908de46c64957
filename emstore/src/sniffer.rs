//! Format inference from the first lines of an embedding file.

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmstoreError, Result};
use crate::reader::{read_line, tokens, trim_line_end};
use crate::source::ByteSource;

/// Largest vector size accepted from a source.
pub const MAX_VECTOR_SIZE: usize = 4096;

/// The shape every line of a source is parsed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Number of components per vector.
    pub vector_size: usize,

    /// Whether the first line is a fastText `count dimension` header.
    pub has_header_line: bool,
}

impl FormatDescriptor {
    /// Create a descriptor, checking the vector size is usable.
    pub fn new(vector_size: usize, has_header_line: bool) -> Result<Self> {
        if vector_size == 0 || vector_size > MAX_VECTOR_SIZE {
            return Err(EmstoreError::Format(format!(
                "vector size {vector_size} outside 1..={MAX_VECTOR_SIZE}"
            )));
        }
        Ok(Self {
            vector_size,
            has_header_line,
        })
    }
}

/// Infer the format of a source, then return it to where it was.
///
/// Fails with [`EmstoreError::UnseekableSource`] when the source cannot seek
/// back; callers holding such a source must know the vector size up front.
pub fn sniff<S: ByteSource>(source: &mut S) -> Result<FormatDescriptor> {
    let start = source
        .checkpoint()
        .ok_or(EmstoreError::UnseekableSource)??;
    let descriptor = sniff_prefix(source);
    source.restore(start)?;
    descriptor
}

/// Infer the format from the first one or two lines, consuming them.
///
/// A first line of exactly two tokens is taken as a fastText header and the
/// second line is sampled instead. Keys containing spaces in the sampled line
/// inflate the inferred size; the format offers no way to tell them apart.
/// Blank lines are passed over, as the reader does.
pub fn sniff_prefix<R: BufRead>(source: &mut R) -> Result<FormatDescriptor> {
    let mut line = Vec::new();

    if !read_content_line(source, &mut line)? {
        return Err(EmstoreError::Format("empty source".to_string()));
    }

    let mut token_count = tokens(&line).count();
    let has_header_line = token_count == 2;
    if has_header_line {
        if !read_content_line(source, &mut line)? {
            return Err(EmstoreError::Format(
                "header line is not followed by any data".to_string(),
            ));
        }
        token_count = tokens(&line).count();
    }

    if token_count < 2 {
        return Err(EmstoreError::Format(format!(
            "sample line has {token_count} token(s), need a key and at least one component"
        )));
    }

    let descriptor = FormatDescriptor::new(token_count - 1, has_header_line)?;
    debug!(
        "Inferred vector size {} (header line: {})",
        descriptor.vector_size, descriptor.has_header_line
    );
    Ok(descriptor)
}

/// Describe a source whose vector size is already known.
///
/// Only a fastText header has to be detected. The first non-blank line is
/// peeked from the read buffer, nothing is consumed, so this works on sources
/// that cannot seek. Two integer tokens count as a header unless a
/// one-component vector would read the same way.
pub fn describe_with_size<R: BufRead>(
    source: &mut R,
    vector_size: usize,
) -> Result<FormatDescriptor> {
    let buffered = source.fill_buf()?;
    let first = buffered
        .split(|&byte| byte == b'\n')
        .map(trim_line_end)
        .find(|line| !line.is_empty());

    let has_header_line = vector_size != 1 && first.is_some_and(is_header_line);
    if has_header_line {
        debug!("Detected header line ahead of vectors of size {vector_size}");
    }
    FormatDescriptor::new(vector_size, has_header_line)
}

fn is_header_line(line: &[u8]) -> bool {
    let parts: Vec<&[u8]> = tokens(line).collect();
    parts.len() == 2
        && parts.iter().all(|part| {
            std::str::from_utf8(part).is_ok_and(|text| text.parse::<u64>().is_ok())
        })
}

fn read_content_line<R: BufRead>(
    source: &mut R,
    line: &mut Vec<u8>,
) -> std::io::Result<bool> {
    loop {
        if read_line(source, line)? == 0 {
            return Ok(false);
        }
        if !line.is_empty() {
            return Ok(true);
        }
    }
}
