//! Byte sources for embedding text.
//!
//! A source path is either a zip archive holding the embedding text or the
//! plain text itself. Probing is an expected branch, so [`open_source`]
//! reports which one it found instead of failing on non-archives.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::{EmstoreError, Result};

/// A sequential byte source that may or may not be able to seek back.
pub trait ByteSource: BufRead {
    /// Current read offset, or `None` when the source cannot return to it later.
    fn checkpoint(&mut self) -> Option<io::Result<u64>>;

    /// Moves the read position back to an offset returned by [`checkpoint`].
    ///
    /// [`checkpoint`]: ByteSource::checkpoint
    fn restore(&mut self, offset: u64) -> io::Result<()>;
}

impl<R: Read + Seek> ByteSource for BufReader<R> {
    fn checkpoint(&mut self) -> Option<io::Result<u64>> {
        Some(self.stream_position())
    }

    fn restore(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn checkpoint(&mut self) -> Option<io::Result<u64>> {
        Some(Ok(self.position()))
    }

    fn restore(&mut self, offset: u64) -> io::Result<()> {
        self.set_position(offset);
        Ok(())
    }
}

/// A forward-only source, such as a compressed archive member.
pub struct Streaming<R> {
    inner: BufReader<R>,
}

impl<R: Read> Streaming<R> {
    /// Wrap a reader that cannot seek.
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }
}

impl<R: Read> Read for Streaming<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> BufRead for Streaming<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.inner.consume(amt);
    }
}

impl<R: Read> ByteSource for Streaming<R> {
    fn checkpoint(&mut self) -> Option<io::Result<u64>> {
        None
    }

    fn restore(&mut self, _offset: u64) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "streaming source cannot seek",
        ))
    }
}

/// What a source path turned out to be.
pub enum Source {
    /// Plain embedding text.
    Plain(File),

    /// A zip archive; one member holds the embedding text.
    Archive(ZipArchive<File>),
}

/// Open `path`, probing whether it is a zip archive.
pub fn open_source(path: impl AsRef<Path>) -> Result<Source> {
    let path = path.as_ref();
    let file = File::open(path)?;

    match ZipArchive::new(file) {
        Ok(archive) => {
            debug!("Opened {} as zip archive", path.display());
            Ok(Source::Archive(archive))
        }
        Err(ZipError::InvalidArchive(reason)) => {
            debug!("{} is not a zip archive ({reason}), reading as text", path.display());
            Ok(Source::Plain(File::open(path)?))
        }
        Err(e) => Err(e.into()),
    }
}

/// Pick the archive member holding the embeddings.
///
/// A lone member is used automatically; several members require the caller
/// to name one.
pub fn select_member<R: Read + Seek>(
    archive: &ZipArchive<R>,
    requested: Option<&str>,
) -> Result<String> {
    let mut names: Vec<&str> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .collect();
    names.sort_unstable();

    if let Some(requested) = requested {
        return if names.contains(&requested) {
            Ok(requested.to_string())
        } else {
            Err(EmstoreError::Archive(format!(
                "member {requested} not found, available: {}",
                names.join(", ")
            )))
        };
    }

    match names.as_slice() {
        [] => Err(EmstoreError::Archive("empty archive".to_string())),
        [only] => Ok((*only).to_string()),
        _ => Err(EmstoreError::Archive(format!(
            "multiple files in archive, specify the member to read; available: {}",
            names.join(", ")
        ))),
    }
}
