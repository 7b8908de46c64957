//! Sidecar metadata describing a built store.
//!
//! Values carry no width information of their own, so every build records the
//! vector size and encoding next to the store files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec;
use crate::error::{EmstoreError, Result};
use crate::sniffer::FormatDescriptor;

/// File name of the manifest inside the destination directory.
pub const MANIFEST_FILE: &str = "emstore-manifest.json";

/// What a reader needs to decode the values of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Components per vector.
    pub vector_size: usize,

    /// Whether the source started with a fastText header.
    pub has_header_line: bool,

    /// Records committed by the build.
    pub records: u64,

    /// Value encoding.
    pub encoding: String,
}

impl Manifest {
    /// Describe a store built under `descriptor`.
    pub fn new(descriptor: FormatDescriptor, records: u64) -> Self {
        Self {
            vector_size: descriptor.vector_size,
            has_header_line: descriptor.has_header_line,
            records,
            encoding: codec::ENCODING_NAME.to_string(),
        }
    }

    /// Write the manifest into `dir`, replacing any previous one.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<()> {
        let path = dir.as_ref().join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, &path)?;

        debug!("Wrote manifest {}", path.display());
        Ok(())
    }

    /// Read the manifest from `dir`.
    pub fn read(dir: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(dir.as_ref().join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Decode one value of the described store.
    pub fn decode(&self, value: &[u8]) -> Result<Vec<f32>> {
        let vector = codec::decode(value)?;
        if vector.len() != self.vector_size {
            return Err(EmstoreError::SizeMismatch {
                expected: self.vector_size,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}
