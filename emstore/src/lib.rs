//! # Emstore
//!
//! This crate converts word-vector text corpora (GloVe, word2vec and fastText
//! text formats, optionally inside a zip archive) into an ordered key-value
//! store holding one fixed-width half-precision value per word.
//!
//! ## Features
//!
//! - **Format Inference**: Vector size and fastText headers detected from the data
//! - **Streaming**: One forward pass over arbitrarily large sources
//! - **Compact Values**: Vectors packed as little-endian binary16
//! - **Batched Commits**: Bounded memory, atomic batches, no lost trailing batch
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Store Build Pipeline                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Source ──► FormatSniffer ──► EmbeddingStreamReader             │
//! │                                      │                          │
//! │                                      ▼                          │
//! │  Store ◄── BatchCommitWriter ◄── VectorCodec                    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use emstore::{BuildConfig, DatabaseBuildPipeline};
//!
//! let config = BuildConfig::new("glove.6B.300d.zip", "glove-store").with_overwrite(true);
//! let report = DatabaseBuildPipeline::new(config).run()?;
//! println!("{} vectors written", report.records_written);
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod fan_in;
pub mod manifest;
pub mod pipeline;
pub mod reader;
pub mod sniffer;
pub mod source;
pub mod store;
pub mod writer;

pub use config::{BuildConfig, MalformedPolicy, StoreOptions};
pub use error::{EmstoreError, Result};
pub use fan_in::{IngestReport, SharedWriter};
pub use manifest::Manifest;
pub use pipeline::{
    BuildReport, BuildState, DatabaseBuildPipeline, Progress, ProgressObserver, spawn_build,
};
pub use reader::{EmbeddingStreamReader, Record};
pub use sniffer::{FormatDescriptor, MAX_VECTOR_SIZE};
pub use source::{ByteSource, Source, Streaming};
pub use store::{BatchToken, MemoryStore, RocksStore, Store};
pub use writer::{Batch, BatchCommitWriter, EncodedRecord, WriterStats};
