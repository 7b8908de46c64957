//! End-to-end store builds.
//!
//! A build moves through `Created → Opening → Streaming → Finalizing →
//! Closed`; any unrecovered error leaves it `Aborted`. Batches committed before
//! a failure stay in the store, nothing is rolled back.

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::{BuildConfig, MalformedPolicy, StoreOptions};
use crate::error::{EmstoreError, Result};
use crate::manifest::Manifest;
use crate::reader::EmbeddingStreamReader;
use crate::sniffer::{self, FormatDescriptor};
use crate::source::{Source, Streaming, open_source, select_member};
use crate::store::{RocksStore, Store};
use crate::writer::{BatchCommitWriter, EncodedRecord};

/// Lifecycle of a [`DatabaseBuildPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    /// Not started.
    Created,
    /// Inspecting the source and opening the store.
    Opening,
    /// Moving records from the source into the store.
    Streaming,
    /// Committing the last batch and closing the store.
    Finalizing,
    /// Finished; the store has been released.
    Closed,
    /// Stopped by an error.
    Aborted,
}

/// Progress of a running build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Records handed to the writer so far.
    pub records_processed: u64,

    /// Malformed records skipped so far.
    pub records_skipped: u64,

    /// Expected number of records, when configured.
    pub expected: Option<u64>,
}

impl Progress {
    /// Share of the expected records already seen.
    pub fn fraction(&self) -> Option<f64> {
        self.expected
            .filter(|&total| total > 0)
            .map(|total| (self.records_processed + self.records_skipped) as f64 / total as f64)
    }
}

/// Receives periodic [`Progress`] updates.
pub trait ProgressObserver: Send {
    /// Called every `progress_interval` records, and at the end when the
    /// final count was not just reported.
    fn on_progress(&mut self, progress: &Progress);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&Progress) + Send,
{
    fn on_progress(&mut self, progress: &Progress) {
        self(progress)
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    /// Format the source was read under.
    pub descriptor: FormatDescriptor,

    /// Records committed to the store.
    pub records_written: u64,

    /// Malformed records dropped.
    pub records_skipped: u64,

    /// Physical lines read from the source, header included.
    pub lines_read: u64,

    /// Batch commits issued.
    pub commits: u64,

    /// Wall time of the build.
    pub elapsed: Duration,

    /// Whether the build stopped early on request.
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct StreamCounts {
    processed: u64,
    skipped: u64,
    cancelled: bool,
}

/// Builds one store from one embedding source.
pub struct DatabaseBuildPipeline {
    config: BuildConfig,
    state: BuildState,
    cancel: CancellationToken,
    observer: Option<Box<dyn ProgressObserver>>,
}

impl DatabaseBuildPipeline {
    /// Create a pipeline for `config`.
    pub fn new(config: BuildConfig) -> Self {
        Self {
            config,
            state: BuildState::Created,
            cancel: CancellationToken::new(),
            observer: None,
        }
    }

    /// Stop the build when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Report progress to `observer`.
    pub fn with_progress(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Token that cancels this build.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build into a RocksDB store at the configured destination.
    pub fn run(&mut self) -> Result<BuildReport> {
        self.run_with(|path, options| RocksStore::open(path, options))
    }

    /// Build into a store produced by `open_store`.
    pub fn run_with<S, F>(&mut self, open_store: F) -> Result<BuildReport>
    where
        S: Store,
        F: FnOnce(&Path, &StoreOptions) -> Result<S>,
    {
        if self.state != BuildState::Created {
            return Err(EmstoreError::Config(
                "a pipeline can only run once".to_string(),
            ));
        }

        let result = self.execute(open_store);
        self.state = match &result {
            Ok(_) => BuildState::Closed,
            Err(e) => {
                warn!("Build aborted: {e}");
                BuildState::Aborted
            }
        };
        result
    }

    fn execute<S, F>(&mut self, open_store: F) -> Result<BuildReport>
    where
        S: Store,
        F: FnOnce(&Path, &StoreOptions) -> Result<S>,
    {
        self.config.validate()?;
        self.state = BuildState::Opening;
        info!(
            "Building store at {} from {}",
            self.config.destination_path.display(),
            self.config.source_path.display()
        );

        match open_source(&self.config.source_path)? {
            Source::Plain(file) => {
                let reader =
                    EmbeddingStreamReader::open(BufReader::new(file), self.config.vector_size)?;
                self.build(reader, open_store)
            }
            Source::Archive(mut archive) => {
                let member = select_member(&archive, self.config.archive_member.as_deref())?;
                debug!("Reading archive member {member}");

                let reader = match self.config.vector_size {
                    Some(vector_size) => EmbeddingStreamReader::open(
                        Streaming::new(archive.by_name(&member)?),
                        Some(vector_size),
                    )?,
                    None => {
                        // Members cannot seek: sample from one opening, stream from another.
                        let descriptor =
                            sniffer::sniff_prefix(&mut BufReader::new(archive.by_name(&member)?))?;
                        EmbeddingStreamReader::with_descriptor(
                            Streaming::new(archive.by_name(&member)?),
                            descriptor,
                        )
                    }
                };
                self.build(reader, open_store)
            }
        }
    }

    fn build<R, S, F>(
        &mut self,
        mut reader: EmbeddingStreamReader<R>,
        open_store: F,
    ) -> Result<BuildReport>
    where
        R: BufRead,
        S: Store,
        F: FnOnce(&Path, &StoreOptions) -> Result<S>,
    {
        let started = Instant::now();
        let descriptor = reader.descriptor();
        let destination = self.config.destination_path.clone();

        prepare_destination(&destination, self.config.overwrite)?;
        let store = open_store(&destination, &self.config.store_options())?;
        let mut writer = BatchCommitWriter::new(store, self.config.batch_size);

        self.state = BuildState::Streaming;
        let counts = match self.stream(&mut reader, &mut writer, descriptor.vector_size) {
            Ok(counts) => counts,
            Err(e) => {
                if let Err(close_err) = writer.abandon() {
                    warn!("Failed to close store after error: {close_err}");
                }
                return Err(e);
            }
        };

        self.state = BuildState::Finalizing;
        let stats = writer.close()?;
        Manifest::new(descriptor, stats.records_committed).write(&destination)?;

        let report = BuildReport {
            descriptor,
            records_written: stats.records_committed,
            records_skipped: counts.skipped,
            lines_read: reader.line_number(),
            commits: stats.commits,
            elapsed: started.elapsed(),
            cancelled: counts.cancelled,
        };
        info!(
            "Built store with {} records ({} skipped) in {:?}",
            report.records_written, report.records_skipped, report.elapsed
        );
        Ok(report)
    }

    fn stream<R, S>(
        &mut self,
        reader: &mut EmbeddingStreamReader<R>,
        writer: &mut BatchCommitWriter<S>,
        vector_size: usize,
    ) -> Result<StreamCounts>
    where
        R: BufRead,
        S: Store,
    {
        let mut counts = StreamCounts::default();
        let interval = self.config.progress_interval;
        let mut last_reported = None;

        loop {
            if self.cancel.is_cancelled() {
                warn!(
                    "Build cancelled after {} records, committing what is buffered",
                    counts.processed
                );
                counts.cancelled = true;
                break;
            }
            let Some(item) = reader.next() else {
                break;
            };

            match item {
                Ok(record) => {
                    let value = codec::encode(&record.vector, vector_size)?;
                    writer.append(EncodedRecord {
                        key: record.key,
                        value,
                    })?;
                    counts.processed += 1;
                }
                Err(e)
                    if e.is_recoverable()
                        && self.config.malformed_policy == MalformedPolicy::Skip =>
                {
                    warn!("Skipping record: {e}");
                    counts.skipped += 1;
                }
                Err(e) => return Err(e),
            }

            let seen = counts.processed + counts.skipped;
            if interval > 0 && seen % interval == 0 {
                self.report_progress(&counts);
                last_reported = Some(seen);
            }
        }

        if last_reported != Some(counts.processed + counts.skipped) {
            self.report_progress(&counts);
        }
        Ok(counts)
    }

    fn report_progress(&mut self, counts: &StreamCounts) {
        let progress = Progress {
            records_processed: counts.processed,
            records_skipped: counts.skipped,
            expected: self.config.expected_records,
        };
        match progress.fraction() {
            Some(fraction) => debug!(
                "Processed {} records ({:.1}%)",
                progress.records_processed,
                fraction * 100.0
            ),
            None => debug!("Processed {} records", progress.records_processed),
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.on_progress(&progress);
        }
    }
}

/// Run a RocksDB build on the blocking thread pool.
pub fn spawn_build(
    config: BuildConfig,
    cancel: CancellationToken,
) -> JoinHandle<Result<BuildReport>> {
    tokio::task::spawn_blocking(move || {
        DatabaseBuildPipeline::new(config)
            .with_cancellation(cancel)
            .run()
    })
}

fn prepare_destination(path: &Path, overwrite: bool) -> Result<()> {
    if overwrite && path.exists() {
        info!("Removing existing store at {}", path.display());
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}
