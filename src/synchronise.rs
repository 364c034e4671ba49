//! High-level pipeline: publishes a stream of local files to a bucket, incrementally.
//!
//! A run is driven by a [`Synchroniser`]:
//!   - On construction it validates the options and loads the previous manifest
//!     (or wipes it under `force`).
//!   - [`Synchroniser::process`] handles one file: fingerprint, classify, upload when needed,
//!     checkpoint the manifest every [`CHECKPOINT_INTERVAL`] uploads.
//!   - [`Synchroniser::finish`] persists the new manifest, removes stale objects and returns
//!     the [`SyncReport`].
//!
//! [`Synchroniser::run`] (and the [`synchronise`] shortcut) drive a whole `Stream` of file
//! records and guarantee `finish` runs exactly once, also when the stream ends early.
//!
//! # Ordering
//! Files are processed strictly one at a time in arrival order. Each upload is awaited
//! before the next file is looked at, so manifest writes and the checkpoint counter need
//! no synchronisation.
//!
//! # Error Handling
//! - Invalid options fail construction before any I/O.
//! - Per-file errors ([`SyncError::UnsupportedContent`], [`SyncError::Upload`]) are returned
//!   from `process`, recorded in the report, and do not stop the run.
//! - Cleanup and final-save errors are recorded in the report; they never undo uploads.
//! - A simulated run saves no manifest at all, neither checkpoints nor the final save, so
//!   the next real run starts from the same state.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, SyncOptions};
use crate::content_type::upload_headers;
use crate::contract::{
    DeleteOptions, FileContents, FileRecord, ManifestStore, ObjectStore, PutOptions, StoreError,
};
use crate::diff::{Classification, Decision, DiffEngine};
use crate::fingerprint::Fingerprint;
use crate::manifest::{Manifest, ManifestError};
use crate::report::{FileFailure, SyncReport};

/// Successful uploads between two manifest checkpoints.
pub const CHECKPOINT_INTERVAL: usize = 10;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Streamed content is not supported: {path}")]
    UnsupportedContent { path: String },

    #[error("Upload of {key} failed: {source}")]
    Upload { key: String, source: StoreError },

    #[error("Cleanup failed: {source}")]
    Cleanup { source: StoreError },

    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Sync metadata produced alongside a processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncRecord {
    /// Normalized (and transformed) path; the manifest key.
    pub path: String,
    pub destination: String,
    /// Headers sent with the upload. Empty for cached files.
    pub headers: BTreeMap<String, String>,
    pub fingerprint: Fingerprint,
    pub classification: Classification,
    pub decision: Decision,
    pub timestamp: DateTime<Utc>,
}

/// A file handed back by [`Synchroniser::process`].
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    pub file: FileRecord,
    /// `None` for files without content, which are passed through untouched.
    pub record: Option<SyncRecord>,
}

/// Forward-slash form of a relative path.
pub fn normalize_path(path: &Path) -> String {
    let path = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        path.into_owned()
    } else {
        path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

pub struct Synchroniser<'a, S: ?Sized, M: ?Sized> {
    store: &'a S,
    manifests: &'a M,
    options: SyncOptions,
    diff: DiffEngine,
    uploaded: usize,
    failures: Vec<FileFailure>,
    interrupted: Option<String>,
}

impl<'a, S, M> Synchroniser<'a, S, M>
where
    S: ObjectStore + ?Sized,
    M: ManifestStore + ?Sized,
{
    pub fn new(store: &'a S, manifests: &'a M, options: SyncOptions) -> Result<Self, SyncError> {
        options.validate()?;
        options.trace_loaded();

        let old = match (options.force, options.simulate) {
            (true, false) => manifests.force_reset(),
            (true, true) => Manifest::new(),
            (false, _) => manifests.load(),
        };
        info!(
            bucket = %options.bucket,
            cached_entries = old.len(),
            force = options.force,
            "[SYNC] Starting synchronisation"
        );

        let diff = DiffEngine::new(old, options.force, options.manifest_policy);
        Ok(Self {
            store,
            manifests,
            options,
            diff,
            uploaded: 0,
            failures: Vec::new(),
            interrupted: None,
        })
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// The manifest being built by this run.
    pub fn manifest(&self) -> &Manifest {
        self.diff.new_manifest()
    }

    /// Number of successful uploads so far.
    pub fn uploaded(&self) -> usize {
        self.uploaded
    }

    /// Publish one file if the bucket does not already hold its content.
    pub async fn process(&mut self, file: FileRecord) -> Result<ProcessedFile, SyncError> {
        let bytes = match &file.contents {
            FileContents::Empty => {
                debug!(path = %file.relative_path.display(), "[SYNC] No content, passing through");
                return Ok(ProcessedFile { file, record: None });
            }
            FileContents::Streamed => {
                let path = normalize_path(&file.relative_path);
                error!(path = %path, "[SYNC][ERROR] Streamed content is not supported");
                self.failures.push(FileFailure {
                    path: path.clone(),
                    reason: "streamed content is not supported".to_string(),
                });
                return Err(SyncError::UnsupportedContent { path });
            }
            FileContents::Buffered(bytes) => bytes,
        };

        let normalized = normalize_path(&file.relative_path);
        let path = self.options.path_transform.apply(&normalized);
        let fingerprint = Fingerprint::of(bytes);
        let (classification, decision) = self.diff.observe(&path, &fingerprint);
        let destination = self.options.destination_key(&path);

        if decision == Decision::Cached {
            debug!(path = %path, "[SYNC] Unchanged, skipping upload");
            let record = SyncRecord {
                path,
                destination,
                headers: BTreeMap::new(),
                fingerprint,
                classification,
                decision,
                timestamp: Utc::now(),
            };
            return Ok(ProcessedFile {
                file,
                record: Some(record),
            });
        }

        let headers = upload_headers(&self.options.headers, &file.headers, &normalized, bytes.len());
        let record = SyncRecord {
            path: path.clone(),
            destination: destination.clone(),
            headers: headers.clone(),
            fingerprint: fingerprint.clone(),
            classification,
            decision,
            timestamp: Utc::now(),
        };

        if self.options.simulate {
            info!(key = %destination, ?classification, "[SYNC][UPLOAD] Would upload (simulate)");
            self.diff.confirm(&path, &fingerprint);
            return Ok(ProcessedFile {
                file,
                record: Some(record),
            });
        }

        info!(key = %destination, size = bytes.len(), ?classification, "[SYNC][UPLOAD] Uploading");
        match self.store.put(&destination, bytes, &PutOptions { headers }).await {
            Ok(()) => {
                self.diff.confirm(&path, &fingerprint);
                self.uploaded += 1;
                if self.uploaded % CHECKPOINT_INTERVAL == 0 {
                    self.checkpoint();
                }
                Ok(ProcessedFile {
                    file,
                    record: Some(record),
                })
            }
            Err(e) => {
                error!(key = %destination, error = %e, "[SYNC][ERROR][UPLOAD] Upload failed");
                self.diff.reject(&path);
                self.failures.push(FileFailure {
                    path,
                    reason: e.to_string(),
                });
                Err(SyncError::Upload {
                    key: destination,
                    source: e,
                })
            }
        }
    }

    fn checkpoint(&self) {
        match self.manifests.save(self.diff.new_manifest()) {
            Ok(()) => info!(uploaded = self.uploaded, "[SYNC] Manifest checkpoint saved"),
            Err(e) => warn!(error = %e, "[SYNC] Manifest checkpoint failed, continuing"),
        }
    }

    /// Persist the new manifest, delete stale objects and produce the report.
    pub async fn finish(self) -> SyncReport {
        let clean = !self.options.no_clean;
        let mut report = SyncReport::from_summary(self.diff.summary(), clean);
        report.failed = self.failures;
        report.uploaded = self.uploaded;
        report.interrupted = self.interrupted;
        report.simulated = self.options.simulate;

        if self.options.simulate {
            info!("[SYNC] Simulated run, manifest not saved");
        } else if let Err(e) = self.manifests.save(self.diff.new_manifest()) {
            error!(error = %e, "[SYNC][ERROR] Failed to save manifest");
            report.manifest_error = Some(e.to_string());
        }

        if !clean {
            if !report.retained.is_empty() {
                info!(count = report.retained.len(), "[SYNC][CLEAN] Cleaning disabled, stale objects retained");
            }
        } else if !report.deleted.is_empty() {
            let keys: Vec<String> = report
                .deleted
                .iter()
                .map(|path| self.options.destination_key(path))
                .collect();
            if self.options.quiet {
                info!(count = keys.len(), "[SYNC][CLEAN] Deleting stale objects");
            } else {
                for key in &keys {
                    info!(key = %key, "[SYNC][CLEAN] Deleting stale object");
                }
            }

            if self.options.simulate {
                info!(count = keys.len(), "[SYNC][CLEAN] Would delete (simulate)");
            } else {
                let options = DeleteOptions {
                    quiet: self.options.quiet,
                };
                if let Err(e) = self.store.delete_many(&keys, &options).await {
                    let e = SyncError::Cleanup { source: e };
                    error!(error = %e, "[SYNC][ERROR][CLEAN] Failed to delete stale objects");
                    report.cleanup_error = Some(e.to_string());
                }
            }
        }

        let counts = report.counts();
        info!(
            new = counts.new,
            ignored = counts.ignored,
            replaced = counts.replaced,
            deleted = counts.deleted,
            failed = report.failed.len(),
            "[SYNC] Synchronisation finished"
        );
        match serde_json::to_string_pretty(&report) {
            Ok(json) => debug!(json = %json, "[SYNC][DEBUG] Report as JSON"),
            Err(e) => error!(error = ?e, "[SYNC][DEBUG] Failed to serialize report as JSON"),
        }
        report
    }

    /// Process every file from `files` in order, then finish.
    ///
    /// The first `Err` from the stream stops consumption; the partial manifest is still
    /// persisted and the error is recorded in [`SyncReport::interrupted`].
    pub async fn run<St, E>(mut self, files: St) -> SyncReport
    where
        St: Stream<Item = Result<FileRecord, E>>,
        E: fmt::Display,
    {
        futures::pin_mut!(files);
        while let Some(item) = files.next().await {
            match item {
                Ok(file) => {
                    if let Err(e) = self.process(file).await {
                        warn!(error = %e, "[SYNC] File failed, continuing with the next one");
                    }
                }
                Err(e) => {
                    error!(error = %e, "[SYNC][ERROR] File source failed, finishing early");
                    self.interrupted = Some(e.to_string());
                    break;
                }
            }
        }
        self.finish().await
    }
}

/// Entrypoint: synchronise `files` to `store` according to `options`.
pub async fn synchronise<S, M, St, E>(
    store: &S,
    manifests: &M,
    options: SyncOptions,
    files: St,
) -> Result<SyncReport, SyncError>
where
    S: ObjectStore + ?Sized,
    M: ManifestStore + ?Sized,
    St: Stream<Item = Result<FileRecord, E>>,
    E: fmt::Display,
{
    let synchroniser = Synchroniser::new(store, manifests, options)?;
    Ok(synchroniser.run(files).await)
}
