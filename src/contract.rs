//! # contract: the seams between the sync engine and the outside world
//!
//! This module defines the two capabilities the [`Synchroniser`](crate::synchronise::Synchroniser)
//! depends on, plus the plain data records that flow through it:
//!
//! - [`ObjectStore`]: the remote bucket. Two operations only, `put` and `delete_many`.
//!   Transport, authentication, retries and timeouts belong to the implementor.
//! - [`ManifestStore`]: durable storage for the path → fingerprint manifest.
//! - [`FileRecord`]: one local file as handed over by a producer.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`, so tests can script remote behaviour and
//! count calls (`MockObjectStore`, `MockManifestStore`). The mocks are exported with the
//! default `test-export-mocks` feature so integration tests can use them too.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;

use crate::manifest::{Manifest, ManifestError};

/// Error type for the storage capability (simple boxed error, like every remote seam here).
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Payload state of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContents {
    /// A directory entry or placeholder. Passed through untouched.
    Empty,
    /// Fully materialised bytes. The only form the engine can hash and upload.
    Buffered(Vec<u8>),
    /// Content that is only available as a stream. Rejected per file.
    Streamed,
}

/// A local file as produced by a file source (directory walker, build pipeline, test).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the source root, in OS form.
    pub relative_path: PathBuf,
    pub contents: FileContents,
    /// Per-file headers. These win over the configured default headers.
    pub headers: BTreeMap<String, String>,
}

impl FileRecord {
    pub fn buffered(relative_path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: FileContents::Buffered(bytes.into()),
            headers: BTreeMap::new(),
        }
    }

    pub fn empty(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: FileContents::Empty,
            headers: BTreeMap::new(),
        }
    }

    pub fn streamed(relative_path: impl Into<PathBuf>) -> Self {
        Self {
            relative_path: relative_path.into(),
            contents: FileContents::Streamed,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.relative_path
    }
}

/// Options for a single object upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Final, merged headers (defaults, per-file headers, content type and length).
    pub headers: BTreeMap<String, String>,
}

/// Options for a batch delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Ask the backend not to echo every deleted key back.
    pub quiet: bool,
}

/// Trait for the remote bucket a file set is published to.
///
/// Keys are fully qualified destination keys (root dir + normalized path).
/// Both methods may fail; the engine decides how a failure affects the run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, fully replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8], options: &PutOptions) -> Result<(), StoreError>;

    /// Remove every object in `keys`. Absent keys are not an error.
    async fn delete_many(&self, keys: &[String], options: &DeleteOptions)
        -> Result<(), StoreError>;
}

/// Trait for durable manifest storage.
///
/// A store is bound to one location at construction; see [`JsonManifestStore`](crate::manifest::JsonManifestStore).
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait ManifestStore: Send + Sync {
    /// Read the persisted manifest. Absent or unreadable state yields an empty manifest.
    fn load(&self) -> Manifest;

    /// Persist `manifest`, fully replacing previous contents.
    fn save(&self, manifest: &Manifest) -> Result<(), ManifestError>;

    /// Drop any persisted state and return an empty manifest.
    fn force_reset(&self) -> Manifest;
}
