//! Validated options for one sync run.
//!
//! Every recognised option lives on [`SyncOptions`], built once and validated before the
//! [`Synchroniser`](crate::synchronise::Synchroniser) touches the network or the cache file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

pub use crate::diff::ManifestPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("connect.bucket is required")]
    MissingBucket,

    #[error("invalid fileName pattern: {0}")]
    InvalidPathTransform(#[from] regex::Error),
}

/// Rewrites a normalized path before it is used as manifest key and destination suffix.
#[derive(Clone)]
pub struct PathTransform(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl PathTransform {
    pub fn new(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        PathTransform(Arc::new(f))
    }

    pub fn identity() -> Self {
        Self::new(|path: &str| path.to_owned())
    }

    /// Replace every match of `pattern` with `replacement` (`$1`-style groups allowed).
    pub fn regex_replace(pattern: &str, replacement: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(pattern)?;
        let replacement = replacement.to_owned();
        Ok(Self::new(move |path| {
            re.replace_all(path, replacement.as_str()).into_owned()
        }))
    }

    pub fn apply(&self, path: &str) -> String {
        (self.0)(path)
    }
}

impl Default for PathTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for PathTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PathTransform(..)")
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Bucket identifier. Required.
    pub bucket: String,
    /// Prefix of every destination key.
    pub root_dir: String,
    /// Ignore (and delete) the cached manifest; upload everything.
    pub force: bool,
    /// Never delete remote objects.
    pub no_clean: bool,
    /// Passed to `delete_many`; also keeps per-key deletion logging at debug level.
    pub quiet: bool,
    /// Dry run: no remote calls, no manifest writes.
    pub simulate: bool,
    pub path_transform: PathTransform,
    /// Default headers, merged under per-file headers.
    pub headers: BTreeMap<String, String>,
    /// Where the manifest is persisted.
    pub cache_file: PathBuf,
    pub manifest_policy: ManifestPolicy,
}

impl SyncOptions {
    /// Options with documented defaults: `force=false`, `no_clean=false`, `quiet=true`,
    /// `simulate=false`, identity path transform, no headers, bucket-derived cache file.
    pub fn new(bucket: impl Into<String>, root_dir: impl Into<String>) -> Result<Self, ConfigError> {
        let bucket = bucket.into();
        if bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        let cache_file = default_cache_file(&bucket);
        Ok(Self {
            bucket,
            root_dir: root_dir.into(),
            force: false,
            no_clean: false,
            quiet: true,
            simulate: false,
            path_transform: PathTransform::identity(),
            headers: BTreeMap::new(),
            cache_file,
            manifest_policy: ManifestPolicy::default(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        Ok(())
    }

    /// Remote key for a normalized path: `root_dir + "/" + path`.
    pub fn destination_key(&self, path: &str) -> String {
        let root = self.root_dir.trim_end_matches('/');
        if root.is_empty() {
            path.to_string()
        } else {
            format!("{root}/{path}")
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            bucket = %self.bucket,
            root_dir = %self.root_dir,
            force = self.force,
            no_clean = self.no_clean,
            simulate = self.simulate,
            cache_file = %self.cache_file.display(),
            "Loaded SyncOptions"
        );
        debug!(?self, "SyncOptions loaded (full debug)");
    }
}

/// Cache file name used when none is configured.
pub fn default_cache_file(bucket: &str) -> PathBuf {
    PathBuf::from(format!(".{bucket}.cache.json"))
}
