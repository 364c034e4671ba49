//! Manifest model and its JSON file store.
//!
//! The on-disk format is a single JSON object mapping normalized paths to quoted
//! fingerprints:
//!
//! ```json
//! {"a/b.png": "\"3858f62230ac3c915f300c664312c63\""}
//! ```
//!
//! Loading never fails: a missing, unreadable or malformed file is treated as "no prior
//! state" and yields an empty manifest, which is the normal condition on a first run.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::contract::ManifestStore;
use crate::fingerprint::Fingerprint;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to write manifest: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to serialize manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Path → fingerprint mapping describing what the bucket is known to hold.
///
/// Iteration order is the lexical order of the paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, Fingerprint>);

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<&Fingerprint> {
        self.0.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.0.contains_key(path)
    }

    /// Record `fingerprint` for `path`. A later write for the same path wins.
    pub fn insert(&mut self, path: impl Into<String>, fingerprint: Fingerprint) {
        self.0.insert(path.into(), fingerprint);
    }

    pub fn remove(&mut self, path: &str) -> Option<Fingerprint> {
        self.0.remove(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fingerprint)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, Fingerprint)> for Manifest {
    fn from_iter<I: IntoIterator<Item = (K, Fingerprint)>>(iter: I) -> Self {
        Manifest(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Read a manifest from `path`, falling back to an empty one.
pub fn load_manifest(path: &Path) -> Manifest {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "[MANIFEST] No manifest on disk, starting empty");
            return Manifest::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = ?e, "[MANIFEST] Unreadable manifest, starting empty");
            return Manifest::new();
        }
    };

    match serde_json::from_str::<Manifest>(&content) {
        Ok(manifest) => {
            info!(path = %path.display(), entries = manifest.len(), "[MANIFEST] Loaded manifest");
            manifest
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "[MANIFEST] Malformed manifest, starting empty");
            Manifest::new()
        }
    }
}

/// Write `manifest` to `path`, replacing previous contents atomically.
pub fn save_manifest(manifest: &Manifest, path: &Path) -> Result<(), ManifestError> {
    let json = serde_json::to_string_pretty(manifest)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    debug!(path = %path.display(), entries = manifest.len(), "[MANIFEST] Saved manifest");
    Ok(())
}

/// Delete the manifest at `path` if there is one and return an empty manifest.
pub fn force_reset(path: &Path) -> Manifest {
    match std::fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "[MANIFEST] Removed manifest (force)"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = ?e, "[MANIFEST] Could not remove manifest"),
    }
    Manifest::new()
}

/// [`ManifestStore`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonManifestStore {
    path: PathBuf,
}

impl JsonManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManifestStore for JsonManifestStore {
    fn load(&self) -> Manifest {
        load_manifest(&self.path)
    }

    fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        save_manifest(manifest, &self.path)
    }

    fn force_reset(&self) -> Manifest {
        force_reset(&self.path)
    }
}
