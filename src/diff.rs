//! Diff engine: decides, file by file, whether the bucket needs an upload, and after the
//! stream ends, which previously published paths are gone.
//!
//! Two manifests are involved. The *old* manifest is the state loaded at start and is never
//! modified. The *new* manifest starts empty and gains one entry per path seen during the
//! run; once the run completes it becomes the persisted state.

use serde::Serialize;
use tracing::debug;

use crate::fingerprint::Fingerprint;
use crate::manifest::Manifest;

/// How a file compares to the previously published state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    /// Not in the old manifest.
    New,
    /// In the old manifest with the same fingerprint.
    Unchanged,
    /// In the old manifest with a different fingerprint.
    Replaced,
}

/// What to do with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The bucket already holds this content.
    Cached,
    /// The file has to be uploaded.
    Upload,
}

/// When the new manifest learns about an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestPolicy {
    /// Record an uploaded path only once `put` succeeded. A failed upload keeps the
    /// previously published fingerprint (if any), so the object is retried next run
    /// and never scheduled for deletion.
    #[default]
    Confirmed,
    /// Record every path before its upload starts. A failed upload still marks the
    /// path as known.
    Optimistic,
}

/// Paths grouped by report category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub new: Vec<String>,
    pub ignored: Vec<String>,
    pub replaced: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug)]
pub struct DiffEngine {
    old: Manifest,
    new: Manifest,
    force: bool,
    policy: ManifestPolicy,
}

impl DiffEngine {
    pub fn new(old: Manifest, force: bool, policy: ManifestPolicy) -> Self {
        Self {
            old,
            new: Manifest::new(),
            force,
            policy,
        }
    }

    /// Compare `fingerprint` against the old manifest without touching any state.
    pub fn classify(&self, path: &str, fingerprint: &Fingerprint) -> Classification {
        match self.old.get(path) {
            None => Classification::New,
            Some(previous) if previous == fingerprint => Classification::Unchanged,
            Some(_) => Classification::Replaced,
        }
    }

    /// Classify a freshly fingerprinted file and record it in the new manifest.
    ///
    /// The classification is always against the old manifest. The upload decision is
    /// against what the bucket holds now: a path already recorded earlier in this run is
    /// compared with that entry instead.
    ///
    /// Cached files are always recorded immediately. Files that need an upload are
    /// recorded now under [`ManifestPolicy::Optimistic`], or by [`confirm`](Self::confirm)
    /// under [`ManifestPolicy::Confirmed`].
    pub fn observe(&mut self, path: &str, fingerprint: &Fingerprint) -> (Classification, Decision) {
        let classification = self.classify(path, fingerprint);
        let published = self.new.get(path).or_else(|| self.old.get(path));
        let decision = if self.force || published != Some(fingerprint) {
            Decision::Upload
        } else {
            Decision::Cached
        };

        if decision == Decision::Cached || self.policy == ManifestPolicy::Optimistic {
            self.new.insert(path, fingerprint.clone());
        }

        debug!(path, ?classification, ?decision, "[SYNC][DIFF] Classified file");
        (classification, decision)
    }

    /// The upload for `path` succeeded.
    pub fn confirm(&mut self, path: &str, fingerprint: &Fingerprint) {
        self.new.insert(path, fingerprint.clone());
    }

    /// The upload for `path` failed.
    pub fn reject(&mut self, path: &str) {
        if self.policy == ManifestPolicy::Optimistic || self.new.contains(path) {
            return;
        }
        if let Some(previous) = self.old.get(path) {
            self.new.insert(path, previous.clone());
        }
    }

    /// Paths in the old manifest that this run never recorded.
    pub fn delete_set(&self) -> Vec<String> {
        self.old
            .keys()
            .filter(|path| !self.new.contains(path))
            .map(str::to_owned)
            .collect()
    }

    /// One pass over the new manifest and one over the old.
    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for (path, fingerprint) in self.new.iter() {
            match self.old.get(path) {
                None => summary.new.push(path.to_owned()),
                Some(previous) if previous == fingerprint => summary.ignored.push(path.to_owned()),
                Some(_) => summary.replaced.push(path.to_owned()),
            }
        }
        summary.deleted = self.delete_set();
        summary
    }

    pub fn old_manifest(&self) -> &Manifest {
        &self.old
    }

    pub fn new_manifest(&self) -> &Manifest {
        &self.new
    }
}
