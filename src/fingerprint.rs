//! Content fingerprints used as change-detection keys.
//!
//! A fingerprint is the lowercase hex MD5 digest of the file bytes, wrapped in double
//! quotes. That is the entity-tag form object stores report for simple uploads, so a
//! cached value can be compared against a remote ETag without conversion.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint raw file bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Fingerprint(format!("\"{:x}\"", md5::compute(bytes)))
    }

    /// Wrap an already-quoted value, e.g. one read back from a manifest.
    pub fn from_quoted(value: impl Into<String>) -> Self {
        Fingerprint(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
