#![doc = "bucket-sync: incremental publishing of a local file set to an object-storage bucket."]

//! Unchanged files are skipped by comparing content fingerprints against a persisted
//! manifest of what was published last time; objects whose local file disappeared are
//! removed from the bucket.
//!
//! # Layout
//! - [`synchronise`]: the run orchestrator ([`synchronise::Synchroniser`]).
//! - [`diff`]: per-file classification and the delete set.
//! - [`manifest`], [`fingerprint`]: persisted state and change detection.
//! - [`contract`]: the `ObjectStore` / `ManifestStore` seams and file records.
//! - [`upload`], [`discover`], [`load_config`], [`cli`]: CLI glue.

pub mod cli;
pub mod config;
pub mod content_type;
pub mod contract;
pub mod diff;
pub mod discover;
pub mod fingerprint;
pub mod load_config;
pub mod manifest;
pub mod report;
pub mod synchronise;
pub mod upload;

pub use cli::{run, Cli, Commands};
