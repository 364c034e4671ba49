//! CLI interface for bucket-sync: command parsing and the async `run` entrypoint.
//!
//! All sync logic lives in the library modules; this module only wires a loaded
//! config file, the local file source and an object store together.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::contract::ObjectStore;
use crate::discover::file_stream;
use crate::load_config::{load_config, StoreTarget};
use crate::manifest::JsonManifestStore;
use crate::synchronise::synchronise;
use crate::upload::{HttpObjectStore, LocalObjectStore};

/// CLI for bucket-sync: publish a directory to an object-storage bucket, incrementally.
#[derive(Parser)]
#[clap(
    name = "bucket-sync",
    version,
    about = "Incrementally publish a local directory to an object-storage bucket"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the source directory to the bucket using the given config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Ignore the cached manifest and upload everything
        #[clap(long)]
        force: bool,
        /// Never delete remote objects
        #[clap(long)]
        no_clean: bool,
        /// Report what would change without touching the bucket or the cache
        #[clap(long)]
        simulate: bool,
        /// Source directory, overriding `source.dir`
        #[clap(long)]
        source: Option<PathBuf>,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync {
            config,
            force,
            no_clean,
            simulate,
            source,
        } => {
            let config = load_config(config)?;
            let mut options = config.sync_options()?;
            options.force |= force;
            options.no_clean |= no_clean;
            options.simulate |= simulate;

            let target = config.store_target()?;
            let (source_dir, exclude) = match (source, config.source) {
                (Some(dir), section) => (
                    dir,
                    section.map(|s| s.exclude).unwrap_or_else(|| vec![".git".to_string()]),
                ),
                (None, Some(section)) => (section.dir, section.exclude),
                (None, None) => {
                    tracing::error!(command = "sync", "No source directory configured");
                    anyhow::bail!("source.dir or --source must be set");
                }
            };

            let store: Box<dyn ObjectStore> = match target {
                StoreTarget::Http { endpoint } => Box::new(
                    HttpObjectStore::new_from_env(&endpoint, options.bucket.clone())
                        .map_err(|e| anyhow::anyhow!("Failed to set up HTTP store: {e}"))?,
                ),
                StoreTarget::Local { root } => Box::new(LocalObjectStore::new(root)),
            };
            let manifests = JsonManifestStore::new(options.cache_file.clone());

            tracing::info!(command = "sync", source = %source_dir.display(), "Starting synchronisation process");
            let files = file_stream(source_dir, exclude);
            let report = synchronise(&*store, &manifests, options, files).await?;

            println!("{report}");
            if report.is_success() {
                tracing::info!(command = "sync", "Synchronisation complete");
                Ok(())
            } else {
                tracing::error!(command = "sync", "Synchronisation finished with errors");
                Err(anyhow::anyhow!("Synchronisation finished with errors"))
            }
        }
    }
}
