/// `load_config` module: Loads a static YAML config file into the typed [`CliConfig`] and
/// adapts it into the validated [`SyncOptions`] the sync engine runs with.
///
/// # Responsibilities
/// - Parse user-supplied YAML into type-safe structs (camelCase keys, see README)
/// - Map declarative settings (e.g. the `fileName` rewrite rule) to rich types
/// - Pick the object store the CLI talks to (`connect.endpoint` or `connect.localRoot`)
///
/// Secrets are never read from YAML: the HTTP bearer token comes from the environment,
/// see [`crate::upload::TOKEN_ENV`].
///
/// # Errors
/// Loading uses `anyhow::Error` for context-rich diagnostics surfaced at the CLI boundary.
/// Converting to [`SyncOptions`] reports [`ConfigError`]s, e.g. a missing bucket.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

use crate::config::{ConfigError, PathTransform, SyncOptions};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliConfig {
    pub connect: ConnectSection,
    pub setting: SettingSection,
    #[serde(default)]
    pub controls: ControlsSection,
    #[serde(default)]
    pub cache_options: CacheOptionsSection,
    #[serde(default)]
    pub source: Option<SourceSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectSection {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub local_root: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingSection {
    pub dir: String,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub no_clean: bool,
    #[serde(default = "default_quiet")]
    pub quiet: bool,
    #[serde(default)]
    pub simulate: bool,
    #[serde(default)]
    pub file_name: Option<FileNameRule>,
}

/// Regex rewrite applied to every normalized path.
#[derive(Debug, Deserialize)]
pub struct FileNameRule {
    pub pattern: String,
    #[serde(default)]
    pub replacement: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ControlsSection {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheOptionsSection {
    #[serde(default)]
    pub cache_file_name: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct SourceSection {
    pub dir: PathBuf,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
}

fn default_quiet() -> bool {
    true
}

fn default_exclude() -> Vec<String> {
    vec![".git".to_string()]
}

/// Where the CLI publishes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Http { endpoint: String },
    Local { root: PathBuf },
}

impl CliConfig {
    /// Validated engine options. Fails when `connect.bucket` is missing.
    pub fn sync_options(&self) -> Result<SyncOptions, ConfigError> {
        let bucket = self.connect.bucket.clone().unwrap_or_default();
        let mut options = SyncOptions::new(bucket, self.setting.dir.clone())?;
        options.force = self.setting.force;
        options.no_clean = self.setting.no_clean;
        options.quiet = self.setting.quiet;
        options.simulate = self.setting.simulate;
        options.headers = self.controls.headers.clone();
        if let Some(rule) = &self.setting.file_name {
            options.path_transform = PathTransform::regex_replace(&rule.pattern, &rule.replacement)?;
        }
        if let Some(cache_file) = &self.cache_options.cache_file_name {
            options.cache_file = cache_file.clone();
        }
        Ok(options)
    }

    pub fn store_target(&self) -> Result<StoreTarget> {
        match (&self.connect.endpoint, &self.connect.local_root) {
            (Some(endpoint), _) => Ok(StoreTarget::Http {
                endpoint: endpoint.clone(),
            }),
            (None, Some(root)) => Ok(StoreTarget::Local { root: root.clone() }),
            (None, None) => {
                error!("Neither connect.endpoint nor connect.localRoot configured");
                Err(anyhow::anyhow!(
                    "connect.endpoint or connect.localRoot must be set"
                ))
            }
        }
    }
}

/// Loads a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    match serde_yaml::from_str::<CliConfig>(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(conf)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
