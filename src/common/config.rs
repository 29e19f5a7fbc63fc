//! Runtime configuration loaded from defaults, an optional JSON settings file
//! and the process environment, in that order of precedence (last wins).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::error::{ClientError, ClientResult};

pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:5000/";
pub const DEFAULT_SETTINGS_FILE: &str = "connection_settings.json";

/// Popularity window applied by the preprocessor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrunePolicy {
    pub enabled: bool,
    pub min_user_ratings: usize,
    pub max_user_ratings: usize,
    /// Item-side window; `None` leaves items unfiltered.
    pub item_window: Option<(usize, usize)>,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            min_user_ratings: 5,
            max_user_ratings: 1000,
            item_window: None,
        }
    }
}

impl PrunePolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Train/test partitioning parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitPolicy {
    pub test_fraction: f64,
    /// Replacement for training ratings that are exactly zero.
    pub zero_epsilon: f64,
    /// Fixed seed for reproducible splits; fresh entropy when unset.
    pub seed: Option<u64>,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            zero_epsilon: 1e-6,
            seed: None,
        }
    }
}

/// Snapshot of configuration values consumed by the client.
#[derive(Clone, Debug, PartialEq)]
pub struct AppCfg {
    /// Registry base URL, always ending in `/`.
    pub registry_url: String,
    pub timeout_secs: u64,
    /// Directory holding the cached identifier manifest.
    pub cache_dir: PathBuf,
    pub log_filter: String,
    pub log_json: bool,
    pub prune: PrunePolicy,
    pub split: SplitPolicy,
    pub repetitions: usize,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            timeout_secs: 30,
            cache_dir: PathBuf::from(".camels"),
            log_filter: "info".to_string(),
            log_json: false,
            prune: PrunePolicy::default(),
            split: SplitPolicy::default(),
            repetitions: 1,
        }
    }
}

/// On-disk settings; every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    #[serde(rename = "server-ip")]
    server_ip: Option<String>,
    timeout_secs: Option<u64>,
    cache_dir: Option<PathBuf>,
    log: Option<String>,
    log_json: Option<bool>,
    prune: Option<PrunePolicy>,
    split: Option<SplitPolicy>,
    repetitions: Option<usize>,
}

impl AppCfg {
    /// Create a configuration snapshot from the settings file and the process environment.
    pub fn load() -> ClientResult<Self> {
        let settings = env::var("CAMELS_SETTINGS").unwrap_or_else(|_| DEFAULT_SETTINGS_FILE.to_string());
        let mut cfg = Self::default();
        let path = Path::new(&settings);
        if path.exists() {
            cfg.merge_file(path)?;
        }
        cfg.merge_env(|key| env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay values found in a JSON settings file.
    pub fn merge_file(&mut self, path: &Path) -> ClientResult<()> {
        let raw = fs::read_to_string(path)?;
        let file: SettingsFile = serde_json::from_str(&raw).map_err(|err| {
            ClientError::configuration(format!("invalid settings file {}: {err}", path.display()))
        })?;

        if let Some(url) = file.server_ip {
            self.registry_url = normalise_url(&url);
        }
        if let Some(timeout) = file.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(dir) = file.cache_dir {
            self.cache_dir = dir;
        }
        if let Some(filter) = file.log {
            self.log_filter = filter;
        }
        if let Some(json) = file.log_json {
            self.log_json = json;
        }
        if let Some(prune) = file.prune {
            self.prune = prune;
        }
        if let Some(split) = file.split {
            self.split = split;
        }
        if let Some(repetitions) = file.repetitions {
            self.repetitions = repetitions;
        }
        Ok(())
    }

    /// Overlay environment variables, read through `lookup` so tests need not touch the process env.
    pub fn merge_env<F>(&mut self, lookup: F) -> ClientResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CAMELS_REGISTRY_URL") {
            self.registry_url = normalise_url(&url);
        }
        if let Some(timeout) = lookup("CAMELS_TIMEOUT_SECS") {
            self.timeout_secs = timeout.trim().parse().map_err(|_| {
                ClientError::configuration(format!("CAMELS_TIMEOUT_SECS is not a number: {timeout}"))
            })?;
        }
        if let Some(dir) = lookup("CAMELS_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup("CAMELS_LOG") {
            self.log_filter = filter;
        }
        Ok(())
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.registry_url.trim_end_matches('/').is_empty() {
            return Err(ClientError::configuration("registry url cannot be empty"));
        }
        if !(self.split.test_fraction > 0.0 && self.split.test_fraction < 1.0) {
            return Err(ClientError::configuration("test_fraction must lie in (0, 1)"));
        }
        if !(self.split.zero_epsilon > 0.0) {
            return Err(ClientError::configuration("zero_epsilon must be positive"));
        }
        if self.prune.min_user_ratings > self.prune.max_user_ratings {
            return Err(ClientError::configuration("user rating window is inverted"));
        }
        if let Some((lo, hi)) = self.prune.item_window {
            if lo > hi {
                return Err(ClientError::configuration("item rating window is inverted"));
            }
        }
        if self.repetitions == 0 {
            return Err(ClientError::configuration("repetitions must be at least 1"));
        }
        Ok(())
    }

    /// Path of the cached identifier manifest.
    pub fn manifest_path(&self) -> PathBuf {
        self.cache_dir.join("identifier_manifest.json")
    }
}

fn normalise_url(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
