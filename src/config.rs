//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.campusaccess.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".campusaccess.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Hosted backend settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Session persistence settings.
    #[serde(default)]
    pub session: SessionConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Maximum number of reviews printed on a school page.
    #[serde(default = "default_max_reviews_shown")]
    pub max_reviews_shown: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            max_reviews_shown: default_max_reviews_shown(),
        }
    }
}

fn default_max_reviews_shown() -> usize {
    20
}

/// Hosted backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Project URL of the hosted backend.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Public (anon) API key.
    #[serde(default)]
    pub anon_key: String,

    /// Request timeout in seconds. Unset means the service's own timeouts apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Compute averages with the backend RPC function instead of locally.
    #[serde(default)]
    pub server_side_averages: bool,

    /// Name of the averages RPC function.
    #[serde(default = "default_averages_function")]
    pub averages_function: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: String::new(),
            timeout_seconds: None,
            server_side_averages: false,
            averages_function: default_averages_function(),
        }
    }
}

fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

fn default_averages_function() -> String {
    "get_average_ratings".to_string()
}

/// Session persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where the signed-in session is stored.
    #[serde(default = "default_session_file")]
    pub file: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            file: default_session_file(),
        }
    }
}

fn default_session_file() -> PathBuf {
    PathBuf::from(".campusaccess-session.json")
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.campusaccess.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.backend_url {
            self.backend.url = url.clone();
        }
        if let Some(ref key) = args.anon_key {
            self.backend.anon_key = key.clone();
        }
        if let Some(timeout) = args.timeout {
            self.backend.timeout_seconds = Some(timeout);
        }
        if args.server_averages {
            self.backend.server_side_averages = true;
        }
        if let Some(ref file) = args.session_file {
            self.session.file = file.clone();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
