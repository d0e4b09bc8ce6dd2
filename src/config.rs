// src/config.rs

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Environment variable that overrides the location of `config.json`.
pub const CONFIG_ENV: &str = "MACRO_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Settings read from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Root under which `MacroData/<series>/` directories are created.
    pub data_export_path: PathBuf,
    /// WebDriver executable (chromedriver) used for the CPI scrape.
    pub chrome_driver_path: PathBuf,
    #[serde(default = "default_driver_port")]
    pub driver_port: u16,
    #[serde(default = "default_browser_args")]
    pub browser_args: Vec<String>,
    /// Timeout for waited element reads.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
}

fn default_driver_port() -> u16 {
    9515
}

fn default_browser_args() -> Vec<String> {
    vec!["--no-sandbox".to_string(), "--disable-gpu".to_string()]
}

fn default_wait_secs() -> u64 {
    5
}

impl Settings {
    /// Parse settings from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Load from `$MACRO_CONFIG`, falling back to `./config.json`.
    pub fn from_env() -> Result<Self> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }
}
