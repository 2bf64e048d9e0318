//! Config module.
//! Manages I/O for board_fit.json (metadata location, result storage, export folder, anchor).
//! Uses serde for JSON serialization; every field falls back to its default when absent.
//! Precedence: defaults < board_fit.json < BOARD_FIT_* environment < CLI flags.
//! A missing config file is fine, a malformed one is an error.

use crate::compose::Anchor;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "board_fit.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub metadata_path: PathBuf,
    /// Root that board paths in the metadata are relative to.
    pub assets_root: PathBuf,
    pub boards_dir: PathBuf,
    pub results_dir: PathBuf,
    pub storage_key: String,
    pub export_dir: PathBuf,
    pub export_file_name: String,
    pub anchor: Anchor,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metadata_path: PathBuf::from("assets/boards/boards_metadata.json"),
            assets_root: PathBuf::from("."),
            boards_dir: PathBuf::from("assets/boards"),
            results_dir: PathBuf::from(".board_fit"),
            storage_key: "fitResults".to_string(),
            export_dir: PathBuf::from("exports"),
            export_file_name: "board_fit_results.json".to_string(),
            anchor: Anchor::default(),
        }
    }
}

impl Config {
    /// Loads `path` if it exists, then applies environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Config = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config {}", path.display()))?
        } else {
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("BOARD_FIT_METADATA") {
            self.metadata_path = v.into();
        }
        if let Some(v) = var("BOARD_FIT_ASSETS_ROOT") {
            self.assets_root = v.into();
        }
        if let Some(v) = var("BOARD_FIT_RESULTS_DIR") {
            self.results_dir = v.into();
        }
        if let Some(v) = var("BOARD_FIT_EXPORT_DIR") {
            self.export_dir = v.into();
        }
    }
}
