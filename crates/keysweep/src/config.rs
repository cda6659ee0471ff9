//! Runtime configuration.
//!
//! A JSON config file supplies the account's data directory, the client
//! platform/version, and optionally pre-extracted keys; CLI flags override
//! file values field by field. A present `data_key` skips extraction
//! entirely.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{ExtractError, ExtractResult};
use crate::model::Platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory containing `db_storage/` and image files.
    pub data_dir: Option<PathBuf>,
    /// Client platform the data directory belongs to.
    pub platform: Option<Platform>,
    /// Client major version (3 or 4).
    pub version: Option<u8>,
    /// Pre-supplied data key (hex or `derived:`-prefixed); skips extraction.
    pub data_key: Option<String>,
    /// Pre-supplied image key (hex).
    pub img_key: Option<String>,
}

impl Config {
    /// Load from a JSON file; a missing path yields the default config.
    pub fn load(path: Option<&Path>) -> ExtractResult<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| ExtractError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Overlay `overrides` on top of this config; set fields win.
    pub fn merge(mut self, overrides: Config) -> Config {
        if overrides.data_dir.is_some() {
            self.data_dir = overrides.data_dir;
        }
        if overrides.platform.is_some() {
            self.platform = overrides.platform;
        }
        if overrides.version.is_some() {
            self.version = overrides.version;
        }
        if overrides.data_key.is_some() {
            self.data_key = overrides.data_key;
        }
        if overrides.img_key.is_some() {
            self.img_key = overrides.img_key;
        }
        self
    }

    /// The data directory, required for every operation.
    pub fn data_dir(&self) -> ExtractResult<&Path> {
        self.data_dir
            .as_deref()
            .ok_or(ExtractError::MissingConfig("data_dir"))
    }

    /// Platform, defaulting to the host OS.
    pub fn platform(&self) -> Platform {
        self.platform.unwrap_or({
            if cfg!(target_os = "macos") {
                Platform::Darwin
            } else {
                Platform::Windows
            }
        })
    }

    /// Client major version, defaulting to the current generation.
    pub fn version(&self) -> u8 {
        self.version.unwrap_or(4)
    }
}
