//! Configuration file loading
//!
//! Settings come from a TOML file; every field has a default so a missing
//! file or a partial one is fine.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Search depth used when none is configured
pub const DEFAULT_DEPTH: u32 = 15;

/// How to launch the UCI engine
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path to the engine binary, or a name on `PATH`.
    /// Defaults to "stockfish".
    #[serde(default = "default_engine_path")]
    pub path: String,
    /// Extra command-line arguments for the engine
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_engine_path() -> String {
    "stockfish".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: default_engine_path(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Depth sent with every `go depth` command
    #[serde(default = "default_depth")]
    pub depth: u32,
}

fn default_depth() -> u32 {
    DEFAULT_DEPTH
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            depth: DEFAULT_DEPTH,
        }
    }
}

impl AnalysisConfig {
    /// Loads the configuration at `path`, or the defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the file exists but cannot be read,
    /// or [`crate::Error::Config`] if it is not valid TOML.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
