use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::constants::{BUILD_TOOL_NAME, DEVICE_TOOL_NAME};

/// Environment variables that override the configured tool locations.
pub const ENV_DEVICE_TOOL: &str = "HDC_PATH";
pub const ENV_BUILD_TOOL: &str = "HVIGORW_PATH";

#[derive(Debug, Deserialize, Default)]
pub struct HarmonyConfig {
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ToolsConfig {
    /// Device bridge location: an executable file or a directory holding one.
    #[serde(default = "default_hdc")]
    pub hdc: String,
    /// Build wrapper location, resolved the same way.
    #[serde(default = "default_hvigorw")]
    pub hvigorw: String,
}

fn default_hdc() -> String {
    DEVICE_TOOL_NAME.to_string()
}

fn default_hvigorw() -> String {
    format!("./{BUILD_TOOL_NAME}")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            hdc: default_hdc(),
            hvigorw: default_hvigorw(),
        }
    }
}

impl HarmonyConfig {
    pub fn load_from_file(path: &str) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        let cfg = toml::from_str::<Self>(&text)
            .with_context(|| format!("failed to parse TOML config: {path}"))?;
        Ok(cfg)
    }

    /// Loads the config file when present, otherwise starts from defaults,
    /// then applies `HDC_PATH` / `HVIGORW_PATH` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let mut cfg = if Path::new(path).is_file() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };

        if let Ok(value) = std::env::var(ENV_DEVICE_TOOL) {
            if !value.is_empty() {
                cfg.tools.hdc = value;
            }
        }
        if let Ok(value) = std::env::var(ENV_BUILD_TOOL) {
            if !value.is_empty() {
                cfg.tools.hvigorw = value;
            }
        }

        Ok(cfg)
    }
}
