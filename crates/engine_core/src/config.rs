use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Wgpu,
    Headless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextureCacheKind {
    #[default]
    Memory,
    Disk,
}

/// Engine settings, read from a JSON file. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub assets_dir: PathBuf,
    pub app_data_dir: PathBuf,
    pub script: PathBuf,
    pub backend: BackendKind,
    pub texture_cache: TextureCacheKind,
    pub log_level: String,
    pub frames: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from("assets"),
            app_data_dir: PathBuf::from("appdata"),
            script: PathBuf::from("scripts/main.lua"),
            backend: BackendKind::default(),
            texture_cache: TextureCacheKind::default(),
            log_level: "info".to_string(),
            frames: 60,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| anyhow::anyhow!("Invalid engine config: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {}: {}", path.display(), e))?;
        Self::from_json(&text)
    }

    /// Defaults when `path` does not exist; a file that exists must parse
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}
