//! Render configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::util::{Error, Result};

/// Everything a render needs besides the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    // Image
    pub width: u32,
    pub height: u32,
    pub passes: usize,

    // Paths
    pub scene: PathBuf,
    pub output: PathBuf,
    pub kernel: PathBuf,
    pub entry_point: String,

    // Device (adapter index, None = default adapter)
    pub device: Option<usize>,

    // Tuning
    pub leaf_size: usize,
    pub eta_warmup_secs: f64,
    pub seed: u64,
    pub tonemap_exposure: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
            passes: 64,
            scene: PathBuf::from("scene"),
            output: PathBuf::from("render.ppm"),
            kernel: PathBuf::from("kernel.wgsl"),
            entry_point: "main".to_string(),
            device: None,
            leaf_size: 2,
            eta_warmup_secs: 5.0,
            seed: 0,
            tonemap_exposure: 0.18,
        }
    }
}

impl RenderConfig {
    /// Per-user config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("epsilon");
            p.push("render.json");
            p
        })
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.passes == 0 {
            return Err(Error::Config("pass count must be non-zero".into()));
        }
        if self.entry_point.is_empty() {
            return Err(Error::Config("entry point name is empty".into()));
        }
        if !self.eta_warmup_secs.is_finite() || self.eta_warmup_secs < 0.0 {
            return Err(Error::Config(format!(
                "invalid ETA warm-up {}",
                self.eta_warmup_secs
            )));
        }
        Ok(())
    }
}
