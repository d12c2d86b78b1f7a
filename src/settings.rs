//! Viewer settings with persistence
//!
//! Settings are saved to `~/.config/vrf/settings.toml`

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use vrf_assets::LoaderConfig;
use vrf_render::RenderConfig;

/// All viewer settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub loader: LoaderConfig,
    pub eye_buffer: RenderConfig,
    pub device: DeviceSettings,
    pub frames: FrameSettings,
}

impl ViewerSettings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vrf"))
    }

    /// Get the settings file path
    fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine config directory");
            return Self::default();
        };

        if !path.exists() {
            info!("No settings file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                warn!("Failed to parse settings: {}, using defaults", e);
                Self::default()
            }),
            Err(e) => {
                warn!("Failed to read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(dir) = Self::config_dir() else {
            anyhow::bail!("Could not determine config directory");
        };

        let path = dir.join("settings.toml");

        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }
}

/// Capabilities reported by the headless device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Highest MSAA sample count the device accepts
    pub max_samples: u32,
    /// Whether layered multiview rendering is available
    pub multiview: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            max_samples: 4,
            multiview: true,
        }
    }
}

/// Frame loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    /// Milliseconds between frames
    pub interval_ms: u64,
    /// Stop after this many frames even if loads are still pending
    pub max_frames: u64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            interval_ms: 16,
            max_frames: 1800, // 30 seconds at 60 Hz
        }
    }
}
