//! Engine configuration consumed by the drawing system.
//!
//! Replaces a process-wide configuration singleton: the host builds an
//! [`EngineConfig`] (usually from YAML) and hands it to
//! [`DrawingSystem::initialize`](crate::DrawingSystem::initialize).

use crate::device::DeviceType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid surface size {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Opaque native window handle supplied by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

/// Application surface settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Device pixel width of the presentation surface.
    pub width: u32,
    /// Device pixel height of the presentation surface.
    pub height: u32,
    pub window: Option<WindowHandle>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            window: None,
        }
    }
}

impl AppConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Multisample anti-aliasing setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Msaa {
    #[default]
    Disable,
    X2,
    X4,
    X8,
}

impl Msaa {
    pub fn sample_count(self) -> u32 {
        match self {
            Self::Disable => 1,
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }

    /// Sample quality handed to the backend: 0 without multisampling, 1 otherwise.
    pub fn sample_quality(self) -> u32 {
        match self {
            Self::Disable => 0,
            _ => 1,
        }
    }
}

/// Graphics backend settings.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub device: DeviceType,
    pub msaa: Msaa,
}

/// Full configuration handed to the drawing system.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub graphics: GraphicsConfig,
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&source)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_yaml()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.app.width == 0 || self.app.height == 0 {
            return Err(ConfigError::InvalidDimensions {
                width: self.app.width,
                height: self.app.height,
            });
        }
        Ok(())
    }
}
