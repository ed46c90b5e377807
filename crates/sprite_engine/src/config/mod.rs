//! Configuration system

pub use serde::{Deserialize, Serialize};

use crate::foundation::color;

/// Maximum number of vertices a batch stages before it must flush.
///
/// Sized so the shared u16 index buffer can address every vertex: 16384
/// vertices is 4096 sprites, and the largest index written is 16383.
pub const BATCH_VERTEX_CAPACITY_MAX: usize = 16384;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Renderer startup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Initial viewport width in pixels
    pub width: u32,

    /// Initial viewport height in pixels
    pub height: u32,

    /// Staging capacity of each sprite batch, in vertices
    pub batch_vertex_capacity: usize,

    /// Packed RGBA clear color for the start of each frame
    pub background_color: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            batch_vertex_capacity: BATCH_VERTEX_CAPACITY_MAX,
            background_color: color::BLACK,
        }
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.batch_vertex_capacity, BATCH_VERTEX_CAPACITY_MAX);
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RendererConfig {
            width: 1280,
            height: 720,
            batch_vertex_capacity: 4096,
            background_color: color::WHITE,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RendererConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.width, 1280);
        assert_eq!(parsed.height, 720);
        assert_eq!(parsed.batch_vertex_capacity, 4096);
        assert_eq!(parsed.background_color, color::WHITE);
    }

    #[test]
    fn test_unsupported_format() {
        let config = RendererConfig::default();
        let err = config.save_to_file("renderer.yaml");
        assert!(matches!(err, Err(ConfigError::UnsupportedFormat(_))));
    }
}
