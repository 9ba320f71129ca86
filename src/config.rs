use crate::assets::environment::LightingPreset;
use crate::scene::material::MaterialPolicy;
use std::path::{Path, PathBuf};

/// File looked up in the working directory at startup.
pub const CONFIG_FILE_NAME: &str = "jewel-viewer.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BloomSettings {
    pub enabled: bool,
    /// Luminance above which a pixel feeds the glow.
    pub threshold: f32,
    pub strength: f32,
    /// Blur radius in half-resolution pixels.
    pub radius: u32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            strength: 0.35,
            radius: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window_size: [f32; 2],
    /// Largest bounding-box dimension of a loaded model after normalization.
    pub target_model_size: f32,
    pub screenshot_dir: PathBuf,
    pub screenshot_scale: u32,
    /// Internal render resolution relative to the viewport's physical size.
    pub render_scale: f32,
    pub exposure: f32,
    pub bloom: BloomSettings,
    pub material_policy: MaterialPolicy,
    pub initial_lighting: LightingPreset,
    /// Radians per second while auto-rotate is on.
    pub auto_rotate_speed: f32,
    pub max_download_bytes: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            window_size: [1280.0, 800.0],
            target_model_size: 2.0,
            screenshot_dir: PathBuf::from("."),
            screenshot_scale: 2,
            render_scale: 0.75,
            exposure: 1.0,
            bloom: BloomSettings::default(),
            material_policy: MaterialPolicy::Uniform,
            initial_lighting: LightingPreset::Studio,
            auto_rotate_speed: 0.5,
            max_download_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str, path: &Path) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json, path)
    }

    /// Startup entry point: falls back to defaults (with a warning) on a bad file.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("{}; using default configuration", err);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config = ViewerConfig::from_json(
            r#"{ "target_model_size": 3.0, "bloom": { "strength": 0.5 } }"#,
            Path::new("inline.json"),
        )
        .unwrap();
        assert_eq!(config.target_model_size, 3.0);
        assert_eq!(config.bloom.strength, 0.5);
        assert!(config.bloom.enabled);
        assert_eq!(config.screenshot_scale, 2);
        assert_eq!(config.material_policy, MaterialPolicy::Uniform);
    }

    #[test]
    fn enums_parse_from_their_names() {
        let config = ViewerConfig::from_json(
            r#"{ "material_policy": "MetalOnly", "initial_lighting": "Sunset" }"#,
            Path::new("inline.json"),
        )
        .unwrap();
        assert_eq!(config.material_policy, MaterialPolicy::MetalOnly);
        assert_eq!(config.initial_lighting, LightingPreset::Sunset);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = ViewerConfig::from_json("{ not json", Path::new("bad.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let mut path = std::env::temp_dir();
        path.push(format!("jewel_viewer_missing_{}.json", std::process::id()));
        let config = ViewerConfig::load(&path).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn load_or_default_recovers_from_bad_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("jewel_viewer_bad_{}.json", std::process::id()));
        std::fs::write(&path, "[1, 2").unwrap();
        let config = ViewerConfig::load_or_default(&path);
        assert_eq!(config, ViewerConfig::default());
        let _ = std::fs::remove_file(&path);
    }
}
