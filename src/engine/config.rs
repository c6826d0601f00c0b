// Scene description loaded from JSON. Every field is optional; missing
// fields fall back to the reference scene.

use std::path::{Path, PathBuf};

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::geometry::{CurveSide, CurveSpec, Dimensions};
use super::palette::{Color, ColorSegment, UsageType};
use super::surface::FloorProps;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read scene file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Malformed JSON, unknown usage names and bad hex colors all land here.
    #[error("invalid scene description: {0}")]
    Json(#[from] serde_json::Error),
}

/// One legend entry: either a palette usage name, or explicit colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SegmentConfig {
    Explicit {
        light: Color,
        dark: Color,
        #[serde(default)]
        usage: Option<UsageType>,
    },
    Usage(UsageType),
}

impl SegmentConfig {
    pub fn to_segment(&self) -> ColorSegment {
        match *self {
            SegmentConfig::Explicit { light, dark, usage } => ColorSegment { light, dark, usage },
            SegmentConfig::Usage(usage) => ColorSegment::from_usage(usage),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub dims: Dimensions,
    pub segments: Vec<SegmentConfig>,
    pub curve: CurveSpec,
    pub auto_rotate: bool,
    pub rig_position: [f32; 3],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            dims: Dimensions::new(3.0, 1.0, 3.0),
            segments: [UsageType::Parking, UsageType::House, UsageType::Others]
                .into_iter()
                .map(SegmentConfig::Usage)
                .collect(),
            curve: CurveSpec { side: CurveSide::Front, amount: 0.5 },
            auto_rotate: false,
            rig_position: [0.0, 0.5, 0.0],
        }
    }
}

impl SceneConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: SceneConfig = serde_json::from_str(text)?;
        log::debug!(
            "scene config: dims {:?}, {} segments, curve {:?}",
            config.dims,
            config.segments.len(),
            config.curve
        );
        Ok(config)
    }

    /// Initial floor props. Nothing starts selected.
    pub fn to_props(&self) -> FloorProps {
        FloorProps {
            dims: self.dims,
            segments: self.segments.iter().map(SegmentConfig::to_segment).collect(),
            selected: false,
            curve: self.curve,
        }
    }

    pub fn rig_position(&self) -> Vec3 {
        Vec3::from_array(self.rig_position)
    }
}
