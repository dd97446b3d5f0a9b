//! Application configuration.
//!
//! All options have defaults, so an empty (or missing) configuration file is valid. The file uses
//! TOML and is split into sections mirroring the pipeline stages:
//!
//! ```toml
//! [video]
//! facing = "user"
//! resolution = [1280, 720]
//!
//! [mapping]
//! landmark = "wrist"
//! scale = 5.0
//! depth = { mode = "scaled", factor = 0.01 }
//!
//! [scene]
//! marker_radius = 0.05
//! camera_distance = 5.0
//! ```
//!
//! # Environment Variables
//!
//! * `HANDMARKER_WEBCAM_NAME`: overrides `video.device`.
//! * `HANDMARKER_MODEL`: overrides `detector.model`.

use std::{env, fs, io, path::Path, path::PathBuf};

use handmarker_image::{Color, Resolution};
use serde::Deserialize;

use crate::{
    landmark::LandmarkIdx,
    mapper::{CoordinateMapper, DepthMapping},
    scene::Material,
    video::FacingMode,
};

const ENV_VAR_WEBCAM_NAME: &str = "HANDMARKER_WEBCAM_NAME";
const ENV_VAR_MODEL: &str = "HANDMARKER_MODEL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub video: VideoConfig,
    pub detector: DetectorConfig,
    pub mapping: MappingConfig,
    pub scene: SceneConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VideoConfig {
    /// Exact device name (V4L2 card name) of the camera to open.
    pub device: Option<String>,
    pub facing: FacingMode,
    /// If `true`, only cameras matching `facing` are accepted.
    pub exact_facing: bool,
    pub resolution: [u32; 2],
    pub fps: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            device: None,
            facing: FacingMode::Environment,
            exact_facing: false,
            resolution: [640, 480],
            fps: 30,
        }
    }
}

impl VideoConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.resolution[0], self.resolution[1])
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectorConfig {
    /// Path to the ONNX hand landmark model.
    pub model: PathBuf,
    /// Minimum presence confidence for a hand to be reported.
    pub presence_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/hand_landmark_full.onnx"),
            presence_threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    /// The landmark that drives the marker.
    pub landmark: LandmarkIdx,
    pub scale: f32,
    pub depth: DepthMapping,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            landmark: LandmarkIdx::IndexFingerTip,
            scale: 5.0,
            depth: DepthMapping::default(),
        }
    }
}

impl MappingConfig {
    pub fn mapper(&self) -> CoordinateMapper {
        CoordinateMapper::new(self.scale, self.depth)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneConfig {
    pub marker_radius: f32,
    pub marker_color: [u8; 3],
    pub marker_material: Material,
    pub camera_distance: f32,
    pub fov_degrees: f32,
    /// Adds a unit cube at the origin, to check that rendering works at all.
    pub test_cube: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            marker_radius: 0.2,
            marker_color: [255, 0, 255],
            marker_material: Material::Basic,
            camera_distance: 10.0,
            fov_degrees: 75.0,
            test_cube: false,
        }
    }
}

impl SceneConfig {
    pub fn marker_color(&self) -> Color {
        let [r, g, b] = self.marker_color;
        Color::from_rgb8(r, g, b)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplayConfig {
    pub resolution: [u32; 2],
    pub refresh_hz: u32,
    /// Draw the camera image behind the scene.
    pub show_video: bool,
    /// Draw the detected hand skeleton on top of the video.
    pub draw_landmarks: bool,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            resolution: [640, 480],
            refresh_hz: 60,
            show_video: true,
            draw_landmarks: true,
        }
    }
}

impl DisplayConfig {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.resolution[0], self.resolution[1])
    }
}

impl Config {
    /// Loads the configuration from `path` (or the defaults if `path` is [`None`]), applies
    /// environment variable overrides, and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let display = path.display().to_string();
                let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: display.clone(),
                    source,
                })?;
                log::debug!("loading configuration from '{display}'");
                Self::parse(&source, &display)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|var| env::var(var).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML configuration. `origin` is used in error messages.
    pub fn parse(source: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(name) = var(ENV_VAR_WEBCAM_NAME) {
            log::debug!("webcam override: `{ENV_VAR_WEBCAM_NAME}` is set to '{name}'");
            self.video.device = Some(name);
        }
        if let Some(model) = var(ENV_VAR_MODEL) {
            log::debug!("model override: `{ENV_VAR_MODEL}` is set to '{model}'");
            self.detector.model = model.into();
        }
    }

    /// Checks that all options are within their allowed ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(ok: bool, msg: &str) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::Invalid(msg.to_string()))
            }
        }

        check(
            self.video.resolution.iter().all(|&v| v > 0),
            "video.resolution must be non-zero",
        )?;
        check(self.video.fps > 0, "video.fps must be greater than zero")?;
        check(
            (0.0..=1.0).contains(&self.detector.presence_threshold),
            "detector.presence_threshold must be between 0 and 1",
        )?;
        check(
            self.mapping.scale.is_finite() && self.mapping.scale > 0.0,
            "mapping.scale must be a finite number greater than zero",
        )?;
        check(
            self.mapping.depth.is_finite(),
            "mapping.depth must use finite numbers",
        )?;
        check(
            self.scene.marker_radius.is_finite() && self.scene.marker_radius > 0.0,
            "scene.marker_radius must be a finite number greater than zero",
        )?;
        // The camera looks at the origin, so it must not sit on it.
        check(
            self.scene.camera_distance.is_finite() && self.scene.camera_distance > 0.0,
            "scene.camera_distance must be a finite number greater than zero",
        )?;
        check(
            self.scene.fov_degrees > 0.0 && self.scene.fov_degrees < 180.0,
            "scene.fov_degrees must be between 0 and 180",
        )?;
        check(
            self.display.resolution.iter().all(|&v| v > 0),
            "display.resolution must be non-zero",
        )?;
        check(
            self.display.refresh_hz > 0,
            "display.refresh_hz must be greater than zero",
        )?;
        Ok(())
    }
}
