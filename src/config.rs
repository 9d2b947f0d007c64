use crate::camera::CameraConfig;
use crate::detector::DetectorConfig;
use crate::error::Error;
use crate::possession::PossessionConfig;
use crate::speed::SpeedConfig;
use crate::tracker::TrackerConfig;
use crate::view::PitchConfig;

use serde_derive::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Settings of every stage. Missing sections and keys take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub camera: CameraConfig,
    pub pitch: PitchConfig,
    pub speed: SpeedConfig,
    pub possession: PossessionConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;

        Ok(config)
    }

    /// Rejects values no stage can work with. Pitch geometry is checked when
    /// the view transformer is built.
    pub fn validate(&self) -> Result<(), Error> {
        let unit = |v: f32| (0.0..=1.0).contains(&v);

        if !unit(self.detector.confidence_threshold) || !unit(self.detector.iou_threshold) {
            return Err(Error::InvalidConfig(
                "detector thresholds must be within [0, 1]".into(),
            ));
        }

        if self.detector.class_names.is_empty() {
            return Err(Error::InvalidConfig("no detector class names".into()));
        }

        if !unit(self.tracker.match_iou_threshold) {
            return Err(Error::InvalidConfig(
                "tracker match threshold must be within [0, 1]".into(),
            ));
        }

        if self.speed.frame_window == 0 {
            return Err(Error::InvalidConfig("speed frame window must be positive".into()));
        }

        if !(self.speed.frame_rate.is_finite() && self.speed.frame_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "frame rate must be positive, got {}",
                self.speed.frame_rate
            )));
        }

        let reach = self.possession.max_player_ball_distance;
        if reach.is_nan() || reach < 0.0 {
            return Err(Error::InvalidConfig(
                "possession distance must not be negative".into(),
            ));
        }

        if self.camera.background_columns.iter().any(|(s, e)| s >= e) {
            return Err(Error::InvalidConfig("empty camera background strip".into()));
        }

        Ok(())
    }
}
