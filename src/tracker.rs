use crate::detection::Detection;
use crate::detector::{filter_detections, Detector, DetectorConfig};
use crate::error::Error;
use crate::frame::FrameStore;
use crate::pipeline::CancelToken;
use crate::scene::{IdSequence, Scene};
use crate::track::{ObjectClass, Track, TrackTable, BALL_ID};

use serde_derive::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a detection to continue a track.
    pub match_iou_threshold: f32,
    /// Frames a track may stay unseen before it is retired.
    pub max_age: usize,
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_iou_threshold: 0.1,
            max_age: 30,
            history_len: 4,
        }
    }
}

pub struct Tracker {
    config: TrackerConfig,
    detector_config: DetectorConfig,
    detector: Arc<dyn Detector>,
}

impl Tracker {
    pub fn new(
        config: TrackerConfig,
        detector_config: DetectorConfig,
        detector: Arc<dyn Detector>,
    ) -> Self {
        Self {
            config,
            detector_config,
            detector,
        }
    }

    /// Runs the detector over every frame and builds the track table.
    ///
    /// A failing detector call only costs that frame its detections.
    pub fn track(&self, frames: &FrameStore, cancel: &CancelToken) -> Result<TrackTable, Error> {
        let mut table = TrackTable::with_frames(frames.len());
        let mut ids = IdSequence::new();

        let mut players = self.scene(ObjectClass::Player);
        let mut referees = self.scene(ObjectClass::Referee);

        for frame in frames.iter() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(frame.index));
            }

            let raw = match self.detector.detect(frame) {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(frame = frame.index, %err, "detection failed, frame left empty");
                    Vec::new()
                }
            };

            let dets = filter_detections(&self.detector_config, &raw);

            let mut player_dets = Vec::new();
            let mut referee_dets = Vec::new();
            let mut ball: Option<Detection> = None;

            for det in dets {
                match self.detector_config.object_class(det.class) {
                    Some(ObjectClass::Player) => player_dets.push(det),
                    Some(ObjectClass::Referee) => referee_dets.push(det),
                    Some(ObjectClass::Ball) => {
                        if ball.map_or(true, |b| det.confidence > b.confidence) {
                            ball = Some(det);
                        }
                    }
                    None => {}
                }
            }

            for (id, bbox) in players.update(frame.index, &player_dets, &mut ids) {
                table.insert(frame.index, Track::new(id, ObjectClass::Player, bbox));
            }

            for (id, bbox) in referees.update(frame.index, &referee_dets, &mut ids) {
                table.insert(frame.index, Track::new(id, ObjectClass::Referee, bbox));
            }

            if let Some(ball) = ball {
                table.insert(
                    frame.index,
                    Track::new(BALL_ID, ObjectClass::Ball, ball.ltrb()),
                );
            }

            debug!(
                frame = frame.index,
                players = player_dets.len(),
                referees = referee_dets.len(),
                ball = ball.is_some(),
                "frame tracked"
            );
        }

        info!(
            frames = frames.len(),
            players = table.ids(ObjectClass::Player).count(),
            referees = table.ids(ObjectClass::Referee).count(),
            "tracking finished"
        );

        Ok(table)
    }

    fn scene(&self, class: ObjectClass) -> Scene {
        Scene::new(
            class,
            self.config.match_iou_threshold,
            self.config.max_age,
            self.config.history_len,
        )
    }
}

/// Fills ball gaps between two detections by linear interpolation of the box.
/// Gaps before the first and after the last detection stay empty.
pub fn interpolate_ball(table: &mut TrackTable) {
    let known: Vec<_> = (0..table.len())
        .filter_map(|f| {
            table
                .ball(f)
                .filter(|b| !b.interpolated)
                .map(|b| (f, b.bbox))
        })
        .collect();

    let mut filled = 0;
    for pair in known.windows(2) {
        let (a, a_box) = pair[0];
        let (b, b_box) = pair[1];

        for f in a + 1..b {
            let factor = (f - a) as f32 / (b - a) as f32;
            let mut ball = Track::new(BALL_ID, ObjectClass::Ball, a_box.lerp(&b_box, factor));
            ball.interpolated = true;

            table.insert(f, ball);
            filled += 1;
        }
    }

    debug!(detected = known.len(), filled, "ball interpolated");
}

/// Writes the raw pixel anchor of every entry.
pub fn add_positions(table: &mut TrackTable) {
    for (_, track) in table.iter_mut() {
        track.position = Some(track.anchor());
    }
}
