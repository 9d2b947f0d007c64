use crate::track::{ObjectClass, TrackId, TrackTable};

use nalgebra as na;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

const MPS_TO_KMH: f32 = 3.6;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub frame_window: usize,
    pub frame_rate: f32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            frame_window: 5,
            frame_rate: 24.0,
        }
    }
}

/// Speed and cumulative distance of one track over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
struct WindowSample {
    speed: f32,
    distance: f32,
}

pub struct SpeedDistanceEstimator {
    config: SpeedConfig,
}

impl SpeedDistanceEstimator {
    pub fn new(config: SpeedConfig) -> Self {
        Self { config }
    }

    /// Frame ranges `start..=end` of consecutive windows; a window's last frame
    /// is the next window's first.
    fn windows(&self, n: usize) -> Vec<(usize, usize)> {
        let w = self.config.frame_window.max(1);
        let last = n.saturating_sub(1);
        if last == 0 {
            return vec![(0, 0)];
        }

        (0..last)
            .step_by(w)
            .map(|s| (s, (s + w).min(last)))
            .collect()
    }

    fn track_samples(
        &self,
        table: &TrackTable,
        id: TrackId,
        windows: &[(usize, usize)],
    ) -> Vec<WindowSample> {
        let mut total = 0.0;

        windows
            .iter()
            .map(|&(start, end)| {
                let known = |f: &usize| {
                    table
                        .get(*f, id)
                        .and_then(|t| t.position_transformed)
                        .map(|p| (*f, p))
                };

                let first = (start..=end).find_map(|f| known(&f));
                let last = (start..=end).rev().find_map(|f| known(&f));

                let speed = match (first, last) {
                    (Some((f0, p0)), Some((f1, p1))) if f1 > f0 => {
                        let d = na::distance(&p0, &p1);
                        let elapsed = (f1 - f0) as f32 / self.config.frame_rate;
                        total += d;

                        d / elapsed * MPS_TO_KMH
                    }
                    _ => 0.0,
                };

                WindowSample {
                    speed,
                    distance: total,
                }
            })
            .collect()
    }

    /// Writes `speed` (km/h) and `distance` (m) onto every player entry.
    pub fn annotate(&self, table: &mut TrackTable) {
        let n = table.len();
        if n == 0 {
            return;
        }

        let windows = self.windows(n);
        let ids: Vec<TrackId> = table.ids(ObjectClass::Player).collect();

        let samples: Vec<(TrackId, Vec<WindowSample>)> = {
            let table = &*table;

            ids.par_iter()
                .map(|&id| (id, self.track_samples(table, id, &windows)))
                .collect()
        };

        let last_window = windows.len() - 1;
        for (id, per_window) in samples {
            for (wi, (&(start, end), sample)) in windows.iter().zip(&per_window).enumerate() {
                let stop = if wi == last_window { end + 1 } else { end };

                for f in start..stop {
                    if let Some(track) = table.get_mut(f, id) {
                        track.speed = Some(sample.speed);
                        track.distance = Some(sample.distance);
                    }
                }
            }
        }

        debug!(players = ids.len(), windows = windows.len(), "speed annotated");
    }
}
