use crate::frame::FrameStore;
use crate::math::median;
use crate::track::{Track, TrackTable};

use image::GrayImage;
use imageproc::corners::corners_fast9;
use nalgebra as na;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info};

/// Background displacement `[dx, dy]` of a frame relative to the previous one.
pub type CameraMovement = [f32; 2];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Column ranges `[start, end)` that only show background (stands,
    /// advertising boards).
    pub background_columns: Vec<(u32, u32)>,
    pub fast_threshold: u8,
    pub max_features: usize,
    pub min_feature_distance: u32,
    pub patch_radius: u32,
    pub search_radius: u32,
    /// Mean absolute intensity difference above which a match is rejected.
    pub max_patch_error: f32,
    pub min_matches: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            background_columns: vec![(0, 20), (900, 1050)],
            fast_threshold: 20,
            max_features: 100,
            min_feature_distance: 3,
            patch_radius: 3,
            search_radius: 15,
            max_patch_error: 12.0,
            min_matches: 4,
        }
    }
}

pub struct CameraMotionEstimator {
    config: CameraConfig,
}

impl CameraMotionEstimator {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    /// Per-frame camera displacement; frame 0 never moves.
    pub fn estimate(&self, frames: &FrameStore, table: &TrackTable) -> Vec<CameraMovement> {
        let grays: Vec<GrayImage> = frames
            .as_slice()
            .par_iter()
            .map(|f| image::imageops::grayscale(&f.image))
            .collect();

        let mut movements = vec![[0.0, 0.0]; grays.len()];

        let deltas: Vec<CameraMovement> = (1..grays.len())
            .into_par_iter()
            .map(|t| {
                let occupied: &[Track] = if t - 1 < table.len() {
                    table.frame(t - 1)
                } else {
                    &[]
                };

                self.displacement(&grays[t - 1], &grays[t], occupied)
            })
            .collect();

        if !deltas.is_empty() {
            movements[1..].copy_from_slice(&deltas);
        }

        let moving = movements
            .iter()
            .filter(|m| m[0] != 0.0 || m[1] != 0.0)
            .count();
        info!(frames = movements.len(), moving, "camera movement estimated");

        movements
    }

    /// Strong corners inside the background strips, away from every tracked box.
    pub fn features(&self, gray: &GrayImage, occupied: &[Track]) -> Vec<(u32, u32)> {
        let (w, h) = gray.dimensions();
        let r = self.config.patch_radius;
        if w <= 2 * r || h <= 2 * r {
            return Vec::new();
        }

        let mut corners: Vec<_> = corners_fast9(gray, self.config.fast_threshold)
            .into_iter()
            .filter(|c| {
                c.x >= r
                    && c.y >= r
                    && c.x < w - r
                    && c.y < h - r
                    && self
                        .config
                        .background_columns
                        .iter()
                        .any(|&(s, e)| c.x >= s && c.x < e)
                    && !occupied
                        .iter()
                        .any(|t| t.bbox.contains(c.x as f32, c.y as f32))
            })
            .collect();

        corners.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });

        let min_dist = self.config.min_feature_distance;
        let mut selected: Vec<(u32, u32)> = Vec::with_capacity(self.config.max_features);
        for c in corners {
            if selected.len() >= self.config.max_features {
                break;
            }

            let far_enough = selected
                .iter()
                .all(|&(x, y)| x.abs_diff(c.x).max(y.abs_diff(c.y)) >= min_dist);

            if far_enough {
                selected.push((c.x, c.y));
            }
        }

        selected
    }

    /// Median shift of background features from `prev` to `curr`, or zero
    /// when too few features could be matched.
    pub fn displacement(
        &self,
        prev: &GrayImage,
        curr: &GrayImage,
        occupied: &[Track],
    ) -> CameraMovement {
        let features = self.features(prev, occupied);

        let (mut xs, mut ys): (Vec<f32>, Vec<f32>) = features
            .iter()
            .filter_map(|&(x, y)| self.match_feature(prev, curr, x, y))
            .unzip();

        if xs.len() < self.config.min_matches {
            debug!(
                features = features.len(),
                matched = xs.len(),
                "too few background features, assuming a still camera"
            );
            return [0.0, 0.0];
        }

        match (median(&mut xs), median(&mut ys)) {
            (Some(dx), Some(dy)) => [dx, dy],
            _ => [0.0, 0.0],
        }
    }

    fn match_feature(
        &self,
        prev: &GrayImage,
        curr: &GrayImage,
        x: u32,
        y: u32,
    ) -> Option<(f32, f32)> {
        let (w, h) = curr.dimensions();
        let r = self.config.patch_radius as i64;
        let s = self.config.search_radius as i64;
        let (x, y) = (x as i64, y as i64);
        let (w, h) = (w as i64, h as i64);

        let prev_raw = prev.as_raw();
        let curr_raw = curr.as_raw();
        let area = ((2 * r + 1) * (2 * r + 1)) as f32;

        let mut best: Option<(f32, i64, i64)> = None;

        for dy in -s..=s {
            let cy = y + dy;
            if cy - r < 0 || cy + r >= h {
                continue;
            }

            for dx in -s..=s {
                let cx = x + dx;
                if cx - r < 0 || cx + r >= w {
                    continue;
                }

                let mut sad = 0u32;
                for j in -r..=r {
                    let prow = ((y + j) * w) as usize;
                    let crow = ((cy + j) * w) as usize;

                    for i in -r..=r {
                        let a = prev_raw[prow + (x + i) as usize];
                        let b = curr_raw[crow + (cx + i) as usize];
                        sad += a.abs_diff(b) as u32;
                    }
                }

                let err = sad as f32 / area;
                let better = match best {
                    None => true,
                    Some((e, bx, by)) => {
                        err < e || (err == e && dx.abs() + dy.abs() < bx.abs() + by.abs())
                    }
                };

                if better {
                    best = Some((err, dx, dy));
                }
            }
        }

        let (err, dx, dy) = best?;
        if err <= self.config.max_patch_error {
            Some((dx as f32, dy as f32))
        } else {
            None
        }
    }
}

/// Writes `position_adjusted = position - cumulative camera displacement`.
/// Frames beyond the end of `movements` get no further displacement.
pub fn adjust(table: &mut TrackTable, movements: &[CameraMovement]) {
    let mut total = na::Vector2::new(0.0f32, 0.0);

    for frame in 0..table.len() {
        if let Some(m) = movements.get(frame) {
            total += na::Vector2::new(m[0], m[1]);
        }

        for track in table.frame_mut(frame) {
            let position = track.position.unwrap_or_else(|| track.anchor());
            track.position_adjusted = Some(position - total);
        }
    }
}
