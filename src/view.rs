use crate::error::Error;
use crate::math::in_bounds;
use crate::track::TrackTable;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::info;

/// Pixels within this distance of the reference quadrilateral count as inside.
const EDGE_TOLERANCE: f32 = 1e-2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchConfig {
    /// Pixel corners of the reference region, in the order
    /// bottom-left, top-left, top-right, bottom-right.
    pub pixel_vertices: [[f32; 2]; 4],
    /// Pitch width covered by the region, in meters.
    pub width: f32,
    /// Pitch length covered by the region, in meters.
    pub length: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            pixel_vertices: [[110.0, 1035.0], [265.0, 275.0], [910.0, 260.0], [1640.0, 915.0]],
            width: 68.0,
            length: 23.32,
        }
    }
}

impl PitchConfig {
    /// Pitch coordinates matching `pixel_vertices`.
    pub fn target_vertices(&self) -> [[f32; 2]; 4] {
        [
            [0.0, self.width],
            [0.0, 0.0],
            [self.length, 0.0],
            [self.length, self.width],
        ]
    }
}

pub struct ViewTransformer {
    bounds: Vec<na::Point2<f32>>,
    homography: na::Matrix3<f64>,
}

impl ViewTransformer {
    pub fn new(pitch: &PitchConfig) -> Result<Self, Error> {
        if !(pitch.width > 0.0 && pitch.length > 0.0) {
            return Err(Error::InvalidPitchGeometry("pitch size must be positive"));
        }

        let bounds: Vec<_> = pitch
            .pixel_vertices
            .iter()
            .map(|p| na::Point2::new(p[0], p[1]))
            .collect();

        if polygon_area(&bounds).abs() < 1.0 {
            return Err(Error::InvalidPitchGeometry("reference region has no area"));
        }

        for i in 0..4 {
            let (a, b, c) = (bounds[i], bounds[(i + 1) % 4], bounds[(i + 2) % 4]);
            if polygon_area(&[a, b, c]).abs() < 1e-3 {
                return Err(Error::InvalidPitchGeometry("three reference points are collinear"));
            }
        }

        let homography = solve_homography(&pitch.pixel_vertices, &pitch.target_vertices())
            .ok_or(Error::InvalidPitchGeometry("homography is singular"))?;

        Ok(Self { bounds, homography })
    }

    /// Maps a pixel to pitch meters, `None` outside the reference region.
    pub fn transform_point(&self, p: na::Point2<f32>) -> Option<na::Point2<f32>> {
        if !in_bounds(p, &self.bounds, EDGE_TOLERANCE) {
            return None;
        }

        let v = self.homography * na::Vector3::new(p.x as f64, p.y as f64, 1.0);
        if v.z.abs() < f64::EPSILON {
            return None;
        }

        Some(na::Point2::new((v.x / v.z) as f32, (v.y / v.z) as f32))
    }

    /// Writes `position_transformed` from every compensated position.
    pub fn transform(&self, table: &mut TrackTable) {
        let mut outside = 0usize;

        for (_, track) in table.iter_mut() {
            track.position_transformed = track
                .position_adjusted
                .and_then(|p| self.transform_point(p));

            if track.position_transformed.is_none() {
                outside += 1;
            }
        }

        info!(outside, "positions mapped onto the pitch");
    }
}

fn polygon_area(points: &[na::Point2<f32>]) -> f32 {
    let n = points.len();
    let mut sum = 0.0;
    for i in 0..n {
        let (a, b) = (points[i], points[(i + 1) % n]);
        sum += a.x * b.y - b.x * a.y;
    }

    sum / 2.0
}

/// Direct linear transform for four correspondences with `h33 = 1`.
fn solve_homography(src: &[[f32; 2]; 4], dst: &[[f32; 2]; 4]) -> Option<na::Matrix3<f64>> {
    let mut a = na::SMatrix::<f64, 8, 8>::zeros();
    let mut b = na::SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = (src[i][0] as f64, src[i][1] as f64);
        let (u, v) = (dst[i][0] as f64, dst[i][1] as f64);

        let r = 2 * i;
        let rows = [
            [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y],
            [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y],
        ];
        for (k, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                a[(r + k, c)] = *value;
            }
        }
        b[r] = u;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(na::Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertices_map_to_pitch_corners() {
        let pitch = PitchConfig::default();
        let view = ViewTransformer::new(&pitch).unwrap();

        for (px, target) in pitch.pixel_vertices.iter().zip(pitch.target_vertices()) {
            let p = view
                .transform_point(na::Point2::new(px[0], px[1]))
                .unwrap();
            assert_relative_eq!(p.x, target[0], epsilon = 1e-3);
            assert_relative_eq!(p.y, target[1], epsilon = 1e-3);
        }
    }

    #[test]
    fn edge_midpoint_lands_on_pitch_edge() {
        let pitch = PitchConfig::default();
        let view = ViewTransformer::new(&pitch).unwrap();

        // left edge: bottom-left to top-left maps to x = 0
        let [a, b] = [pitch.pixel_vertices[0], pitch.pixel_vertices[1]];
        let mid = na::Point2::new((a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0);
        let p = view.transform_point(mid).unwrap();

        assert_relative_eq!(p.x, 0.0, epsilon = 1e-3);
        assert!(p.y > 0.0 && p.y < pitch.width);
    }

    #[test]
    fn outside_points_have_no_pitch_position() {
        let view = ViewTransformer::new(&PitchConfig::default()).unwrap();
        assert!(view.transform_point(na::Point2::new(5.0, 5.0)).is_none());
        assert!(view.transform_point(na::Point2::new(900.0, 600.0)).is_some());
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let pitch = PitchConfig {
            pixel_vertices: [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0], [30.0, 30.0]],
            ..PitchConfig::default()
        };
        assert!(matches!(
            ViewTransformer::new(&pitch),
            Err(Error::InvalidPitchGeometry(_))
        ));

        let pitch = PitchConfig {
            width: 0.0,
            ..PitchConfig::default()
        };
        assert!(ViewTransformer::new(&pitch).is_err());
    }
}
