use nalgebra as na;
use num_traits::Float;

#[inline]
pub fn lerp<F: Float>(a: F, b: F, factor: F) -> F {
    a * (F::one() - factor) + b * factor
}

/// Median of the values, averaging the two middle values for even lengths.
/// Reorders `values`.
pub fn median<F: Float>(values: &mut [F]) -> Option<F> {
    if values.is_empty() {
        return None;
    }

    values.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        let two = F::one() + F::one();
        Some((values[mid - 1] + values[mid]) / two)
    }
}

/// Distance from `p` to the segment `a`-`b`.
pub fn segment_distance(p: na::Point2<f32>, a: na::Point2<f32>, b: na::Point2<f32>) -> f32 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f32::EPSILON {
        return na::distance(&p, &a);
    }

    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    na::distance(&p, &(a + ab * t))
}

/// Even-odd point-in-polygon test; points within `tolerance` of an edge
/// count as inside.
pub fn in_bounds(p: na::Point2<f32>, poly: &[na::Point2<f32>], tolerance: f32) -> bool {
    let n = poly.len();
    if n < 3 {
        return false;
    }

    for i in 0..n {
        if segment_distance(p, poly[i], poly[(i + 1) % n]) <= tolerance {
            return true;
        }
    }

    let mut inside = false;
    let mut p1 = poly[0];
    let mut xints = 0.0;

    for i in 1..=n {
        let p2 = poly[i % n];

        if p.y > f32::min(p1.y, p2.y) && p.y <= f32::max(p1.y, p2.y) && p.x <= f32::max(p1.x, p2.x)
        {
            if (p1.y - p2.y).abs() > f32::EPSILON {
                xints = (p.y - p1.y) * (p2.x - p1.x) / (p2.y - p1.y) + p1.x;
            }

            if (p1.x - p2.x).abs() < f32::EPSILON || p.x <= xints {
                inside = !inside;
            }
        }

        p1 = p2;
    }

    inside
}
