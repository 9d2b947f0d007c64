use crate::bbox::{BBox, Ltrb};
use crate::error::Error;
use crate::frame::{Frame, FrameStore};
use crate::track::{ObjectClass, TeamId, TrackId, TrackTable};

use image::RgbImage;
use ndarray::prelude::*;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const KMEANS_MAX_ITER: usize = 100;

/// Jersey colors of the two teams, fixed once built.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeamColorModel {
    centroids: [[f32; 3]; 2],
}

impl TeamColorModel {
    /// Team (1 or 2) whose color is closest.
    pub fn nearest(&self, color: [f32; 3]) -> TeamId {
        let d0 = color_distance2(&self.centroids[0], &color);
        let d1 = color_distance2(&self.centroids[1], &color);

        if d1 < d0 {
            2
        } else {
            1
        }
    }

    pub fn team_color(&self, team: TeamId) -> Option<[u8; 3]> {
        let c = self.centroids.get(usize::from(team).checked_sub(1)?)?;

        Some([
            c[0].round().clamp(0.0, 255.0) as u8,
            c[1].round().clamp(0.0, 255.0) as u8,
            c[2].round().clamp(0.0, 255.0) as u8,
        ])
    }
}

#[inline]
fn color_distance2(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

#[inline]
fn dist2(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Lloyd's k-means over the rows of `samples`.
///
/// Seeding is deterministic: the first row, then repeatedly the row farthest
/// from every chosen centroid.
pub fn kmeans(samples: ArrayView2<'_, f32>, k: usize) -> (Vec<usize>, Array2<f32>) {
    let n = samples.nrows();
    let dims = samples.ncols();
    let mut centroids = Array2::<f32>::zeros((k, dims));
    if n == 0 || k == 0 {
        return (Vec::new(), centroids);
    }

    centroids.row_mut(0).assign(&samples.row(0));
    for c in 1..k {
        let mut best = (0usize, -1.0f32);
        for i in 0..n {
            let d = (0..c)
                .map(|j| dist2(samples.row(i), centroids.row(j)))
                .fold(f32::INFINITY, f32::min);

            if d > best.1 {
                best = (i, d);
            }
        }

        centroids.row_mut(c).assign(&samples.row(best.0));
    }

    let mut labels = vec![usize::MAX; n];
    for _ in 0..KMEANS_MAX_ITER {
        let mut changed = false;

        for (i, label) in labels.iter_mut().enumerate() {
            let mut nearest = (0usize, f32::INFINITY);
            for j in 0..k {
                let d = dist2(samples.row(i), centroids.row(j));
                if d < nearest.1 {
                    nearest = (j, d);
                }
            }

            if *label != nearest.0 {
                *label = nearest.0;
                changed = true;
            }
        }

        if !changed {
            break;
        }

        for j in 0..k {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == j).collect();
            if members.is_empty() {
                continue;
            }

            let mean = samples.select(Axis(0), &members).mean_axis(Axis(0));
            if let Some(mean) = mean {
                centroids.row_mut(j).assign(&mean);
            }
        }
    }

    (labels, centroids)
}

/// Dominant non-background color of the upper half of a player box.
///
/// The crop is split in two clusters; the one owning most crop corners is
/// the pitch behind the player.
pub fn player_color(image: &RgbImage, bbox: &BBox<Ltrb>) -> Option<[f32; 3]> {
    let (w, h) = image.dimensions();
    let x0 = bbox.left().floor().clamp(0.0, w as f32) as u32;
    let x1 = bbox.right().ceil().clamp(0.0, w as f32) as u32;
    let y0 = bbox.top().floor().clamp(0.0, h as f32) as u32;
    let y1 = (bbox.top() + bbox.height() / 2.0).ceil().clamp(0.0, h as f32) as u32;

    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let (cw, ch) = ((x1 - x0) as usize, (y1 - y0) as usize);
    let mut samples = Array2::<f32>::zeros((cw * ch, 3));
    for (row, y) in (y0..y1).enumerate() {
        for (col, x) in (x0..x1).enumerate() {
            let p = image.get_pixel(x, y).0;
            let mut s = samples.row_mut(row * cw + col);
            s[0] = p[0] as f32;
            s[1] = p[1] as f32;
            s[2] = p[2] as f32;
        }
    }

    let (labels, centroids) = kmeans(samples.view(), 2);

    let corners = [0, cw - 1, (ch - 1) * cw, ch * cw - 1];
    let ones = corners.iter().filter(|&&i| labels[i] == 1).count();
    let background = match ones {
        0 | 1 => 0,
        2 => labels[0],
        _ => 1,
    };

    let c = centroids.row(1 - background);
    Some([c[0], c[1], c[2]])
}

#[derive(Default)]
pub struct TeamAssigner {
    model: Option<TeamColorModel>,
    assigned: HashMap<TrackId, TeamId>,
}

impl TeamAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn team_color(&self, team: TeamId) -> Option<[u8; 3]> {
        self.model.as_ref()?.team_color(team)
    }

    /// Builds the team color model from the players of one frame. Runs once;
    /// later calls keep the first model.
    pub fn initialize<'a, I>(&mut self, frame: &Frame, players: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = &'a BBox<Ltrb>>,
    {
        if self.model.is_some() {
            return Ok(());
        }

        let colors: Vec<[f32; 3]> = players
            .into_iter()
            .filter_map(|bbox| player_color(&frame.image, bbox))
            .collect();

        if colors.len() < 2 {
            return Err(Error::NotEnoughPlayers(colors.len()));
        }

        let samples = Array2::from_shape_fn((colors.len(), 3), |(i, j)| colors[i][j]);
        let (_, centroids) = kmeans(samples.view(), 2);

        let row = |i: usize| [centroids[[i, 0]], centroids[[i, 1]], centroids[[i, 2]]];
        let model = TeamColorModel {
            centroids: [row(0), row(1)],
        };

        info!(
            frame = frame.index,
            players = colors.len(),
            team_1 = ?model.team_color(1),
            team_2 = ?model.team_color(2),
            "team colors initialized"
        );

        self.model = Some(model);
        Ok(())
    }

    /// Team of a player occurrence without touching the per-id cache.
    pub fn classify_fresh(&self, frame: &Frame, bbox: &BBox<Ltrb>) -> Option<TeamId> {
        let model = self.model.as_ref()?;
        let color = player_color(&frame.image, bbox)?;

        Some(model.nearest(color))
    }

    /// Team of `player_id`; the first answer for an id is final.
    pub fn classify(
        &mut self,
        frame: &Frame,
        bbox: &BBox<Ltrb>,
        player_id: TrackId,
    ) -> Option<TeamId> {
        if let Some(team) = self.assigned.get(&player_id) {
            return Some(*team);
        }

        let team = self.classify_fresh(frame, bbox)?;
        self.assigned.insert(player_id, team);

        Some(team)
    }

    /// Initializes on the first frame with enough players, then writes team
    /// and team color onto every player entry.
    pub fn assign(&mut self, frames: &FrameStore, table: &mut TrackTable) {
        for f in 0..table.len().min(frames.len()) {
            let boxes: Vec<_> = table.players(f).map(|t| t.bbox).collect();
            if boxes.is_empty() {
                continue;
            }

            match self.initialize(&frames[f], &boxes) {
                Ok(()) => break,
                Err(err) => debug!(frame = f, %err, "team model not initialized yet"),
            }
        }

        if self.model.is_none() {
            warn!("no frame with enough players, teams left unassigned");
            return;
        }

        // per id, every occurrence in frame order
        let pending: Vec<(TrackId, Vec<(usize, BBox<Ltrb>)>)> = table
            .ids(ObjectClass::Player)
            .filter(|id| !self.assigned.contains_key(id))
            .map(|id| {
                let seen = (0..table.len().min(frames.len()))
                    .filter_map(|f| table.get(f, id).map(|t| (f, t.bbox)))
                    .collect();
                (id, seen)
            })
            .collect();

        // first occurrence whose shirt color is readable decides
        let fresh: Vec<(TrackId, Option<TeamId>)> = pending
            .par_iter()
            .map(|(id, seen)| {
                let team = seen
                    .iter()
                    .find_map(|(f, bbox)| self.classify_fresh(&frames[*f], bbox));
                (*id, team)
            })
            .collect();

        for (id, team) in fresh {
            match team {
                Some(team) => {
                    self.assigned.entry(id).or_insert(team);
                }
                None => debug!(player = id, "no readable shirt color"),
            }
        }

        let colors = [self.team_color(1), self.team_color(2)];
        for (_, track) in table.iter_mut() {
            if track.class != ObjectClass::Player {
                continue;
            }

            if let Some(team) = self.assigned.get(&track.track_id) {
                track.team = Some(*team);
                track.team_color = colors[usize::from(*team) - 1];
            }
        }

        info!(players = self.assigned.len(), "teams assigned");
    }
}
