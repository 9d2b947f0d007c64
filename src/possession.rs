use crate::bbox::{BBox, Ltrb};
use crate::track::{TeamId, Track, TrackId, TrackTable};

use nalgebra as na;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionConfig {
    /// In px, between the ball center and the nearest foot.
    pub max_player_ball_distance: f32,
}

impl Default for PossessionConfig {
    fn default() -> Self {
        Self {
            max_player_ball_distance: 70.0,
        }
    }
}

/// Team in control of the ball at one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Possession {
    /// Nobody had the ball yet.
    Unassigned,
    Team(TeamId),
}

pub struct BallPossessionAssigner {
    config: PossessionConfig,
}

impl BallPossessionAssigner {
    pub fn new(config: PossessionConfig) -> Self {
        Self { config }
    }

    /// Player closest to the ball, if close enough. Ties go to the lowest id.
    pub fn assign<'a, I>(&self, players: I, ball: &BBox<Ltrb>) -> Option<TrackId>
    where
        I: IntoIterator<Item = &'a Track>,
    {
        let ball = ball.center();
        let mut best: Option<(f32, TrackId)> = None;

        for player in players {
            let left = na::Point2::new(player.bbox.left(), player.bbox.bottom());
            let right = na::Point2::new(player.bbox.right(), player.bbox.bottom());
            let d = na::distance(&left, &ball).min(na::distance(&right, &ball));

            if d > self.config.max_player_ball_distance {
                continue;
            }

            let closer = match best {
                None => true,
                Some((bd, bid)) => d < bd || (d == bd && player.track_id < bid),
            };

            if closer {
                best = Some((d, player.track_id));
            }
        }

        best.map(|(_, id)| id)
    }

    /// Marks the ball holder of every frame and returns the per-frame
    /// possession sequence.
    pub fn annotate(&self, table: &mut TrackTable) -> Vec<Possession> {
        let holders: Vec<Option<TrackId>> = {
            let table = &*table;

            (0..table.len())
                .into_par_iter()
                .map(|f| {
                    let ball = table.ball(f)?;
                    self.assign(table.players(f), &ball.bbox)
                })
                .collect()
        };

        let mut state = PossessionTracker::new();
        let records: Vec<Possession> = holders
            .iter()
            .enumerate()
            .map(|(f, holder)| {
                let holder = match *holder {
                    Some(id) => table.get_mut(f, id),
                    None => None,
                };

                if let Some(track) = holder {
                    track.has_ball = true;
                    state.observe(Some(&*track))
                } else {
                    state.observe(None)
                }
            })
            .collect();

        info!(
            frames = records.len(),
            assigned = holders.iter().filter(|h| h.is_some()).count(),
            "ball possession assigned"
        );

        records
    }
}

/// Carry-forward possession state machine.
#[derive(Debug, Clone)]
pub struct PossessionTracker {
    state: Possession,
}

impl Default for PossessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PossessionTracker {
    pub fn new() -> Self {
        Self {
            state: Possession::Unassigned,
        }
    }

    #[inline]
    pub fn state(&self) -> Possession {
        self.state
    }

    /// Advances one frame. No holder, or a holder without a team, keeps the
    /// previous state.
    pub fn observe(&mut self, holder: Option<&Track>) -> Possession {
        if let Some(team) = holder.and_then(|t| t.team) {
            self.state = Possession::Team(team);
        }

        self.state
    }
}

/// Share of frames `0..=upto` controlled by team 1 and team 2.
pub fn control_share(records: &[Possession], upto: usize) -> Option<[f32; 2]> {
    let end = upto.checked_add(1)?.min(records.len());
    let mut counts = [0usize; 2];

    for record in &records[..end] {
        match record {
            Possession::Team(1) => counts[0] += 1,
            Possession::Team(2) => counts[1] += 1,
            _ => {}
        }
    }

    let total = counts[0] + counts[1];
    if total == 0 {
        return None;
    }

    Some([
        counts[0] as f32 / total as f32,
        counts[1] as f32 / total as f32,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{ObjectClass, BALL_ID};

    fn player(id: TrackId, team: TeamId, left: f32) -> Track {
        let mut t = Track::new(
            id,
            ObjectClass::Player,
            BBox::ltrb(left, 40.0, left + 20.0, 100.0),
        );
        t.team = Some(team);
        t
    }

    fn ball_at(x: f32, y: f32) -> Track {
        Track::new(BALL_ID, ObjectClass::Ball, BBox::ltrb(x - 4.0, y - 4.0, x + 4.0, y + 4.0))
    }

    fn assigner() -> BallPossessionAssigner {
        BallPossessionAssigner::new(PossessionConfig::default())
    }

    #[test]
    fn possession_carries_forward() {
        let mut table = TrackTable::with_frames(6);
        for f in 0..6 {
            table.insert(f, player(1, 1, 90.0));
            table.insert(f, player(2, 2, 500.0));
        }
        table.insert(0, ball_at(300.0, 300.0));
        table.insert(1, ball_at(510.0, 100.0));
        table.insert(2, ball_at(100.0, 100.0));

        let records = assigner().annotate(&mut table);

        assert_eq!(
            records,
            vec![
                Possession::Unassigned,
                Possession::Team(2),
                Possession::Team(1),
                Possession::Team(1),
                Possession::Team(1),
                Possession::Team(1),
            ]
        );
        assert!(table.get(2, 1).unwrap().has_ball);
        assert!(!table.get(3, 1).unwrap().has_ball);
        assert!(table.get(1, 2).unwrap().has_ball);
    }

    #[test]
    fn distance_threshold_is_inclusive() {
        let players = [player(1, 1, 90.0)];
        // nearest foot is (110, 100)
        assert_eq!(
            assigner().assign(&players, &ball_at(180.0, 100.0).bbox),
            Some(1)
        );
        assert_eq!(assigner().assign(&players, &ball_at(181.0, 100.0).bbox), None);
    }

    #[test]
    fn ties_go_to_lowest_id() {
        // both players have a foot 10px from the ball
        let players = [player(7, 1, 110.0), player(3, 2, 70.0)];
        assert_eq!(
            assigner().assign(&players, &ball_at(100.0, 100.0).bbox),
            Some(3)
        );
    }

    #[test]
    fn teamless_holder_keeps_state() {
        let mut state = PossessionTracker::new();
        assert_eq!(state.observe(Some(&player(1, 2, 0.0))), Possession::Team(2));

        let stranger = Track::new(9, ObjectClass::Player, BBox::ltrb(0.0, 0.0, 1.0, 1.0));
        assert_eq!(state.observe(Some(&stranger)), Possession::Team(2));
        assert_eq!(state.observe(None), Possession::Team(2));
    }

    #[test]
    fn control_share_ignores_unassigned() {
        let records = [
            Possession::Unassigned,
            Possession::Team(1),
            Possession::Team(1),
            Possession::Team(2),
        ];

        assert_eq!(control_share(&records, 0), None);
        assert_eq!(control_share(&records, 2), Some([1.0, 0.0]));
        assert_eq!(control_share(&records, 10), Some([2.0 / 3.0, 1.0 / 3.0]));
    }
}
