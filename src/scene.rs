use crate::bbox::{BBox, Ltrb};
use crate::detection::Detection;
use crate::track::{ObjectClass, TrackId, BALL_ID};

use munkres::{solve_assignment, WeightMatrix};
use std::collections::VecDeque;
use tracing::{trace, warn};

const UNMATCHABLE: f32 = 100000.0;

/// Per-run id source shared by every scene of one tracker.
#[derive(Debug)]
pub struct IdSequence(TrackId);

impl IdSequence {
    pub fn new() -> Self {
        Self(BALL_ID + 1)
    }

    pub fn next_id(&mut self) -> TrackId {
        let id = self.0;
        self.0 += 1;
        id
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}

pub struct IndexedSlice<'a, T> {
    pub slice: &'a [T],
    idxs: Vec<usize>,
}

impl<'a, T> IndexedSlice<'a, T> {
    pub fn new(slice: &'a [T]) -> Self {
        Self {
            slice,
            idxs: (0..slice.len()).collect(),
        }
    }

    pub fn new_with_indexes(slice: &'a [T], idxs: Vec<usize>) -> Self {
        Self { slice, idxs }
    }

    #[inline]
    pub fn get_index(&self, idx: usize) -> usize {
        self.idxs[idx]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.idxs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.idxs.is_empty()
    }
}

impl<'a, T> std::ops::Index<usize> for IndexedSlice<'a, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.slice[self.idxs[index]]
    }
}

#[derive(Debug)]
pub struct Participant {
    pub id: TrackId,
    pub last_seen: usize,
    history: VecDeque<(usize, BBox<Ltrb>)>,
    history_len: usize,
}

impl Participant {
    pub fn new(id: TrackId, frame: usize, bbox: BBox<Ltrb>, history_len: usize) -> Self {
        let mut history = VecDeque::with_capacity(history_len.max(1));
        history.push_front((frame, bbox));

        Self {
            id,
            last_seen: frame,
            history,
            history_len: history_len.max(1),
        }
    }

    pub fn update(&mut self, frame: usize, bbox: BBox<Ltrb>) {
        if self.history.len() == self.history_len {
            self.history.pop_back();
        }

        self.history.push_front((frame, bbox));
        self.last_seen = frame;
    }

    #[inline]
    pub fn last_bbox(&self) -> BBox<Ltrb> {
        self.history[0].1
    }

    /// Last box moved by the constant velocity of the two latest sightings.
    pub fn predicted(&self, frame: usize) -> BBox<Ltrb> {
        let (last_frame, last) = self.history[0];

        match self.history.get(1) {
            Some(&(prev_frame, prev)) if last_frame > prev_frame && frame > last_frame => {
                let v = (last.center() - prev.center()) / (last_frame - prev_frame) as f32;
                let dt = (frame - last_frame) as f32;

                last.translate(v.x * dt, v.y * dt)
            }
            _ => last,
        }
    }
}

/// Frame-to-frame association for one class of entities.
pub struct Scene {
    class: ObjectClass,
    pub participants: Vec<Participant>,
    match_threshold: f32,
    max_age: usize,
    history_len: usize,
}

impl Scene {
    pub fn new(class: ObjectClass, match_threshold: f32, max_age: usize, history_len: usize) -> Self {
        Self {
            class,
            participants: Vec::with_capacity(32),
            match_threshold,
            max_age,
            history_len,
        }
    }

    fn assignment(
        &self,
        frame: usize,
        dets: &IndexedSlice<'_, Detection>,
        objs: &IndexedSlice<'_, Participant>,
        predict: bool,
    ) -> (Vec<(usize, usize, f32)>, Vec<usize>) {
        let mut missed: Vec<_> = (0..dets.len()).collect();

        let assignments = if !objs.is_empty() && !dets.is_empty() {
            let n = dets.len().max(objs.len());

            let mut costs = Vec::with_capacity(n * n);
            for r in 0..n {
                for c in 0..n {
                    let cost = if r < objs.len() && c < dets.len() {
                        let obj = &objs[r];
                        let bbox = if predict {
                            obj.predicted(frame)
                        } else {
                            obj.last_bbox()
                        };

                        1.0 - bbox.iou(&dets[c].ltrb())
                    } else {
                        UNMATCHABLE
                    };

                    costs.push(cost);
                }
            }

            let mut mat = WeightMatrix::from_row_vec(n, costs.clone());

            match solve_assignment(&mut mat) {
                Ok(inner) => {
                    let mut assignments = Vec::new();

                    for i in inner {
                        if i.row < objs.len() && i.column < dets.len() {
                            let score = 1.0 - costs[i.row * n + i.column];

                            if score > self.match_threshold {
                                assignments.push((i.row, i.column, score));
                            }
                        }
                    }

                    missed.retain(|&x| !assignments.iter().any(|&(_, p, _)| p == x));

                    assignments
                }
                Err(err) => {
                    warn!(frame, class = ?self.class, ?err, "assignment could not be solved");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let missed = missed.into_iter().map(|x| dets.get_index(x)).collect();
        let assignments = assignments
            .into_iter()
            .map(|(r, c, s)| (objs.get_index(r), dets.get_index(c), s))
            .collect();

        (assignments, missed)
    }

    /// Matches `detections` against live participants and returns the id and
    /// box of every detection, sorted by id.
    pub fn update(
        &mut self,
        frame: usize,
        detections: &[Detection],
        ids: &mut IdSequence,
    ) -> Vec<(TrackId, BBox<Ltrb>)> {
        let max_age = self.max_age;
        self.participants
            .retain(|p| frame.saturating_sub(p.last_seen) <= max_age);

        let mut recent = Vec::new();
        let mut lost = Vec::new();
        for (idx, p) in self.participants.iter().enumerate() {
            if p.last_seen + 1 == frame {
                recent.push(idx);
            } else {
                lost.push(idx);
            }
        }

        let dets = IndexedSlice::new(detections);
        let recent_objs = IndexedSlice::new_with_indexes(&self.participants, recent);
        let (recent_matched, recent_missed) = self.assignment(frame, &dets, &recent_objs, true);

        let dets = IndexedSlice::new_with_indexes(detections, recent_missed);
        let lost_objs = IndexedSlice::new_with_indexes(&self.participants, lost);
        let (lost_matched, missed) = self.assignment(frame, &dets, &lost_objs, false);

        let mut out = Vec::with_capacity(detections.len());

        for (i, j, _) in recent_matched.into_iter().chain(lost_matched) {
            let bbox = detections[j].ltrb();
            self.participants[i].update(frame, bbox);
            out.push((self.participants[i].id, bbox));
        }

        for &j in &missed {
            let bbox = detections[j].ltrb();
            let p = Participant::new(ids.next_id(), frame, bbox, self.history_len);
            out.push((p.id, bbox));
            self.participants.push(p);
        }

        trace!(
            frame,
            class = ?self.class,
            matched = out.len() - missed.len(),
            spawned = missed.len(),
            "scene updated"
        );

        out.sort_unstable_by_key(|(id, _)| *id);
        out
    }
}
