use crate::detection::Detection;
use crate::error::Error;
use crate::frame::Frame;
use crate::track::ObjectClass;

use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// The external detection model: one frame in, class-labelled boxes out.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error>;
}

impl<T> Detector for T
where
    T: Fn(&Frame) -> Result<Vec<Detection>, Error> + Send + Sync,
{
    #[inline]
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        self(frame)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_names: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.1,
            iou_threshold: 0.5,
            class_names: ["ball", "goalkeeper", "player", "referee"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DetectorConfig {
    pub fn object_class(&self, class: i32) -> Option<ObjectClass> {
        let name = self.class_names.get(usize::try_from(class).ok()?)?;

        match name.as_str() {
            "player" | "goalkeeper" => Some(ObjectClass::Player),
            "referee" => Some(ObjectClass::Referee),
            "ball" => Some(ObjectClass::Ball),
            _ => None,
        }
    }
}

/// Drops low-confidence detections and runs per-class non-maximum suppression.
pub fn filter_detections(config: &DetectorConfig, raw: &[Detection]) -> Vec<Detection> {
    let mut by_class: HashMap<i32, Vec<Detection>> = HashMap::new();
    for det in raw {
        if det.confidence >= config.confidence_threshold && det.w > 0.0 && det.h > 0.0 {
            by_class.entry(det.class).or_default().push(*det);
        }
    }

    let mut classes: Vec<_> = by_class.into_iter().collect();
    classes.sort_unstable_by_key(|(class, _)| *class);

    let mut results = Vec::new();
    for (_, mut dets) in classes {
        if dets.len() == 1 {
            results.append(&mut dets);
            continue;
        }

        let indices = non_maximum_supression(config.iou_threshold, &mut dets);
        results.extend(indices.into_iter().map(|idx| dets[idx]));
    }

    results
}

fn non_maximum_supression(iou_threshold: f32, dets: &mut [Detection]) -> Vec<usize> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut retain = vec![true; dets.len()];
    for idx in 0..dets.len() {
        if !retain[idx] {
            continue;
        }

        for other in idx + 1..dets.len() {
            if retain[other] && dets[idx].iou(&dets[other]) > iou_threshold {
                retain[other] = false;
            }
        }
    }

    (0..dets.len()).filter(|&i| retain[i]).collect()
}

/// Replays detections recorded in a `.dets` file, one `<frame>:<json array>`
/// line per frame.
pub struct ReplayDetector {
    frames: HashMap<usize, Vec<Detection>>,
}

impl ReplayDetector {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| Error::DetectorUnavailable(format!("{}: {}", path.display(), e)))?;

        Self::from_reader(std::io::BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, Error> {
        let mut frames = HashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let (idx, vector) = line.split_once(':').ok_or_else(|| {
                Error::DetectorUnavailable(format!("line {}: missing frame index", line_no + 1))
            })?;

            let idx: usize = idx.trim().parse().map_err(|_| {
                Error::DetectorUnavailable(format!("line {}: bad frame index", line_no + 1))
            })?;

            let dets: Vec<Detection> = serde_json::from_str(vector)?;
            frames.insert(idx, dets);
        }

        Ok(Self { frames })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Detector for ReplayDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        Ok(self.frames.get(&frame.index).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn det(x: f32, y: f32, confidence: f32, class: i32) -> Detection {
        Detection {
            x,
            y,
            w: 10.0,
            h: 20.0,
            confidence,
            class,
        }
    }

    #[test]
    fn goalkeepers_are_players() {
        let config = DetectorConfig::default();
        assert_eq!(config.object_class(1), Some(ObjectClass::Player));
        assert_eq!(config.object_class(2), Some(ObjectClass::Player));
        assert_eq!(config.object_class(3), Some(ObjectClass::Referee));
        assert_eq!(config.object_class(0), Some(ObjectClass::Ball));
        assert_eq!(config.object_class(7), None);
        assert_eq!(config.object_class(-1), None);
    }

    #[test]
    fn nms_keeps_strongest_overlapping_box() {
        let config = DetectorConfig::default();
        let raw = vec![
            det(100.0, 100.0, 0.6, 2),
            det(101.0, 100.0, 0.9, 2),
            det(300.0, 100.0, 0.8, 2),
            det(100.0, 100.0, 0.7, 3),
            det(500.0, 100.0, 0.05, 2),
        ];

        let out = filter_detections(&config, &raw);
        assert_eq!(out.len(), 3);
        assert!(out.iter().any(|d| d.class == 2 && d.confidence == 0.9));
        assert!(out.iter().any(|d| d.class == 2 && d.confidence == 0.8));
        assert!(out.iter().any(|d| d.class == 3));
        assert!(!out.iter().any(|d| d.confidence == 0.6));
    }

    #[test]
    fn replay_parses_dets_lines() {
        let text = "0:[{\"x\":10,\"y\":20,\"w\":4,\"h\":8,\"p\":0.9,\"c\":2}]\n\n2:[]\n";
        let detector = ReplayDetector::from_reader(text.as_bytes()).unwrap();
        assert_eq!(detector.len(), 2);

        let frame = Frame {
            index: 0,
            image: RgbImage::new(1, 1),
        };
        let dets = detector.detect(&frame).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class, 2);

        let missing = Frame {
            index: 1,
            image: RgbImage::new(1, 1),
        };
        assert!(detector.detect(&missing).unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_unavailable_detector() {
        let res = ReplayDetector::open("/nonexistent/weights.dets");
        assert!(matches!(res, Err(Error::DetectorUnavailable(_))));
    }
}
