use crate::cache::{CacheEntry, Fingerprint, PipelineCache};
use crate::camera::{self, CameraMotionEstimator};
use crate::config::Config;
use crate::detector::Detector;
use crate::error::Error;
use crate::frame::FrameStore;
use crate::possession::BallPossessionAssigner;
use crate::speed::SpeedDistanceEstimator;
use crate::team::TeamAssigner;
use crate::tracker::{self, Tracker};
use crate::view::ViewTransformer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Shared flag checked between frames and stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, at: usize) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled(at))
        } else {
            Ok(())
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub entry: CacheEntry,
    pub fingerprint: Fingerprint,
    pub from_cache: bool,
}

pub struct Pipeline {
    config: Config,
    tracker: Tracker,
    camera: CameraMotionEstimator,
    view: ViewTransformer,
    speed: SpeedDistanceEstimator,
    possession: BallPossessionAssigner,
}

impl Pipeline {
    pub fn new(config: Config, detector: Arc<dyn Detector>) -> Result<Self, Error> {
        config.validate()?;

        let view = ViewTransformer::new(&config.pitch)?;
        let tracker = Tracker::new(config.tracker.clone(), config.detector.clone(), detector);

        Ok(Self {
            tracker,
            camera: CameraMotionEstimator::new(config.camera.clone()),
            view,
            speed: SpeedDistanceEstimator::new(config.speed.clone()),
            possession: BallPossessionAssigner::new(config.possession.clone()),
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyzes `frames`, going through `cache` when given. A cancelled or
    /// failed run stores nothing.
    pub fn run(
        &self,
        frames: &FrameStore,
        cache: Option<&PipelineCache>,
        cancel: &CancelToken,
    ) -> Result<Analysis, Error> {
        let fingerprint = Fingerprint::of_frames(frames, &self.config)?;

        // a finished entry is served even while another run holds the lock
        if let Some(entry) = cache.and_then(|c| c.get(&fingerprint)) {
            return Ok(Analysis {
                entry,
                fingerprint,
                from_cache: true,
            });
        }

        let _lock = cache.map(|c| c.lock(&fingerprint)).transpose()?;

        // the previous holder may have stored it meanwhile
        if let Some(entry) = cache.and_then(|c| c.get(&fingerprint)) {
            return Ok(Analysis {
                entry,
                fingerprint,
                from_cache: true,
            });
        }

        let entry = self.analyze(frames, cancel)?;

        if let Some(cache) = cache {
            cache.put(&fingerprint, &entry)?;
        }

        Ok(Analysis {
            entry,
            fingerprint,
            from_cache: false,
        })
    }

    /// Runs every stage in order without touching any cache.
    pub fn analyze(&self, frames: &FrameStore, cancel: &CancelToken) -> Result<CacheEntry, Error> {
        let started = Instant::now();
        let n = frames.len();

        let mut table = self.tracker.track(frames, cancel)?;
        tracker::interpolate_ball(&mut table);
        tracker::add_positions(&mut table);
        cancel.check(n)?;

        let movements = self.camera.estimate(frames, &table);
        camera::adjust(&mut table, &movements);
        cancel.check(n)?;

        self.view.transform(&mut table);
        self.speed.annotate(&mut table);
        debug!("positions, speed and distance done");

        let mut teams = TeamAssigner::new();
        teams.assign(frames, &mut table);
        cancel.check(n)?;

        let control = self.possession.annotate(&mut table);
        cancel.check(n)?;

        info!(
            frames = n,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "analysis finished"
        );

        Ok(CacheEntry::new(table, movements, control))
    }
}
