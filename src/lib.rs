pub mod bbox;
pub mod cache;
pub mod camera;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod math;
pub mod pipeline;
pub mod possession;
pub mod render;
pub mod speed;
pub mod team;
pub mod track;
pub mod tracker;
pub mod view;

mod scene;

pub use cache::{CacheEntry, Fingerprint, PipelineCache};
pub use config::Config;
pub use detection::Detection;
pub use detector::{Detector, ReplayDetector};
pub use error::Error;
pub use frame::{Frame, FrameStore};
pub use pipeline::{Analysis, CancelToken, Pipeline};
pub use possession::Possession;
pub use render::AnnotationRenderer;
pub use track::{ObjectClass, Track, TrackId, TrackTable, BALL_ID};
