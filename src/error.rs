use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Detector unavailable: {0}")]
    DetectorUnavailable(String),

    #[error("Invalid pitch geometry: {0}")]
    InvalidPitchGeometry(&'static str),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Empty frame sequence")]
    EmptyVideo,

    #[error("Frame {index} is {found:?}, expected {expected:?}")]
    FrameSizeMismatch {
        index: usize,
        expected: (u32, u32),
        found: (u32, u32),
    },

    #[error("Not enough players to build a team model: {0}")]
    NotEnoughPlayers(usize),

    #[error("Detection failed: {0}")]
    Detection(String),

    #[error("Run cancelled before frame {0}")]
    Cancelled(usize),

    #[error("Cache entry {0} is locked by another run")]
    CacheLocked(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cache Encode Error: {0}")]
    CacheEncode(#[from] rmp_serde::encode::Error),

    #[error("Yaml Error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),
}
