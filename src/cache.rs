use crate::camera::CameraMovement;
use crate::error::Error;
use crate::frame::FrameStore;
use crate::possession::Possession;
use crate::track::TrackTable;

use serde_derive::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bumped whenever a stage changes what it writes.
pub const PIPELINE_VERSION: &str = "pitchtrack/1";

const ENTRY_EXT: &str = "msgpack.lz4";

const UNOWNED_LOCK_GRACE: Duration = Duration::from_secs(30);

/// Hex SHA-256 key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash of the pipeline version, the configuration and every pixel.
    pub fn of_frames<C: serde::Serialize>(frames: &FrameStore, config: &C) -> Result<Self, Error> {
        let mut hasher = Sha256::new();
        hasher.update(PIPELINE_VERSION.as_bytes());
        hasher.update(serde_json::to_vec(config)?);

        for frame in frames.iter() {
            let (w, h) = frame.dims();
            hasher.update(w.to_le_bytes());
            hasher.update(h.to_le_bytes());
            hasher.update(frame.image.as_raw());
        }

        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    /// Key derived from a video name only.
    pub fn from_name(name: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(PIPELINE_VERSION.as_bytes());
        hasher.update(name.as_bytes());

        Self(format!("{:x}", hasher.finalize()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the analytics stages produce for one video.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub pipeline_version: String,
    pub tracks: TrackTable,
    pub camera_movement_per_frame: Vec<CameraMovement>,
    pub team_ball_control: Vec<Possession>,
}

impl CacheEntry {
    pub fn new(
        tracks: TrackTable,
        camera_movement_per_frame: Vec<CameraMovement>,
        team_ball_control: Vec<Possession>,
    ) -> Self {
        Self {
            pipeline_version: PIPELINE_VERSION.to_string(),
            tracks,
            camera_movement_per_frame,
            team_ball_control,
        }
    }

    /// Reason the entry cannot be used, if any.
    fn defect(&self) -> Option<String> {
        if self.pipeline_version != PIPELINE_VERSION {
            return Some(format!("version {}", self.pipeline_version));
        }

        let n = self.tracks.len();
        if self.camera_movement_per_frame.len() != n || self.team_ball_control.len() != n {
            return Some(format!(
                "lengths {}/{}/{}",
                n,
                self.camera_movement_per_frame.len(),
                self.team_ball_control.len()
            ));
        }

        None
    }
}

pub struct PipelineCache {
    dir: PathBuf,
}

impl PipelineCache {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self { dir })
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.{}", fingerprint, ENTRY_EXT))
    }

    fn lock_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.lock", fingerprint))
    }

    /// Stored entry, or `None` when absent or unusable.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let path = self.entry_path(fingerprint);
        let compressed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(%fingerprint, "cache miss");
                return None;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "cache entry unreadable");
                return None;
            }
        };

        let bytes = match lz4_flex::decompress_size_prepended(&compressed) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(path = %path.display(), %err, "cache entry corrupt, recomputing");
                return None;
            }
        };

        let entry: CacheEntry = match rmp_serde::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(path = %path.display(), %err, "cache entry undecodable, recomputing");
                return None;
            }
        };

        if let Some(defect) = entry.defect() {
            warn!(path = %path.display(), %defect, "cache entry stale, recomputing");
            return None;
        }

        info!(%fingerprint, frames = entry.tracks.len(), "cache hit");
        Some(entry)
    }

    /// Atomically stores `entry` under `fingerprint`.
    pub fn put(&self, fingerprint: &Fingerprint, entry: &CacheEntry) -> Result<(), Error> {
        let bytes = rmp_serde::to_vec_named(entry)?;
        let compressed = lz4_flex::compress_prepend_size(&bytes);

        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", fingerprint, std::process::id()));

        let written = (|| -> io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
            fs::rename(&tmp, self.entry_path(fingerprint))
        })();

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }

        info!(
            %fingerprint,
            raw = bytes.len(),
            compressed = compressed.len(),
            "cache entry stored"
        );

        Ok(())
    }

    /// Exclusive claim on `fingerprint` for the lifetime of the guard.
    ///
    /// A lock left behind by a process that no longer runs is reclaimed.
    pub fn lock(&self, fingerprint: &Fingerprint) -> Result<CacheLock, Error> {
        let path = self.lock_path(fingerprint);

        if let Some(guard) = create_lock(&path)? {
            return Ok(guard);
        }

        if lock_is_stale(&path) {
            warn!(path = %path.display(), "reclaiming stale cache lock");
            match fs::remove_file(&path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }

            if let Some(guard) = create_lock(&path)? {
                return Ok(guard);
            }
        }

        Err(Error::CacheLocked(fingerprint.to_string()))
    }
}

/// `None` when someone else holds the lock.
fn create_lock(path: &Path) -> io::Result<Option<CacheLock>> {
    match fs::OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            let guard = CacheLock {
                path: path.to_path_buf(),
            };
            writeln!(file, "{}", std::process::id())?;
            Ok(Some(guard))
        }
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(err) => Err(err),
    }
}

/// True when the recorded owner is gone. An owner that never wrote its pid
/// counts as gone once the file is older than `UNOWNED_LOCK_GRACE`.
fn lock_is_stale(path: &Path) -> bool {
    let owner = fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());

    match owner {
        Some(pid) => !process_alive(pid),
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.elapsed().ok())
            .map_or(false, |age| age > UNOWNED_LOCK_GRACE),
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// Without a process table to ask, every recorded owner is assumed alive.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Removes its lock file on drop.
#[derive(Debug)]
pub struct CacheLock {
    path: PathBuf,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), %err, "failed to release cache lock");
        }
    }
}
