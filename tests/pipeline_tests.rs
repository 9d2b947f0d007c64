use pitchtrack::cache::PipelineCache;
use pitchtrack::{
    CancelToken, Config, Detection, Detector, Error, Frame, FrameStore, Pipeline, Possession,
    ReplayDetector, TrackTable,
};

use approx::assert_relative_eq;
use image::{Rgb, RgbImage};
use std::fs;
use std::sync::Arc;

const GRASS: Rgb<u8> = Rgb([30, 140, 40]);
const RED: Rgb<u8> = Rgb([200, 20, 20]);
const BLUE: Rgb<u8> = Rgb([20, 30, 210]);

const FRAMES: usize = 6;
const RED_LEFT: u32 = 100;
const BLUE_LEFT: u32 = 300;

fn paint_shirt(img: &mut RgbImage, left: u32, color: Rgb<u8>) {
    for y in 205..238 {
        for x in left + 8..left + 32 {
            img.put_pixel(x, y, color);
        }
    }
}

fn video() -> FrameStore {
    let frames = (0..FRAMES)
        .map(|_| {
            let mut img = RgbImage::from_pixel(640, 480, GRASS);
            paint_shirt(&mut img, RED_LEFT, RED);
            paint_shirt(&mut img, BLUE_LEFT, BLUE);
            img
        })
        .collect();

    FrameStore::new(frames).unwrap()
}

fn player_at(left: u32) -> Detection {
    Detection {
        x: left as f32 + 20.0,
        y: 240.0,
        w: 40.0,
        h: 80.0,
        confidence: 0.9,
        class: 2,
    }
}

fn ball_at(x: f32, y: f32) -> Detection {
    Detection {
        x,
        y,
        w: 10.0,
        h: 10.0,
        confidence: 0.8,
        class: 0,
    }
}

/// Ball far away on frames 0 and 1, at the red player's feet on frame 2,
/// undetected afterwards.
fn scripted(index: usize) -> Vec<Detection> {
    let mut dets = vec![player_at(RED_LEFT), player_at(BLUE_LEFT)];
    match index {
        0 | 1 => dets.push(ball_at(600.0, 50.0)),
        2 => dets.push(ball_at(145.0, 280.0)),
        _ => {}
    }
    dets
}

fn detector() -> Arc<dyn Detector> {
    Arc::new(|frame: &Frame| -> Result<Vec<Detection>, Error> { Ok(scripted(frame.index)) })
}

fn pipeline() -> Pipeline {
    Pipeline::new(Config::default(), detector()).unwrap()
}

fn red_player(table: &TrackTable) -> u32 {
    table
        .players(0)
        .find(|t| t.bbox.left() == RED_LEFT as f32)
        .map(|t| t.track_id)
        .unwrap()
}

#[test]
fn possession_carries_forward_end_to_end() {
    let entry = pipeline().analyze(&video(), &CancelToken::new()).unwrap();
    let tracks = &entry.tracks;

    let red = red_player(tracks);
    let red_team = tracks.get(0, red).unwrap().team.unwrap();
    let blue_team = tracks
        .players(0)
        .find(|t| t.track_id != red)
        .and_then(|t| t.team)
        .unwrap();
    assert_ne!(red_team, blue_team);

    assert_eq!(
        entry.team_ball_control,
        vec![
            Possession::Unassigned,
            Possession::Unassigned,
            Possession::Team(red_team),
            Possession::Team(red_team),
            Possession::Team(red_team),
            Possession::Team(red_team),
        ]
    );

    assert!(tracks.get(2, red).unwrap().has_ball);
    assert!((0..FRAMES).filter(|&f| f != 2).all(|f| !tracks.get(f, red).unwrap().has_ball));

    // ids never change for static players
    for f in 0..FRAMES {
        assert_eq!(tracks.players(f).count(), 2);
        assert!(tracks.contains(f, red));
    }

    // no ball after the last detection
    assert!(tracks.ball(3).is_none());
    assert_eq!(entry.camera_movement_per_frame, vec![[0.0, 0.0]; FRAMES]);
}

/// Pitch region spanning the whole 640x480 frame, 10 px per meter.
fn whole_frame_pitch() -> Config {
    let mut config = Config::default();
    config.pitch.pixel_vertices = [[0.0, 480.0], [0.0, 0.0], [640.0, 0.0], [640.0, 480.0]];
    config.pitch.width = 48.0;
    config.pitch.length = 64.0;
    config
}

#[test]
fn runner_gets_speed_and_distance_end_to_end() {
    // 10 px per frame along x, feet at y = 420
    let with_runner: Arc<dyn Detector> =
        Arc::new(|frame: &Frame| -> Result<Vec<Detection>, Error> {
            let mut dets = scripted(frame.index);
            dets.push(Detection {
                x: 400.0 + 10.0 * frame.index as f32,
                y: 380.0,
                w: 40.0,
                h: 80.0,
                confidence: 0.9,
                class: 2,
            });
            Ok(dets)
        });

    let entry = Pipeline::new(whole_frame_pitch(), with_runner)
        .unwrap()
        .analyze(&video(), &CancelToken::new())
        .unwrap();
    let tracks = &entry.tracks;

    let runner = tracks
        .players(0)
        .find(|t| t.bbox.left() == 380.0)
        .map(|t| t.track_id)
        .unwrap();
    let red = red_player(tracks);

    for f in 0..FRAMES {
        let t = tracks.get(f, runner).unwrap();
        let p = t.position_transformed.unwrap();
        assert_relative_eq!(p.x, 40.0 + f as f32, epsilon = 1e-2);
        assert_relative_eq!(p.y, 42.0, epsilon = 1e-2);

        // 5 m over 5 frames at 24 fps
        assert_relative_eq!(t.speed.unwrap(), 86.4, epsilon = 1e-1);
        assert_relative_eq!(t.distance.unwrap(), 5.0, epsilon = 1e-2);

        let still = tracks.get(f, red).unwrap();
        assert!(still.position_transformed.is_some());
        assert_eq!(still.speed, Some(0.0));
    }
}

#[test]
fn second_run_is_a_cache_hit() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = PipelineCache::open(dir.path())?;
    let frames = video();
    let pipeline = pipeline();

    let first = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;
    assert!(!first.from_cache);

    let second = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;
    assert!(second.from_cache);
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(first.entry, second.entry);

    // recomputing without the cache gives the same analytics
    let fresh = pipeline.run(&frames, None, &CancelToken::new())?;
    assert_eq!(fresh.entry, first.entry);

    Ok(())
}

#[test]
fn corrupt_entry_is_recomputed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = PipelineCache::open(dir.path())?;
    let frames = video();
    let pipeline = pipeline();

    let first = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;
    let path = cache.entry_path(&first.fingerprint);
    let bytes = fs::read(&path)?;
    fs::write(&path, &bytes[..bytes.len() / 3])?;

    let again = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;
    assert!(!again.from_cache);
    assert_eq!(again.entry, first.entry);
    assert_eq!(cache.get(&first.fingerprint), Some(first.entry));

    Ok(())
}

#[test]
fn cancelled_run_stores_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = PipelineCache::open(dir.path())?;
    let cancel = CancelToken::new();
    cancel.cancel();

    let res = pipeline().run(&video(), Some(&cache), &cancel);
    assert!(matches!(res, Err(Error::Cancelled(0))));
    assert_eq!(fs::read_dir(dir.path())?.count(), 0);

    Ok(())
}

#[test]
fn locked_fingerprint_is_refused() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = PipelineCache::open(dir.path())?;
    let frames = video();
    let pipeline = pipeline();

    let fingerprint = pitchtrack::Fingerprint::of_frames(&frames, pipeline.config())?;
    let _guard = cache.lock(&fingerprint)?;

    let res = pipeline.run(&frames, Some(&cache), &CancelToken::new());
    assert!(matches!(res, Err(Error::CacheLocked(_))));

    Ok(())
}

#[test]
fn leftover_lock_does_not_block_a_stored_entry() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = PipelineCache::open(dir.path())?;
    let frames = video();
    let pipeline = pipeline();

    let first = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;

    // a run that died without releasing its lock
    std::mem::forget(cache.lock(&first.fingerprint)?);

    let second = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;
    assert!(second.from_cache);
    assert_eq!(second.entry, first.entry);

    Ok(())
}

#[cfg(target_os = "linux")]
#[test]
fn lock_of_a_dead_run_is_reclaimed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cache = PipelineCache::open(dir.path())?;
    let frames = video();
    let pipeline = pipeline();

    let fingerprint = pitchtrack::Fingerprint::of_frames(&frames, pipeline.config())?;
    fs::write(dir.path().join(format!("{}.lock", fingerprint)), "999999999\n")?;

    let res = pipeline.run(&frames, Some(&cache), &CancelToken::new())?;
    assert!(!res.from_cache);
    assert!(cache.get(&fingerprint).is_some());
    assert!(!dir.path().join(format!("{}.lock", fingerprint)).exists());

    Ok(())
}

#[test]
fn replayed_detections_match_live_ones() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("match.dets");

    let lines: Vec<String> = (0..FRAMES)
        .map(|i| serde_json::to_string(&scripted(i)).map(|json| format!("{}:{}", i, json)))
        .collect::<Result<_, _>>()?;
    fs::write(&path, lines.join("\n"))?;

    let replay: Arc<dyn Detector> = Arc::new(ReplayDetector::open(&path)?);
    let replayed = Pipeline::new(Config::default(), replay)?.analyze(&video(), &CancelToken::new())?;
    let live = pipeline().analyze(&video(), &CancelToken::new())?;

    assert_eq!(replayed, live);

    Ok(())
}

#[test]
fn failing_detector_only_empties_frames() {
    let flaky: Arc<dyn Detector> = Arc::new(|frame: &Frame| -> Result<Vec<Detection>, Error> {
        if frame.index == 1 {
            Err(Error::Detection("model crashed".into()))
        } else {
            Ok(scripted(frame.index))
        }
    });

    let entry = Pipeline::new(Config::default(), flaky)
        .unwrap()
        .analyze(&video(), &CancelToken::new())
        .unwrap();

    assert_eq!(entry.tracks.len(), FRAMES);
    assert_eq!(entry.tracks.players(1).count(), 0);
    // the ball gap left by the failed frame is interpolated
    assert!(entry.tracks.ball(1).unwrap().interpolated);
}

#[test]
fn empty_video_is_rejected() {
    assert!(matches!(FrameStore::new(Vec::new()), Err(Error::EmptyVideo)));
}
