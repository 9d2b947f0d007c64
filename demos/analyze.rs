use anyhow::{bail, Context, Result};
use clap::Parser;
use pitchtrack::render::load_font;
use pitchtrack::{
    AnnotationRenderer, CancelToken, Config, FrameStore, Pipeline, PipelineCache, ReplayDetector,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Analyzes a decoded match video and writes annotated frames.
#[derive(Parser, Debug)]
#[command(name = "analyze")]
struct Args {
    /// Directory of frame images, read in file name order
    #[arg(long)]
    frames: PathBuf,

    /// Recorded detections, one `<frame>:<json array>` line per frame
    #[arg(long)]
    dets: PathBuf,

    /// Where annotated PNG frames are written
    #[arg(long, default_value = "output")]
    out: PathBuf,

    /// Analytics cache directory
    #[arg(long)]
    cache: Option<PathBuf>,

    /// YAML configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// TrueType font for labels
    #[arg(long)]
    font: Option<PathBuf>,
}

fn load_frames(dir: &Path) -> Result<FrameStore> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list frames in {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("png" | "jpg" | "jpeg")
            )
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        bail!("no frame images in {}", dir.display());
    }

    let images = paths
        .iter()
        .map(|p| {
            image::open(p)
                .map(|img| img.to_rgb8())
                .with_context(|| format!("Failed to decode {}", p.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FrameStore::new(images)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pitchtrack=info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let frames = load_frames(&args.frames)?;
    info!(frames = frames.len(), dims = ?frames.dims(), "video loaded");

    let detector = Arc::new(ReplayDetector::open(&args.dets)?);
    let pipeline = Pipeline::new(config, detector)?;

    let cache = args.cache.as_ref().map(PipelineCache::open).transpose()?;
    let analysis = pipeline.run(&frames, cache.as_ref(), &CancelToken::new())?;
    info!(
        fingerprint = %analysis.fingerprint,
        from_cache = analysis.from_cache,
        "analysis ready"
    );

    let mut renderer = AnnotationRenderer::new();
    if let Some(font) = &args.font {
        renderer = renderer.with_font(load_font(font)?);
    }

    std::fs::create_dir_all(&args.out)?;
    for (idx, img) in renderer.render(&frames, &analysis.entry).iter().enumerate() {
        img.save(args.out.join(format!("{:06}.png", idx)))?;
    }

    info!(out = %args.out.display(), "annotated frames written");

    Ok(())
}
