//! Render all slides into one slideshow video.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use keepsake_common::cancel::CancelToken;
use keepsake_common::clock::FramePacing;
use keepsake_common::config::{AppConfig, ImageFallbackPolicy};
use keepsake_render_engine::{
    probe_formats, DirectorySink, ExportOptions, ExportOutcome, ExportProgress, ExportStage,
    FfmpegEncoder, FfprobeRouter, FontSet, ImageLoader, MusicTrack, RasterCanvas,
    SlideshowExporter, SourceFetcher,
};
use keepsake_slide_model::{ExportTimeline, OUTPUT_HEIGHT, OUTPUT_WIDTH};

pub struct ExportArgs {
    pub slides: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub music: Option<String>,
    pub fast: bool,
    pub skip_missing: bool,
    pub seed: Option<u64>,
}

pub async fn run(config: AppConfig, args: ExportArgs) -> anyhow::Result<()> {
    let slides = super::load_slides(&config, args.slides.as_deref()).await?;
    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());
    let timeline = ExportTimeline::for_slide_count(slides.len());

    println!("Exporting {} slides", slides.len());
    println!("  Output: {}", output_dir.display());
    println!(
        "  Length: {} frames ({:.1}s)",
        timeline.total_frames(),
        timeline.duration_secs()
    );

    let ffmpeg = config.render.ffmpeg.clone();
    let support = probe_formats(&ffmpeg)
        .await
        .with_context(|| format!("Failed to probe encoders with {ffmpeg}"))?;

    let fonts = FontSet::discover(
        config.render.font.as_deref(),
        config.render.bold_font.as_deref(),
    );
    let fallback = if args.skip_missing {
        ImageFallbackPolicy::Skip
    } else {
        config.render.image_fallback
    };
    let images = ImageLoader::new(Arc::new(SourceFetcher::new()), config.render.image_timeout())
        .with_fallback(fallback);

    let mut options = ExportOptions::from_config(&config);
    if args.fast {
        options.pacing = FramePacing::Unpaced;
    }
    if args.seed.is_some() {
        options.particle_seed = args.seed;
    }

    let progress_cb = Arc::new(|p: ExportProgress| {
        if p.stage == ExportStage::Rendering {
            print!(
                "\r  Progress: {:>3}% ({}/{} frames)  ",
                p.percent, p.frames_rendered, p.total_frames
            );
            std::io::stdout().flush().ok();
        }
    });

    let mut exporter = SlideshowExporter::new(
        Box::new(RasterCanvas::new(OUTPUT_WIDTH, OUTPUT_HEIGHT, fonts.clone())),
        Box::new(FfmpegEncoder::new(ffmpeg.clone())),
        Arc::new(DirectorySink::new(output_dir)),
        images,
        support,
    )
    .with_measure(Arc::new(fonts))
    .with_options(options)
    .on_progress(progress_cb);

    if let Some(source) = args.music.or_else(|| config.render.music.clone()) {
        exporter = exporter.with_music(
            MusicTrack::new(source),
            Arc::new(FfprobeRouter::beside_ffmpeg(&ffmpeg)),
        );
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    match exporter.export_video(&slides, &cancel).await {
        Ok(ExportOutcome::Empty) => {
            println!("No slides to export.");
        }
        Ok(ExportOutcome::Saved {
            path,
            format,
            bytes,
            with_audio,
            skipped_slides,
            ..
        }) => {
            println!("\nExport complete: {}", path.display());
            println!("  Format: {} ({})", format, format.mime_type());
            println!("  Size: {:.1} MB", bytes as f64 / 1_000_000.0);
            if !with_audio {
                println!("  Audio: none");
            }
            if !skipped_slides.is_empty() {
                let numbers: Vec<String> =
                    skipped_slides.iter().map(|i| (i + 1).to_string()).collect();
                println!("  Skipped slides: {}", numbers.join(", "));
            }
        }
        Ok(ExportOutcome::Cancelled { frames_drawn }) => {
            println!("\nExport cancelled after {frames_drawn} frames; nothing was saved.");
        }
        Err(e) => {
            println!("\nExport failed: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}
