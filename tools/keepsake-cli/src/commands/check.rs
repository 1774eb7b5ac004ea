//! Check ffmpeg, encoder support, and fonts.

use keepsake_common::config::AppConfig;
use keepsake_render_engine::encoder::command_exists;
use keepsake_render_engine::{probe_formats, FfprobeRouter, FontSet};
use keepsake_slide_model::VideoFormat;

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Keepsake System Check");
    println!("{}", "=".repeat(50));

    let ffmpeg = &config.render.ffmpeg;
    if !command_exists(ffmpeg) {
        println!("[FAIL] {ffmpeg} not found. Install ffmpeg or set render.ffmpeg in the config.");
        return Ok(());
    }
    println!("[OK] ffmpeg: {ffmpeg}");

    let support = match probe_formats(ffmpeg).await {
        Ok(support) => support,
        Err(e) => {
            println!("[FAIL] Could not list encoders: {e}");
            return Ok(());
        }
    };
    for format in VideoFormat::PREFERENCE {
        let status = if support.supports(format) { "OK" } else { "MISSING" };
        println!(
            "[{status}] {}: {} + {}",
            format,
            format.video_encoder(),
            format.audio_encoder()
        );
    }

    let ffprobe = FfprobeRouter::beside_ffmpeg(ffmpeg);
    if command_exists(ffprobe.binary()) {
        println!("[OK] ffprobe: {} (background music)", ffprobe.binary());
    } else {
        println!("[WARN] ffprobe not found: exports will be video-only");
    }

    let fonts = FontSet::discover(
        config.render.font.as_deref(),
        config.render.bold_font.as_deref(),
    );
    if fonts.is_empty() {
        println!("[WARN] No font found: captions and titles will not be drawn");
    } else {
        println!("[OK] Fonts loaded");
    }

    println!();
    match support.select() {
        Some(format) => println!(
            "Exports will be written as {} ({}).",
            format.file_name(match format {
                VideoFormat::Mp4 => &config.branding.mp4_stem,
                VideoFormat::Webm => &config.branding.webm_stem,
            }),
            format.mime_type()
        ),
        None => println!("No supported encoder profile. Exports will fail."),
    }

    Ok(())
}
