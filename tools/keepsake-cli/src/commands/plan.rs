//! Print the phase schedule of an export.

use std::path::PathBuf;

use keepsake_slide_model::{load_slides_file, ExportTimeline, Phase, FRAME_RATE_HZ};

pub fn run(count: Option<usize>, slides: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let slide_count = match (count, slides) {
        (Some(count), _) => count,
        (None, Some(path)) => load_slides_file(&path)?.len(),
        (None, None) => anyhow::bail!("Pass --count or --slides"),
    };
    let timeline = ExportTimeline::for_slide_count(slide_count);

    if json {
        println!("{}", serde_json::to_string_pretty(timeline.spans())?);
        return Ok(());
    }

    println!("Schedule for {slide_count} slides @ {FRAME_RATE_HZ} fps");
    println!("{}", "=".repeat(50));
    for span in timeline.spans() {
        println!(
            "  {:>6}  {:>7.2}s  {:>4} frames  {}",
            span.start_frame,
            span.start_frame as f64 / FRAME_RATE_HZ as f64,
            span.frames,
            describe(span.phase)
        );
    }
    println!("{}", "=".repeat(50));
    println!(
        "Total: {} frames ({:.1}s)",
        timeline.total_frames(),
        timeline.duration_secs()
    );
    Ok(())
}

fn describe(phase: Phase) -> String {
    match phase {
        Phase::Intro => "intro".to_string(),
        Phase::Slide { index } => format!("slide {}", index + 1),
        Phase::Transition { from, to } => format!("transition {} -> {}", from + 1, to + 1),
        Phase::Outro => "outro".to_string(),
    }
}
