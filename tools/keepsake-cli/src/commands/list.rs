//! List slides from the record store or local cache.

use keepsake_common::config::AppConfig;
use keepsake_slide_store::SlideSource;

pub async fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let loaded = super::slide_loader(config)?.load().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&loaded.slides)?);
        return Ok(());
    }

    let source = match loaded.source {
        SlideSource::Remote => "record store",
        SlideSource::Cache => "local cache",
        SlideSource::Empty => {
            println!("No slides yet. Add one with `keepsake add` or `keepsake upload`.");
            return Ok(());
        }
    };
    println!("{} slides from the {source}:", loaded.slides.len());
    for (i, slide) in loaded.slides.iter().enumerate() {
        println!("  {:>3}. {}: {}", i + 1, slide.name, slide.message);
        println!("       {}", slide.image_source);
    }
    Ok(())
}
