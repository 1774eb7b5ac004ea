//! Render one slide as a JPEG card.

use std::path::PathBuf;
use std::sync::Arc;

use keepsake_common::cancel::CancelToken;
use keepsake_common::config::AppConfig;
use keepsake_render_engine::{CardExporter, DirectorySink, FontSet, ImageLoader, SourceFetcher};

pub async fn run(
    config: AppConfig,
    number: usize,
    slides: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let slides = super::load_slides(&config, slides.as_deref()).await?;
    let slide = number
        .checked_sub(1)
        .and_then(|index| slides.get(index))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No slide {number}: slide numbers run from 1 to {}",
                slides.len()
            )
        })?;

    let output_dir = output.unwrap_or_else(|| config.output_dir.clone());
    let fonts = FontSet::discover(
        config.render.font.as_deref(),
        config.render.bold_font.as_deref(),
    );
    let images = ImageLoader::new(Arc::new(SourceFetcher::new()), config.render.image_timeout());
    let cards = CardExporter::new(
        images,
        fonts,
        Arc::new(DirectorySink::new(output_dir)),
        config.branding.card_stem.clone(),
    );

    let path = cards
        .export_card(slide, number - 1, &CancelToken::new())
        .await?;
    println!("Card saved: {}", path.display());
    Ok(())
}
