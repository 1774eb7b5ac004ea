//! Single-slide cards: one photo with a gradient caption card, as JPEG.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};

use keepsake_common::cancel::CancelToken;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use keepsake_slide_model::Slide;

use crate::compositor::{display_text, Color, DisplayList, DrawCommand, Fill, TextAlign, TextBaseline, TextStyle};
use crate::download::DownloadSink;
use crate::fonts::FontSet;
use crate::images::{ImageLoadError, ImageLoader};
use crate::layout::{CaptionLayout, FontWeight};
use crate::raster::{RasterCanvas, Surface};

pub const CARD_JPEG_QUALITY: u8 = 95;

/// Renders and saves slide cards.
pub struct CardExporter {
    loader: ImageLoader,
    fonts: FontSet,
    sink: Arc<dyn DownloadSink>,
    stem: String,
}

impl CardExporter {
    pub fn new(
        loader: ImageLoader,
        fonts: FontSet,
        sink: Arc<dyn DownloadSink>,
        stem: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            fonts,
            sink,
            stem: stem.into(),
        }
    }

    /// `<stem>-<index + 1>.jpg`.
    pub fn file_name(&self, index: usize) -> String {
        format!("{}-{}.jpg", self.stem, index + 1)
    }

    /// Render slide `index` as a card and save it.
    pub async fn export_card(
        &self,
        slide: &Slide,
        index: usize,
        cancel: &CancelToken,
    ) -> KeepsakeResult<PathBuf> {
        let photo = match self.loader.load(&slide.image_source, cancel).await {
            Ok(photo) => photo,
            Err(ImageLoadError::Cancelled) => return Err(KeepsakeError::Cancelled),
            Err(err) => {
                tracing::warn!(slide = index, error = %err, "Card image failed to load");
                return Err(KeepsakeError::render("Image failed to load"));
            }
        };

        let card = render_card(photo, slide, &self.fonts)?;
        let jpeg = encode_jpeg(card)?;
        let path = self.sink.save(&self.file_name(index), &jpeg).await?;
        tracing::info!(slide = index, path = %path.display(), "Card saved");
        Ok(path)
    }
}

/// Display list of the caption card for a photo of `width`x`height`.
pub fn card_display_list(slide: &Slide, width: u32, height: u32, fonts: &FontSet) -> DisplayList {
    let (w, h) = (width as f64, height as f64);
    let layout = CaptionLayout::card(&display_text(&slide.message), w, h, fonts);
    let mut list = DisplayList::new();

    list.push(DrawCommand::RoundedRect {
        x: layout.panel_x,
        y: layout.panel_y,
        w: layout.panel_w,
        h: layout.panel_h,
        radius: layout.corner_radius,
        fill: Fill::VerticalGradient {
            top: Color::rgba(236, 72, 153, 0.9),
            bottom: Color::rgba(244, 63, 94, 0.9),
        },
    });

    let text = |size: f64, weight: FontWeight| TextStyle {
        size,
        weight,
        align: TextAlign::Center,
        baseline: TextBaseline::Top,
        color: Color::WHITE,
        glow: None,
    };

    list.push(DrawCommand::Text {
        text: display_text(&slide.name),
        x: w / 2.0,
        y: layout.name_y(),
        style: text(layout.name_size, FontWeight::Bold),
    });
    let mut y = layout.message_y();
    for line in &layout.lines {
        list.push(DrawCommand::Text {
            text: line.clone(),
            x: w / 2.0,
            y,
            style: text(layout.message_size, FontWeight::Regular),
        });
        y += layout.line_height;
    }
    list
}

/// Draw the caption card over `photo` at its native size.
pub fn render_card(photo: RgbaImage, slide: &Slide, fonts: &FontSet) -> KeepsakeResult<RgbaImage> {
    let list = card_display_list(slide, photo.width(), photo.height(), fonts);
    let mut canvas = RasterCanvas::from_image(photo, fonts.clone());
    canvas.draw(&list)?;
    Ok(canvas.into_image())
}

pub fn encode_jpeg(image: RgbaImage) -> KeepsakeResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, CARD_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| KeepsakeError::render(format!("JPEG encoding failed: {e}")))?;
    Ok(out.into_inner())
}
