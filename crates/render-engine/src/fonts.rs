//! Font discovery and font-backed text measurement.

use std::path::{Path, PathBuf};

use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use rusttype::{point, Font, Scale};

use crate::layout::{ApproxMetrics, FontWeight, TextMeasure};

/// Regular and bold faces used for captions and titles.
///
/// Either face may be missing; the set then measures with [`ApproxMetrics`]
/// and the rasterizer skips text.
#[derive(Clone, Default)]
pub struct FontSet {
    regular: Option<Font<'static>>,
    bold: Option<Font<'static>>,
    fallback: ApproxMetrics,
}

const SYSTEM_REGULAR: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

const SYSTEM_BOLD: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
];

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("regular", &self.regular.is_some())
            .field("bold", &self.bold.is_some())
            .finish()
    }
}

impl FontSet {
    /// A set with no faces: approximate metrics, no text drawn.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load configured faces, falling back to well-known system paths.
    pub fn discover(regular: Option<&Path>, bold: Option<&Path>) -> Self {
        let regular_font = regular
            .and_then(load_logged)
            .or_else(|| first_existing(SYSTEM_REGULAR));
        let bold_font = bold
            .and_then(load_logged)
            .or_else(|| first_existing(SYSTEM_BOLD))
            .or_else(|| regular_font.clone());

        let set = Self {
            regular: regular_font.or_else(|| bold_font.clone()),
            bold: bold_font,
            fallback: ApproxMetrics::default(),
        };
        if set.is_empty() {
            tracing::warn!("No usable font found; text will not be drawn");
        } else {
            tracing::debug!(fonts = ?set, "Fonts loaded");
        }
        set
    }

    pub fn from_bytes(regular: Vec<u8>, bold: Option<Vec<u8>>) -> KeepsakeResult<Self> {
        let regular = Font::try_from_vec(regular)
            .ok_or_else(|| KeepsakeError::render("Invalid regular font data"))?;
        let bold = match bold {
            Some(bytes) => Font::try_from_vec(bytes)
                .ok_or_else(|| KeepsakeError::render("Invalid bold font data"))?,
            None => regular.clone(),
        };
        Ok(Self {
            regular: Some(regular),
            bold: Some(bold),
            fallback: ApproxMetrics::default(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_none() && self.bold.is_none()
    }

    /// Face for `weight`.
    pub fn face(&self, weight: FontWeight) -> Option<&Font<'static>> {
        if weight.is_bold() {
            self.bold.as_ref().or(self.regular.as_ref())
        } else {
            self.regular.as_ref().or(self.bold.as_ref())
        }
    }
}

impl TextMeasure for FontSet {
    fn measure(&self, text: &str, size: f64, weight: FontWeight) -> f64 {
        match self.face(weight) {
            Some(font) => advance_width(font, text, size as f32) as f64,
            None => self.fallback.measure(text, size, weight),
        }
    }
}

/// Horizontal advance of `text` at `size` px.
pub fn advance_width(font: &Font<'_>, text: &str, size: f32) -> f32 {
    let scale = Scale::uniform(size);
    font.layout(text, scale, point(0.0, 0.0))
        .last()
        .map(|glyph| glyph.position().x + glyph.unpositioned().h_metrics().advance_width)
        .unwrap_or(0.0)
}

fn load_logged(path: &Path) -> Option<Font<'static>> {
    match load_font(path) {
        Ok(font) => Some(font),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Failed to load font");
            None
        }
    }
}

fn load_font(path: &Path) -> KeepsakeResult<Font<'static>> {
    if !path.exists() {
        return Err(KeepsakeError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path)?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| KeepsakeError::render(format!("{} is not a TrueType font", path.display())))
}

fn first_existing(candidates: &[&str]) -> Option<Font<'static>> {
    candidates
        .iter()
        .map(PathBuf::from)
        .filter(|path| path.exists())
        .find_map(|path| load_font(&path).ok())
}
