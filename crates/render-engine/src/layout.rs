//! Layout math shared by the compositor and the card exporter.
//!
//! Everything here is pure: cover-fit crops, greedy word wrapping, easing
//! curves, and the caption panel geometry.

use serde::{Deserialize, Serialize};

/// Source rectangle that fills a frame without distortion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverCrop {
    pub sx: f64,
    pub sy: f64,
    pub sw: f64,
    pub sh: f64,
}

/// Compute the centred crop of an `img_w`x`img_h` source that fills a
/// `frame_w`x`frame_h` frame at the frame's aspect ratio.
pub fn cover_fit(img_w: f64, img_h: f64, frame_w: f64, frame_h: f64) -> CoverCrop {
    if img_w <= 0.0 || img_h <= 0.0 || frame_w <= 0.0 || frame_h <= 0.0 {
        return CoverCrop {
            sx: 0.0,
            sy: 0.0,
            sw: img_w.max(0.0),
            sh: img_h.max(0.0),
        };
    }

    let image_ratio = img_w / img_h;
    let frame_ratio = frame_w / frame_h;

    if image_ratio > frame_ratio {
        let sw = img_h * frame_ratio;
        CoverCrop {
            sx: (img_w - sw) / 2.0,
            sy: 0.0,
            sw,
            sh: img_h,
        }
    } else {
        let sh = img_w / frame_ratio;
        CoverCrop {
            sx: 0.0,
            sy: (img_h - sh) / 2.0,
            sw: img_w,
            sh,
        }
    }
}

/// `t < 0.5 -> 4t^3`, otherwise `1 - (-2t + 2)^3 / 2`.
pub fn ease_in_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// `1 - (1 - t)^3`.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// Font weight used for measuring and drawing text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontWeight {
    #[default]
    Regular,
    /// Semibold (600) renders with the bold face.
    Semibold,
    Bold,
}

impl FontWeight {
    pub fn is_bold(&self) -> bool {
        !matches!(self, FontWeight::Regular)
    }
}

/// Measures the advance width of a run of text.
pub trait TextMeasure {
    fn measure(&self, text: &str, size: f64, weight: FontWeight) -> f64;
}

/// Font-independent metric: every character is `em_ratio` ems wide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApproxMetrics {
    pub em_ratio: f64,
}

impl Default for ApproxMetrics {
    fn default() -> Self {
        Self { em_ratio: 0.55 }
    }
}

impl TextMeasure for ApproxMetrics {
    fn measure(&self, text: &str, size: f64, weight: FontWeight) -> f64 {
        let bold = if weight.is_bold() { 1.05 } else { 1.0 };
        text.chars().count() as f64 * size * self.em_ratio * bold
    }
}

/// Greedy word wrap.
///
/// A candidate line is the current line plus the word plus a trailing
/// space; the line breaks when the candidate is wider than `max_width` and
/// the current line is not empty. A single word wider than `max_width`
/// stays on its own line. Always returns at least one (possibly empty) line.
pub fn wrap_text<M: TextMeasure + ?Sized>(
    text: &str,
    max_width: f64,
    size: f64,
    weight: FontWeight,
    measure: &M,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate = format!("{line}{word} ");
        if measure.measure(&candidate, size, weight) > max_width && !line.is_empty() {
            lines.push(line.trim().to_string());
            line = format!("{word} ");
        } else {
            line = candidate;
        }
    }
    lines.push(line.trim().to_string());
    lines
}

/// Geometry of the caption panel drawn over a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayout {
    pub padding: f64,
    pub name_size: f64,
    pub message_size: f64,
    pub line_height: f64,
    pub lines: Vec<String>,
    pub panel_x: f64,
    pub panel_y: f64,
    pub panel_w: f64,
    pub panel_h: f64,
    pub corner_radius: f64,
}

impl CaptionLayout {
    /// Panel used on video slides: dark translucent bar 50 px above the
    /// bottom edge.
    pub fn slide<M: TextMeasure + ?Sized>(
        message: &str,
        frame_w: f64,
        frame_h: f64,
        measure: &M,
    ) -> Self {
        let padding = frame_w * 0.04;
        let name_size = frame_w * 0.042;
        let message_size = frame_w * 0.028;
        let line_height = message_size * 1.5;
        let lines = wrap_text(
            message,
            frame_w * 0.7,
            message_size,
            FontWeight::Regular,
            measure,
        );

        let panel_w = frame_w * 0.72;
        let panel_h =
            padding + name_size + padding / 2.0 + lines.len() as f64 * line_height + padding;

        Self {
            padding,
            name_size,
            message_size,
            line_height,
            panel_x: (frame_w - panel_w) / 2.0,
            panel_y: frame_h - panel_h - 50.0,
            panel_w,
            panel_h,
            corner_radius: frame_w * 0.015,
            lines,
        }
    }

    /// Panel used on single-slide cards: gradient card at the image's
    /// native size with a margin of 5% of the width.
    pub fn card<M: TextMeasure + ?Sized>(
        message: &str,
        image_w: f64,
        image_h: f64,
        measure: &M,
    ) -> Self {
        let padding = image_w * 0.05;
        let name_size = image_w * 0.055;
        let message_size = image_w * 0.04;
        let line_height = message_size * 1.5;
        let panel_w = image_w * 0.85;
        let lines = wrap_text(
            message,
            panel_w - padding * 2.0,
            message_size,
            FontWeight::Regular,
            measure,
        );
        let panel_h =
            padding + name_size + padding / 2.0 + lines.len() as f64 * line_height + padding;

        Self {
            padding,
            name_size,
            message_size,
            line_height,
            panel_x: (image_w - panel_w) / 2.0,
            panel_y: image_h - panel_h - image_w * 0.05,
            panel_w,
            panel_h,
            corner_radius: image_w * 0.03,
            lines,
        }
    }

    /// Top of the name line.
    pub fn name_y(&self) -> f64 {
        self.panel_y + self.padding
    }

    /// Top of the first message line.
    pub fn message_y(&self) -> f64 {
        self.panel_y + self.padding + self.name_size + self.padding / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_cover_fit_wide_image_crops_sides() {
        let crop = cover_fit(1920.0, 1080.0, 720.0, 1280.0);
        assert!((crop.sw - 607.5).abs() < 1e-9);
        assert!((crop.sx - 656.25).abs() < 1e-9);
        assert_eq!(crop.sy, 0.0);
        assert_eq!(crop.sh, 1080.0);
    }

    #[test]
    fn test_cover_fit_tall_image_crops_top_and_bottom() {
        let crop = cover_fit(720.0, 2560.0, 720.0, 1280.0);
        assert_eq!(crop.sw, 720.0);
        assert!((crop.sh - 1280.0).abs() < 1e-9);
        assert!((crop.sy - 640.0).abs() < 1e-9);
    }

    #[test]
    fn test_easing_endpoints() {
        assert_eq!(ease_in_out_cubic(0.0), 0.0);
        assert_eq!(ease_in_out_cubic(1.0), 1.0);
        assert!((ease_in_out_cubic(0.5) - 0.5).abs() < 1e-12);
        assert!((ease_in_out_cubic(0.25) - 0.0625).abs() < 1e-12);
        assert_eq!(ease_out_cubic(1.0), 1.0);
        assert!((ease_out_cubic(0.5) - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_keeps_long_word_alone() {
        let metrics = ApproxMetrics { em_ratio: 1.0 };
        let lines = wrap_text("a incomprehensibly b", 5.0, 1.0, FontWeight::Regular, &metrics);
        assert_eq!(lines, vec!["a", "incomprehensibly", "b"]);
    }

    #[test]
    fn test_wrap_empty_message_yields_one_empty_line() {
        let lines = wrap_text("", 100.0, 10.0, FontWeight::Regular, &ApproxMetrics::default());
        assert_eq!(lines, vec![String::new()]);
    }

    #[test]
    fn test_slide_caption_geometry() {
        let metrics = ApproxMetrics::default();
        let layout = CaptionLayout::slide("Happy birthday!", 720.0, 1280.0, &metrics);
        assert_eq!(layout.lines.len(), 1);
        let expected_h = 28.8 + 30.24 + 14.4 + 30.24 + 28.8;
        assert!((layout.panel_h - expected_h).abs() < 1e-9);
        assert!((layout.panel_y + layout.panel_h - (1280.0 - 50.0)).abs() < 1e-9);
        assert!((layout.panel_w - 518.4).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_cover_fit_is_centred_and_in_bounds(
            img_w in 1.0f64..5000.0,
            img_h in 1.0f64..5000.0,
            frame_w in 1.0f64..3000.0,
            frame_h in 1.0f64..3000.0,
        ) {
            let crop = cover_fit(img_w, img_h, frame_w, frame_h);
            let eps = 1e-6 * img_w.max(img_h);
            prop_assert!(crop.sx >= -eps && crop.sy >= -eps);
            prop_assert!(crop.sw <= img_w + eps && crop.sh <= img_h + eps);
            prop_assert!((crop.sx * 2.0 + crop.sw - img_w).abs() <= eps);
            prop_assert!((crop.sy * 2.0 + crop.sh - img_h).abs() <= eps);
            let ratio = crop.sw / crop.sh;
            prop_assert!((ratio - frame_w / frame_h).abs() <= 1e-6 * (frame_w / frame_h).max(1.0));
        }

        #[test]
        fn prop_ease_in_out_is_monotone(a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(ease_in_out_cubic(lo) <= ease_in_out_cubic(hi) + 1e-12);
        }

        #[test]
        fn prop_wrap_preserves_words_and_width(
            words in proptest::collection::vec("[a-z]{1,12}", 0..40),
            max_width in 20.0f64..400.0,
        ) {
            let metrics = ApproxMetrics::default();
            let text = words.join(" ");
            let lines = wrap_text(&text, max_width, 10.0, FontWeight::Regular, &metrics);

            let rejoined: Vec<&str> = lines.iter().flat_map(|l| l.split_whitespace()).collect();
            let original: Vec<&str> = text.split_whitespace().collect();
            prop_assert_eq!(rejoined, original);

            for line in &lines {
                let single_word = line.split_whitespace().count() <= 1;
                let fits = metrics.measure(line, 10.0, FontWeight::Regular) <= max_width;
                prop_assert!(single_word || fits, "line {:?} overflows", line);
            }
        }
    }
}
