//! Rasterizer: draws display lists into an RGBA frame.

use std::collections::HashMap;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_polygon_mut, Blend};
use imageproc::point::Point;
use rusttype::{point, Scale};

use keepsake_common::error::{KeepsakeError, KeepsakeResult};

use crate::compositor::{Color, DisplayList, DrawCommand, Fill, TextAlign, TextBaseline, TextStyle};
use crate::fonts::{advance_width, FontSet};
use crate::layout::cover_fit;

/// A drawable frame the export loop renders into.
pub trait Surface: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Make the image for `slide` available to `Image` commands.
    fn bind_image(&mut self, slide: usize, image: &RgbaImage);

    /// Drop the image bound to `slide`.
    fn release_image(&mut self, slide: usize);

    /// Draw one frame.
    fn draw(&mut self, list: &DisplayList) -> KeepsakeResult<()>;

    /// Current frame as tightly packed RGBA bytes.
    fn pixels(&self) -> &[u8];
}

/// CPU rasterizer backed by an [`RgbaImage`].
pub struct RasterCanvas {
    frame: RgbaImage,
    fonts: FontSet,
    images: HashMap<usize, Arc<RgbaImage>>,
    warned_no_font: bool,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32, fonts: FontSet) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255])), fonts)
    }

    /// Draw on top of an existing image.
    pub fn from_image(frame: RgbaImage, fonts: FontSet) -> Self {
        Self {
            frame,
            fonts,
            images: HashMap::new(),
            warned_no_font: false,
        }
    }

    pub fn frame(&self) -> &RgbaImage {
        &self.frame
    }

    pub fn into_image(self) -> RgbaImage {
        self.frame
    }

    pub fn bound_images(&self) -> usize {
        self.images.len()
    }

    fn execute(&mut self, command: &DrawCommand) -> KeepsakeResult<()> {
        match command {
            DrawCommand::Clear(color) => {
                let px = to_pixel(*color);
                for pixel in self.frame.pixels_mut() {
                    *pixel = px;
                }
            }
            DrawCommand::RadialGradient {
                cx,
                cy,
                radius,
                inner,
                outer,
            } => self.radial_gradient(*cx, *cy, *radius, *inner, *outer),
            DrawCommand::Image { slide, alpha } => {
                let image = self.images.get(slide).cloned().ok_or_else(|| {
                    KeepsakeError::render(format!("No image bound for slide {slide}"))
                })?;
                self.composite(&image, *alpha);
            }
            DrawCommand::RoundedRect {
                x,
                y,
                w,
                h,
                radius,
                fill,
            } => self.rounded_rect(*x, *y, *w, *h, *radius, *fill),
            DrawCommand::Line {
                x0,
                y0,
                x1,
                y1,
                width,
                color,
            } => self.line((*x0, *y0), (*x1, *y1), *width, *color),
            DrawCommand::Circle {
                cx,
                cy,
                radius,
                color,
            } => {
                let center = (cx.round() as i32, cy.round() as i32);
                let radius = radius.round().max(0.0) as i32;
                self.blended(|canvas| draw_filled_circle_mut(canvas, center, radius, to_pixel(*color)));
            }
            DrawCommand::Heart {
                cx,
                cy,
                size,
                rotation_deg,
                color,
            } => {
                let points = heart_polygon(*cx, *cy, *size, *rotation_deg);
                self.polygon(&points, *color);
            }
            DrawCommand::Sparkle {
                cx,
                cy,
                size,
                color,
            } => {
                let points = sparkle_polygon(*cx, *cy, *size);
                self.polygon(&points, *color);
            }
            DrawCommand::Text { text, x, y, style } => self.text(text, *x, *y, style),
        }
        Ok(())
    }

    fn blended(&mut self, draw: impl FnOnce(&mut Blend<RgbaImage>)) {
        let mut canvas = Blend(std::mem::take(&mut self.frame));
        draw(&mut canvas);
        self.frame = canvas.0;
    }

    fn polygon(&mut self, points: &[Point<i32>], color: Color) {
        if color.a <= 0.0 {
            return;
        }
        let mut poly: Vec<Point<i32>> = Vec::with_capacity(points.len());
        for p in points {
            if poly.last() != Some(p) {
                poly.push(*p);
            }
        }
        while poly.len() > 1 && poly.first() == poly.last() {
            poly.pop();
        }
        if poly.len() < 3 {
            return;
        }
        self.blended(|canvas| draw_polygon_mut(canvas, &poly, to_pixel(color)));
    }

    fn radial_gradient(&mut self, cx: f64, cy: f64, radius: f64, inner: Color, outer: Color) {
        let radius = radius.max(1.0);
        for (x, y, pixel) in self.frame.enumerate_pixels_mut() {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            let t = ((dx * dx + dy * dy).sqrt() / radius).min(1.0);
            *pixel = to_pixel(lerp_color(inner, outer, t));
        }
    }

    fn composite(&mut self, image: &RgbaImage, alpha: f64) {
        if alpha <= 0.0 {
            return;
        }
        for (dst, src) in self.frame.pixels_mut().zip(image.pixels()) {
            let a = alpha * src[3] as f64 / 255.0;
            blend(dst, [src[0], src[1], src[2]], a);
        }
    }

    fn rounded_rect(&mut self, x: f64, y: f64, w: f64, h: f64, radius: f64, fill: Fill) {
        if w <= 0.0 || h <= 0.0 {
            return;
        }
        let radius = radius.clamp(0.0, w.min(h) / 2.0);
        let (half_w, half_h) = (w / 2.0, h / 2.0);
        let (cx, cy) = (x + half_w, y + half_h);
        let (x_min, y_min, x_max, y_max) = self.clip(x, y, x + w, y + h);

        for py in y_min..y_max {
            let color = match fill {
                Fill::Solid(color) => color,
                Fill::VerticalGradient { top, bottom } => {
                    lerp_color(top, bottom, ((py as f64 + 0.5 - y) / h).clamp(0.0, 1.0))
                }
            };
            for px in x_min..x_max {
                let qx = (px as f64 + 0.5 - cx).abs() - (half_w - radius);
                let qy = (py as f64 + 0.5 - cy).abs() - (half_h - radius);
                let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
                let dist = outside + qx.max(qy).min(0.0) - radius;
                let coverage = (0.5 - dist).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let pixel = self.frame.get_pixel_mut(px, py);
                    blend(pixel, [color.r, color.g, color.b], color.a * coverage);
                }
            }
        }
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), width: f64, color: Color) {
        let half = width / 2.0;
        let (x_min, y_min, x_max, y_max) = self.clip(
            from.0.min(to.0) - half - 1.0,
            from.1.min(to.1) - half - 1.0,
            from.0.max(to.0) + half + 1.0,
            from.1.max(to.1) + half + 1.0,
        );
        for py in y_min..y_max {
            for px in x_min..x_max {
                let d = segment_distance((px as f64 + 0.5, py as f64 + 0.5), from, to);
                let coverage = (half + 0.5 - d).clamp(0.0, 1.0);
                if coverage > 0.0 {
                    let pixel = self.frame.get_pixel_mut(px, py);
                    blend(pixel, [color.r, color.g, color.b], color.a * coverage);
                }
            }
        }
    }

    fn text(&mut self, text: &str, x: f64, y: f64, style: &TextStyle) {
        if text.is_empty() || style.color.a <= 0.0 {
            return;
        }
        let Some(font) = self.fonts.face(style.weight).cloned() else {
            if !self.warned_no_font {
                tracing::warn!("Skipping text: no font available");
                self.warned_no_font = true;
            }
            return;
        };

        let size = style.size as f32;
        let scale = Scale::uniform(size);
        let width = advance_width(&font, text, size) as f64;
        let v = font.v_metrics(scale);
        let left = match style.align {
            TextAlign::Left => x,
            TextAlign::Center => x - width / 2.0,
            TextAlign::Right => x - width,
        };
        let baseline = match style.baseline {
            TextBaseline::Top => y + v.ascent as f64,
            TextBaseline::Middle => y + (v.ascent + v.descent) as f64 / 2.0,
            TextBaseline::Alphabetic => y,
        };

        if let Some(glow) = style.glow {
            // Ring of faint offset copies approximates a blurred shadow.
            let reach = (glow.blur / 3.0).max(1.0);
            let color = glow.color.fade(0.18);
            for step in 0..8 {
                let angle = step as f64 * std::f64::consts::FRAC_PI_4;
                self.glyphs(
                    &font,
                    text,
                    scale,
                    (left + angle.cos() * reach, baseline + angle.sin() * reach),
                    color,
                );
            }
        }
        self.glyphs(&font, text, scale, (left, baseline), style.color);
    }

    fn glyphs(
        &mut self,
        font: &rusttype::Font<'static>,
        text: &str,
        scale: Scale,
        origin: (f64, f64),
        color: Color,
    ) {
        let (w, h) = (self.frame.width() as i32, self.frame.height() as i32);
        let rgb = [color.r, color.g, color.b];
        for glyph in font.layout(text, scale, point(origin.0 as f32, origin.1 as f32)) {
            let Some(bb) = glyph.pixel_bounding_box() else {
                continue;
            };
            let frame = &mut self.frame;
            glyph.draw(|gx, gy, coverage| {
                let px = bb.min.x + gx as i32;
                let py = bb.min.y + gy as i32;
                if px >= 0 && py >= 0 && px < w && py < h {
                    let pixel = frame.get_pixel_mut(px as u32, py as u32);
                    blend(pixel, rgb, color.a * coverage as f64);
                }
            });
        }
    }

    /// Pixel bounds of a float rectangle, clipped to the frame.
    fn clip(&self, x0: f64, y0: f64, x1: f64, y1: f64) -> (u32, u32, u32, u32) {
        let w = self.frame.width() as f64;
        let h = self.frame.height() as f64;
        (
            x0.floor().clamp(0.0, w) as u32,
            y0.floor().clamp(0.0, h) as u32,
            x1.ceil().clamp(0.0, w) as u32,
            y1.ceil().clamp(0.0, h) as u32,
        )
    }
}

impl Surface for RasterCanvas {
    fn width(&self) -> u32 {
        self.frame.width()
    }

    fn height(&self) -> u32 {
        self.frame.height()
    }

    fn bind_image(&mut self, slide: usize, image: &RgbaImage) {
        if self.images.contains_key(&slide) {
            return;
        }
        let fitted = fit_cover(image, self.frame.width(), self.frame.height());
        self.images.insert(slide, Arc::new(fitted));
    }

    fn release_image(&mut self, slide: usize) {
        self.images.remove(&slide);
    }

    fn draw(&mut self, list: &DisplayList) -> KeepsakeResult<()> {
        for command in list.commands() {
            self.execute(command)?;
        }
        Ok(())
    }

    fn pixels(&self) -> &[u8] {
        self.frame.as_raw()
    }
}

/// Crop `image` to the frame aspect ratio around its centre and scale it to
/// `width`x`height`.
pub fn fit_cover(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let crop = cover_fit(
        image.width() as f64,
        image.height() as f64,
        width as f64,
        height as f64,
    );
    let sx = crop.sx.round().max(0.0) as u32;
    let sy = crop.sy.round().max(0.0) as u32;
    let sw = (crop.sw.round() as u32).clamp(1, image.width().saturating_sub(sx).max(1));
    let sh = (crop.sh.round() as u32).clamp(1, image.height().saturating_sub(sy).max(1));
    let cropped = imageops::crop_imm(image, sx, sy, sw, sh).to_image();
    imageops::resize(&cropped, width, height, FilterType::Triangle)
}

/// Heart outline centred on (`cx`, `cy`), `size` px tall, rotated clockwise.
pub fn heart_polygon(cx: f64, cy: f64, size: f64, rotation_deg: f64) -> Vec<Point<i32>> {
    const STEPS: usize = 28;
    let scale = size / 34.0;
    let (sin_r, cos_r) = rotation_deg.to_radians().sin_cos();
    (0..STEPS)
        .map(|k| {
            let t = k as f64 / STEPS as f64 * std::f64::consts::TAU;
            let hx = 16.0 * t.sin().powi(3);
            let hy = -(13.0 * t.cos()
                - 5.0 * (2.0 * t).cos()
                - 2.0 * (3.0 * t).cos()
                - (4.0 * t).cos());
            let (x, y) = (hx * scale, hy * scale);
            Point::new(
                (cx + x * cos_r - y * sin_r).round() as i32,
                (cy + x * sin_r + y * cos_r).round() as i32,
            )
        })
        .collect()
}

/// Four-pointed star centred on (`cx`, `cy`).
pub fn sparkle_polygon(cx: f64, cy: f64, size: f64) -> Vec<Point<i32>> {
    let outer = size / 2.0;
    let inner = size / 7.0;
    (0..8)
        .map(|k| {
            let angle = k as f64 * std::f64::consts::FRAC_PI_4 - std::f64::consts::FRAC_PI_2;
            let r = if k % 2 == 0 { outer } else { inner };
            Point::new(
                (cx + angle.cos() * r).round() as i32,
                (cy + angle.sin() * r).round() as i32,
            )
        })
        .collect()
}

fn to_pixel(color: Color) -> Rgba<u8> {
    Rgba([
        color.r,
        color.g,
        color.b,
        (color.a.clamp(0.0, 1.0) * 255.0).round() as u8,
    ])
}

fn lerp_color(a: Color, b: Color, t: f64) -> Color {
    let mix = |x: u8, y: u8| (x as f64 + (y as f64 - x as f64) * t).round() as u8;
    Color {
        r: mix(a.r, b.r),
        g: mix(a.g, b.g),
        b: mix(a.b, b.b),
        a: a.a + (b.a - a.a) * t,
    }
}

/// Source-over blend of a straight-alpha colour onto `dst`.
fn blend(dst: &mut Rgba<u8>, rgb: [u8; 3], alpha: f64) {
    let a = alpha.clamp(0.0, 1.0);
    if a <= 0.0 {
        return;
    }
    for c in 0..3 {
        dst[c] = (rgb[c] as f64 * a + dst[c] as f64 * (1.0 - a)).round() as u8;
    }
    let da = dst[3] as f64 / 255.0;
    dst[3] = ((a + da * (1.0 - a)) * 255.0).round() as u8;
}

fn segment_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq <= f64::EPSILON {
        0.0
    } else {
        (((p.0 - a.0) * abx + (p.1 - a.1) * aby) / len_sq).clamp(0.0, 1.0)
    };
    let (qx, qy) = (a.0 + abx * t, a.1 + aby * t);
    ((p.0 - qx).powi(2) + (p.1 - qy).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(commands: Vec<DrawCommand>) -> DisplayList {
        let mut list = DisplayList::new();
        for command in commands {
            list.push(command);
        }
        list
    }

    #[test]
    fn test_clear_then_translucent_rect_blends() {
        let mut canvas = RasterCanvas::new(40, 40, FontSet::empty());
        canvas
            .draw(&list(vec![
                DrawCommand::Clear(Color::WHITE),
                DrawCommand::RoundedRect {
                    x: 0.0,
                    y: 0.0,
                    w: 40.0,
                    h: 40.0,
                    radius: 0.0,
                    fill: Fill::Solid(Color::rgba(0, 0, 0, 0.5)),
                },
            ]))
            .unwrap();
        let px = canvas.frame().get_pixel(20, 20);
        assert!((px[0] as i32 - 128).abs() <= 1, "got {px:?}");
        assert_eq!(px[3], 255);
    }

    #[test]
    fn test_rounded_corners_are_not_filled() {
        let mut canvas = RasterCanvas::new(40, 40, FontSet::empty());
        canvas
            .draw(&list(vec![
                DrawCommand::Clear(Color::BLACK),
                DrawCommand::RoundedRect {
                    x: 0.0,
                    y: 0.0,
                    w: 40.0,
                    h: 40.0,
                    radius: 12.0,
                    fill: Fill::Solid(Color::WHITE),
                },
            ]))
            .unwrap();
        assert_eq!(canvas.frame().get_pixel(0, 0)[0], 0);
        assert_eq!(canvas.frame().get_pixel(20, 20)[0], 255);
    }

    #[test]
    fn test_image_command_requires_binding() {
        let mut canvas = RasterCanvas::new(8, 8, FontSet::empty());
        let err = canvas
            .draw(&list(vec![DrawCommand::Image { slide: 3, alpha: 1.0 }]))
            .unwrap_err();
        assert!(matches!(err, KeepsakeError::Render { .. }));
    }

    #[test]
    fn test_cross_fade_halfway_mixes_images() {
        let mut canvas = RasterCanvas::new(8, 16, FontSet::empty());
        canvas.bind_image(0, &RgbaImage::from_pixel(32, 32, Rgba([255, 0, 0, 255])));
        canvas.bind_image(1, &RgbaImage::from_pixel(10, 40, Rgba([0, 0, 255, 255])));
        canvas
            .draw(&list(vec![
                DrawCommand::Clear(Color::BLACK),
                DrawCommand::Image { slide: 0, alpha: 0.5 },
                DrawCommand::Image { slide: 1, alpha: 0.5 },
            ]))
            .unwrap();
        let px = canvas.frame().get_pixel(4, 8);
        assert!(px[0] > 50 && px[2] > 100, "got {px:?}");
        canvas.release_image(0);
        assert_eq!(canvas.bound_images(), 1);
    }

    #[test]
    fn test_fit_cover_output_size() {
        let wide = RgbaImage::from_pixel(1920, 1080, Rgba([1, 2, 3, 255]));
        let fitted = fit_cover(&wide, 72, 128);
        assert_eq!(fitted.dimensions(), (72, 128));
    }

    #[test]
    fn test_particle_polygons_are_drawable() {
        let mut canvas = RasterCanvas::new(64, 64, FontSet::empty());
        canvas
            .draw(&list(vec![
                DrawCommand::Clear(Color::BLACK),
                DrawCommand::Heart {
                    cx: 32.0,
                    cy: 32.0,
                    size: 30.0,
                    rotation_deg: 45.0,
                    color: Color::PINK,
                },
                DrawCommand::Sparkle {
                    cx: 0.5,
                    cy: 0.5,
                    size: 1.0,
                    color: Color::GOLD,
                },
                DrawCommand::Circle {
                    cx: 10.0,
                    cy: 10.0,
                    radius: 0.2,
                    color: Color::WHITE,
                },
            ]))
            .unwrap();
        assert!(canvas.frame().get_pixel(32, 32)[0] > 100);
    }

    #[test]
    fn test_text_without_font_is_skipped() {
        let mut canvas = RasterCanvas::new(16, 16, FontSet::empty());
        let style = TextStyle {
            size: 12.0,
            weight: crate::layout::FontWeight::Bold,
            align: TextAlign::Center,
            baseline: TextBaseline::Middle,
            color: Color::WHITE,
            glow: None,
        };
        canvas
            .draw(&list(vec![
                DrawCommand::Clear(Color::BLACK),
                DrawCommand::Text {
                    text: "hi".to_string(),
                    x: 8.0,
                    y: 8.0,
                    style,
                },
            ]))
            .unwrap();
        assert!(canvas.frame().pixels().all(|p| p[0] == 0));
    }
}
