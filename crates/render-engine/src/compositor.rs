//! Frame compositor: turns a phase and a frame index into a display list.
//!
//! The compositor never touches pixels. Each call to
//! [`Compositor::render_frame`] is a pure function of the phase, the local
//! frame index, and the state captured at construction (slides, branding,
//! particle seed), so frames can be produced in any order and tested without
//! a rasterizer.

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use keepsake_slide_model::{Phase, Slide, CAPTION_FADE_FRAMES};

use crate::layout::{
    ease_in_out_cubic, ease_out_cubic, CaptionLayout, FontWeight, TextMeasure,
};
use crate::particles::ParticleField;

/// Straight-alpha colour. `a` is in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const PINK: Color = Color::rgb(0xec, 0x48, 0x99);
    pub const GOLD: Color = Color::rgb(0xfb, 0xbf, 0x24);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    /// `0xRRGGBB`.
    pub const fn hex(rgb: u32) -> Self {
        Self::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
    }

    /// Multiply opacity by `alpha`.
    pub fn fade(self, alpha: f64) -> Self {
        Self {
            a: (self.a * alpha).clamp(0.0, 1.0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical anchor of the text origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextBaseline {
    Top,
    #[default]
    Middle,
    Alphabetic,
}

/// Soft halo drawn behind text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glow {
    pub color: Color,
    pub blur: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub size: f64,
    pub weight: FontWeight,
    pub align: TextAlign,
    pub baseline: TextBaseline,
    pub color: Color,
    pub glow: Option<Glow>,
}

impl TextStyle {
    fn centered(size: f64, weight: FontWeight, color: Color) -> Self {
        Self {
            size,
            weight,
            align: TextAlign::Center,
            baseline: TextBaseline::Middle,
            color,
            glow: None,
        }
    }

    fn top(mut self) -> Self {
        self.baseline = TextBaseline::Top;
        self
    }

    fn aligned(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    fn glowing(mut self, color: Color, blur: f64) -> Self {
        self.glow = Some(Glow { color, blur });
        self
    }

    fn faded(mut self, alpha: f64) -> Self {
        self.color = self.color.fade(alpha);
        if let Some(glow) = self.glow.as_mut() {
            glow.color = glow.color.fade(alpha);
        }
        self
    }
}

/// Fill of a rounded rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    Solid(Color),
    VerticalGradient { top: Color, bottom: Color },
}

/// One drawing instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    /// Replace every pixel.
    Clear(Color),
    /// Full-frame radial gradient.
    RadialGradient {
        cx: f64,
        cy: f64,
        radius: f64,
        inner: Color,
        outer: Color,
    },
    /// The image bound to `slide`, cover-fitted to the frame.
    Image { slide: usize, alpha: f64 },
    RoundedRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        radius: f64,
        fill: Fill,
    },
    Line {
        x0: f64,
        y0: f64,
        x1: f64,
        y1: f64,
        width: f64,
        color: Color,
    },
    Circle {
        cx: f64,
        cy: f64,
        radius: f64,
        color: Color,
    },
    Heart {
        cx: f64,
        cy: f64,
        size: f64,
        rotation_deg: f64,
        color: Color,
    },
    Sparkle {
        cx: f64,
        cy: f64,
        size: f64,
        color: Color,
    },
    Text {
        text: String,
        x: f64,
        y: f64,
        style: TextStyle,
    },
}

/// Ordered drawing commands for one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Slide images referenced by this frame, in draw order.
    pub fn images(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::Image { slide, alpha } => Some((*slide, *alpha)),
            _ => None,
        })
    }

    /// Text runs in draw order.
    pub fn texts(&self) -> impl Iterator<Item = (&str, &TextStyle)> + '_ {
        self.commands.iter().filter_map(|cmd| match cmd {
            DrawCommand::Text { text, style, .. } => Some((text.as_str(), style)),
            _ => None,
        })
    }

    fn text(&mut self, text: impl Into<String>, x: f64, y: f64, style: TextStyle) {
        self.push(DrawCommand::Text {
            text: text.into(),
            x,
            y,
            style,
        });
    }
}

/// Stage of the outro by phase progress `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutroStage {
    /// `p < 0.2`: "Thank You" fades in.
    FadeIn { alpha: f64 },
    /// `p < 0.5`.
    Hold,
    /// `p < 0.6`: "Thank You" fades out.
    FadeOut { alpha: f64 },
    /// `p >= 0.6`.
    Credits,
}

impl OutroStage {
    pub fn at(progress: f64) -> Self {
        if progress < 0.2 {
            OutroStage::FadeIn {
                alpha: progress / 0.2,
            }
        } else if progress < 0.5 {
            OutroStage::Hold
        } else if progress < 0.6 {
            OutroStage::FadeOut {
                alpha: 1.0 - (progress - 0.5) / 0.1,
            }
        } else {
            OutroStage::Credits
        }
    }

    /// Opacity of the "Thank You" title, if shown.
    pub fn title_alpha(&self) -> Option<f64> {
        match self {
            OutroStage::FadeIn { alpha } | OutroStage::FadeOut { alpha } => Some(*alpha),
            OutroStage::Hold => Some(1.0),
            OutroStage::Credits => None,
        }
    }
}

/// Opacity of the intro sparkles at frame `i` of `total`.
pub fn sparkle_alpha(frame: u32, total: u32) -> f64 {
    let mid = total.max(1) as f64 / 2.0;
    (1.0 - (frame as f64 - mid).abs() / mid).max(0.0)
}

/// Opacity of a slide caption at frame `i`.
pub fn caption_alpha(frame: u32) -> f64 {
    ease_out_cubic(frame as f64 / CAPTION_FADE_FRAMES as f64)
}

/// Text burned into the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branding {
    pub recipient: String,
    pub attribution: String,
}

impl Default for Branding {
    fn default() -> Self {
        Self {
            recipient: "Ellen".to_string(),
            attribution: "by KofiLartey".to_string(),
        }
    }
}

struct SlideCaption {
    name: String,
    layout: CaptionLayout,
}

/// Produces the display list of every frame of one export.
pub struct Compositor {
    width: f64,
    height: f64,
    branding: Branding,
    captions: Vec<SlideCaption>,
    particles: ParticleField,
}

impl Compositor {
    pub fn new(
        width: u32,
        height: u32,
        slides: &[Slide],
        branding: Branding,
        particle_seed: u64,
        measure: Arc<dyn TextMeasure + Send + Sync>,
    ) -> Self {
        let (w, h) = (width as f64, height as f64);
        let captions = slides
            .iter()
            .map(|slide| SlideCaption {
                name: display_text(&slide.name),
                layout: CaptionLayout::slide(&display_text(&slide.message), w, h, measure.as_ref()),
            })
            .collect();

        Self {
            width: w,
            height: h,
            branding: Branding {
                recipient: display_text(&branding.recipient),
                attribution: display_text(&branding.attribution),
            },
            captions,
            particles: ParticleField::new(particle_seed, w, h),
        }
    }

    pub fn slide_count(&self) -> usize {
        self.captions.len()
    }

    /// Display list for local frame `frame` of a phase `total` frames long.
    pub fn render_frame(&self, phase: Phase, frame: u32, total: u32) -> DisplayList {
        let total = total.max(1);
        let mut list = DisplayList::new();
        match phase {
            Phase::Intro => self.intro(&mut list, frame, total),
            Phase::Transition { from, to } => self.transition(&mut list, from, to, frame, total),
            Phase::Slide { index } => self.slide(&mut list, index, frame),
            Phase::Outro => self.outro(&mut list, frame, total),
        }
        list
    }

    fn intro(&self, list: &mut DisplayList, frame: u32, total: u32) {
        let (w, h) = (self.width, self.height);
        let i = frame as f64;

        list.push(DrawCommand::RadialGradient {
            cx: w / 2.0,
            cy: h / 2.0,
            radius: w,
            inner: Color::hex(0x1a1a2e),
            outer: Color::hex(0x16213e),
        });

        for heart in self.particles.hearts_at(frame) {
            list.push(DrawCommand::Heart {
                cx: heart.x,
                cy: heart.y,
                size: heart.size,
                rotation_deg: heart.rotation_deg,
                color: Color::PINK.fade(heart.alpha),
            });
        }

        let progress = i / total as f64;
        let scale = 0.5 + ease_out_cubic(progress) * 0.5;
        let alpha = (progress * 2.0).min(1.0);
        let blur = 20.0 + (i * 0.2).sin() * 10.0;
        let (tx, ty) = (w / 2.0, h / 2.0 - 30.0);

        let title = TextStyle::centered(55.0 * scale, FontWeight::Bold, Color::WHITE)
            .glowing(Color::PINK, blur)
            .faded(alpha);
        list.text("Happy Birthday", tx, ty, title);

        let name = TextStyle {
            size: 75.0 * scale,
            ..title
        };
        list.text(self.branding.recipient.clone(), tx, ty + 75.0 * scale, name);

        let sparkle = Color::GOLD.fade(sparkle_alpha(frame, total));
        let radius = 150.0 + (i * 0.1).sin() * 30.0;
        for s in 0..8 {
            let angle = (i * 0.05 + s as f64 * PI / 4.0) % TAU;
            list.push(DrawCommand::Sparkle {
                cx: w / 2.0 + angle.cos() * radius,
                cy: h / 2.0 + angle.sin() * radius,
                size: 20.0,
                color: sparkle,
            });
        }
    }

    fn transition(&self, list: &mut DisplayList, from: usize, to: usize, frame: u32, total: u32) {
        let eased = ease_in_out_cubic(frame as f64 / total as f64);
        list.push(DrawCommand::Clear(Color::BLACK));
        list.push(DrawCommand::Image {
            slide: from,
            alpha: 1.0 - eased,
        });
        list.push(DrawCommand::Image {
            slide: to,
            alpha: eased,
        });
    }

    fn slide(&self, list: &mut DisplayList, index: usize, frame: u32) {
        let (w, h) = (self.width, self.height);
        list.push(DrawCommand::Clear(Color::BLACK));
        list.push(DrawCommand::Image {
            slide: index,
            alpha: 1.0,
        });

        let Some(caption) = self.captions.get(index) else {
            return;
        };
        let layout = &caption.layout;
        let fade = caption_alpha(frame);

        list.push(DrawCommand::RoundedRect {
            x: layout.panel_x,
            y: layout.panel_y,
            w: layout.panel_w,
            h: layout.panel_h,
            radius: layout.corner_radius,
            fill: Fill::Solid(Color::rgba(0, 0, 0, 0.72).fade(fade)),
        });
        list.push(DrawCommand::Line {
            x0: layout.panel_x + 30.0,
            y0: layout.panel_y,
            x1: layout.panel_x + layout.panel_w - 30.0,
            y1: layout.panel_y,
            width: 1.5,
            color: Color::rgba(236, 72, 153, 0.5).fade(fade),
        });

        let name = TextStyle::centered(layout.name_size, FontWeight::Semibold, Color::WHITE)
            .top()
            .glowing(Color::rgba(0, 0, 0, 0.4), 6.0)
            .faded(fade);
        list.text(caption.name.clone(), w / 2.0, layout.name_y(), name);

        let message = TextStyle::centered(
            layout.message_size,
            FontWeight::Regular,
            Color::rgba(255, 255, 255, 0.85),
        )
        .top()
        .glowing(Color::rgba(0, 0, 0, 0.4), 4.0)
        .faded(fade);
        let mut y = layout.message_y();
        for line in &layout.lines {
            list.text(line.clone(), w / 2.0, y, message);
            y += layout.line_height;
        }

        let counter = TextStyle::centered(16.0, FontWeight::Bold, Color::rgba(255, 255, 255, 0.5))
            .top()
            .aligned(TextAlign::Right);
        list.text(
            format!("{}/{}", index + 1, self.captions.len()),
            w - 18.0,
            22.0,
            counter,
        );

        let credit = TextStyle::centered(11.0, FontWeight::Regular, Color::rgba(255, 255, 255, 0.3))
            .top()
            .aligned(TextAlign::Left);
        list.text(self.branding.attribution.clone(), 18.0, h - 16.0, credit);
    }

    fn outro(&self, list: &mut DisplayList, frame: u32, total: u32) {
        let (w, h) = (self.width, self.height);

        list.push(DrawCommand::RadialGradient {
            cx: w / 2.0,
            cy: h / 2.0,
            radius: w,
            inner: Color::hex(0x0f0f23),
            outer: Color::hex(0x1a1a3e),
        });

        for star in self.particles.stars() {
            let twinkle = ParticleField::twinkle(star, frame);
            list.push(DrawCommand::Circle {
                cx: star.x,
                cy: star.y,
                radius: star.size * twinkle,
                color: Color::WHITE.fade(twinkle),
            });
        }

        let stage = OutroStage::at(frame as f64 / total as f64);
        if let Some(alpha) = stage.title_alpha() {
            let style = TextStyle::centered(60.0, FontWeight::Bold, Color::WHITE)
                .glowing(Color::PINK, 30.0)
                .faded(alpha);
            list.text("Thank You", w / 2.0, h / 2.0 - 40.0, style);
            return;
        }

        list.text(
            "Made with Love",
            w / 2.0,
            h / 2.0 - 30.0,
            TextStyle::centered(50.0, FontWeight::Bold, Color::GOLD),
        );
        list.text(
            format!("Happy Birthday {}", self.branding.recipient),
            w / 2.0,
            h / 2.0 + 40.0,
            TextStyle::centered(28.0, FontWeight::Regular, Color::WHITE),
        );
        list.text(
            self.branding.attribution.clone(),
            w / 2.0,
            h / 2.0 + 100.0,
            TextStyle::centered(24.0, FontWeight::Bold, Color::rgba(255, 255, 255, 0.8)),
        );
    }
}

/// Strip characters outside the Basic Multilingual Plane (emoji) and
/// collapse the surrounding whitespace.
pub fn display_text(text: &str) -> String {
    text.chars()
        .filter(|c| (*c as u32) < 0x1_0000 && !('\u{fe00}'..='\u{fe0f}').contains(c))
        .filter(|c| !('\u{2600}'..='\u{27bf}').contains(c))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
