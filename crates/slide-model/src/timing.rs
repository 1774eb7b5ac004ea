//! Phase timing and the export schedule.
//!
//! Phase lengths are fixed contract values; changing them changes the
//! output duration of every export.

use serde::{Deserialize, Serialize};

/// Frames per second of every export.
pub const FRAME_RATE_HZ: u32 = 30;

/// Animated intro: 3 seconds.
pub const INTRO_FRAMES: u32 = 90;

/// One slide on screen: 5 seconds.
pub const SLIDE_FRAMES: u32 = 150;

/// Cross-fade between consecutive slides: 1 second.
pub const TRANSITION_FRAMES: u32 = 30;

/// Animated outro with credits: 6 seconds.
pub const OUTRO_FRAMES: u32 = 180;

/// Frames over which a slide caption fades in.
pub const CAPTION_FADE_FRAMES: u32 = 15;

/// A render phase of the export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Phase {
    Intro,
    /// Cross-fade from slide `from` into slide `to`.
    Transition { from: usize, to: usize },
    /// Slide `index` (zero-based) with its caption.
    Slide { index: usize },
    Outro,
}

impl Phase {
    /// Fixed length of this phase in frames.
    pub fn frames(&self) -> u32 {
        match self {
            Phase::Intro => INTRO_FRAMES,
            Phase::Transition { .. } => TRANSITION_FRAMES,
            Phase::Slide { .. } => SLIDE_FRAMES,
            Phase::Outro => OUTRO_FRAMES,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Transition { .. } => "transition",
            Phase::Slide { .. } => "slide",
            Phase::Outro => "outro",
        }
    }
}

/// A phase placed on the global frame axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpan {
    pub phase: Phase,

    /// First global frame of the phase.
    pub start_frame: u64,

    /// Number of frames in the phase.
    pub frames: u32,
}

impl PhaseSpan {
    /// One past the last global frame of the phase.
    pub fn end_frame(&self) -> u64 {
        self.start_frame + self.frames as u64
    }

    pub fn contains(&self, frame: u64) -> bool {
        frame >= self.start_frame && frame < self.end_frame()
    }
}

/// The ordered phase schedule for one export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTimeline {
    spans: Vec<PhaseSpan>,
}

impl ExportTimeline {
    /// Build the schedule for `slide_count` slides.
    ///
    /// An empty slide list yields an empty schedule: nothing is drawn.
    pub fn for_slide_count(slide_count: usize) -> Self {
        Self::from_rendered_slides(&(0..slide_count).collect::<Vec<_>>())
    }

    /// Build the schedule for a subset of slides (indices into the original
    /// list, in presentation order). Transitions connect consecutive
    /// rendered slides.
    pub fn from_rendered_slides(indices: &[usize]) -> Self {
        if indices.is_empty() {
            return Self::default();
        }

        let mut phases = Vec::with_capacity(indices.len() * 2 + 1);
        phases.push(Phase::Intro);
        for (pos, &index) in indices.iter().enumerate() {
            if pos > 0 {
                phases.push(Phase::Transition {
                    from: indices[pos - 1],
                    to: index,
                });
            }
            phases.push(Phase::Slide { index });
        }
        phases.push(Phase::Outro);

        let mut spans = Vec::with_capacity(phases.len());
        let mut cursor = 0u64;
        for phase in phases {
            let frames = phase.frames();
            spans.push(PhaseSpan {
                phase,
                start_frame: cursor,
                frames,
            });
            cursor += frames as u64;
        }

        Self { spans }
    }

    pub fn spans(&self) -> &[PhaseSpan] {
        &self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Total frames across all phases.
    pub fn total_frames(&self) -> u64 {
        self.spans.last().map(PhaseSpan::end_frame).unwrap_or(0)
    }

    /// Output duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.total_frames() as f64 / FRAME_RATE_HZ as f64
    }

    /// Resolve a global frame to its phase and the frame index within it.
    pub fn locate(&self, frame: u64) -> Option<(Phase, u32)> {
        let idx = self
            .spans
            .partition_point(|span| span.end_frame() <= frame);
        let span = self.spans.get(idx)?;
        span.contains(frame)
            .then(|| (span.phase, (frame - span.start_frame) as u32))
    }
}

/// Total frames for an export of `slide_count` slides.
pub fn total_frames(slide_count: usize) -> u64 {
    if slide_count == 0 {
        return 0;
    }
    let n = slide_count as u64;
    INTRO_FRAMES as u64
        + SLIDE_FRAMES as u64 * n
        + TRANSITION_FRAMES as u64 * (n - 1)
        + OUTRO_FRAMES as u64
}

/// Progress reported after completing `completed` of `total` slides.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (100.0 * completed.min(total) as f64 / total as f64).round();
    pct as u8
}
