//! Frame clock and pacing for the render loop.
//!
//! Every export is driven at a fixed frame rate. This module provides:
//! - Conversions between frame indices, seconds, and presentation timestamps
//! - A [`FramePacer`] that suspends the render task between frames

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Interval, MissedTickBehavior};

use crate::cancel::CancelToken;
use crate::error::KeepsakeResult;

/// Fixed-rate frame clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock ticking at `fps` frames per second (minimum 1).
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Duration of one frame.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / self.fps as u64)
    }

    /// Presentation time of `frame` in seconds.
    pub fn frame_to_secs(&self, frame: u64) -> f64 {
        frame as f64 / self.fps as f64
    }

    /// Presentation time of `frame` in nanoseconds.
    pub fn frame_to_ns(&self, frame: u64) -> u64 {
        frame * 1_000_000_000 / self.fps as u64
    }

    /// Number of whole frames covering `secs`.
    pub fn secs_to_frames(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.fps as f64).round() as u64
    }
}

/// How the render loop waits between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramePacing {
    /// Suspend one frame interval after each frame (wall-clock cadence).
    #[default]
    Realtime,
    /// Only yield to the runtime; frames are produced as fast as they encode.
    Unpaced,
}

/// Suspends the render task between frames.
#[derive(Debug)]
pub struct FramePacer {
    pacing: FramePacing,
    interval: Option<Interval>,
    clock: FrameClock,
    ticks: u64,
}

impl FramePacer {
    pub fn new(clock: FrameClock, pacing: FramePacing) -> Self {
        Self {
            pacing,
            interval: None,
            clock,
            ticks: 0,
        }
    }

    /// Wait for the next frame boundary, or fail with `Cancelled`.
    pub async fn tick(&mut self, cancel: &CancelToken) -> KeepsakeResult<()> {
        cancel.check()?;
        match self.pacing {
            FramePacing::Realtime => {
                let clock = self.clock;
                let interval = self.interval.get_or_insert_with(|| {
                    let period = clock.frame_interval();
                    let mut interval =
                        tokio::time::interval_at(tokio::time::Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    interval
                });
                cancel.run_until_cancelled(interval.tick()).await?;
            }
            FramePacing::Unpaced => {
                tokio::task::yield_now().await;
                cancel.check()?;
            }
        }
        self.ticks += 1;
        Ok(())
    }

    /// Frames waited on so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn clock(&self) -> FrameClock {
        self.clock
    }
}
