//! Background music capture for exports.
//!
//! The export never drives the listener's music directly. It takes an
//! independent [`CaptureAudio`] from the [`MusicTrack`] and asks an
//! [`AudioRouter`] to turn it into an encoder input. Every failure on this
//! path is recoverable: the export logs it and continues without audio.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use keepsake_common::cancel::CancelToken;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use keepsake_slide_model::is_remote_source;

/// Playback state of the background music.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Playback {
    #[default]
    Stopped,
    Playing {
        position_secs: f64,
    },
    Paused {
        position_secs: f64,
    },
}

/// The background music as the listener hears it.
#[derive(Debug, Clone, PartialEq)]
pub struct MusicTrack {
    source: String,
    playback: Playback,
}

impl MusicTrack {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            playback: Playback::Stopped,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn playback(&self) -> Playback {
        self.playback
    }

    pub fn set_playback(&mut self, playback: Playback) {
        self.playback = playback;
    }

    /// An independent handle on the same media, starting from the top.
    pub fn clone_for_capture(&self) -> CaptureAudio {
        CaptureAudio {
            source: self.source.clone(),
            looped: true,
        }
    }
}

/// Audio handle owned by one export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureAudio {
    pub source: String,
    /// Repeat until the video ends.
    pub looped: bool,
}

/// Audio stream ready to be muxed by the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInput {
    /// Path or URL handed to the encoder.
    pub source: String,
    pub looped: bool,
    pub duration_secs: Option<f64>,
}

/// Routes captured audio into the recording.
#[async_trait]
pub trait AudioRouter: Send + Sync {
    async fn route(&self, audio: &CaptureAudio, cancel: &CancelToken) -> KeepsakeResult<AudioInput>;
}

/// Validates the source with `ffprobe` before handing it to the encoder.
#[derive(Debug, Clone)]
pub struct FfprobeRouter {
    ffprobe: String,
}

impl Default for FfprobeRouter {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl FfprobeRouter {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.ffprobe
    }

    /// `ffprobe` next to the given `ffmpeg` binary.
    pub fn beside_ffmpeg(ffmpeg: &str) -> Self {
        match ffmpeg.rsplit_once("ffmpeg") {
            Some((prefix, suffix)) => Self::new(format!("{prefix}ffprobe{suffix}")),
            None => Self::default(),
        }
    }
}

#[async_trait]
impl AudioRouter for FfprobeRouter {
    async fn route(&self, audio: &CaptureAudio, cancel: &CancelToken) -> KeepsakeResult<AudioInput> {
        if !is_remote_source(&audio.source) && !Path::new(&audio.source).exists() {
            return Err(KeepsakeError::audio(format!(
                "music source {} does not exist",
                audio.source
            )));
        }

        let mut command = Command::new(&self.ffprobe);
        command
            .args([
                "-v",
                "error",
                "-select_streams",
                "a:0",
                "-show_entries",
                "stream=codec_type:format=duration",
                "-of",
                "default=noprint_wrappers=1",
            ])
            .arg(&audio.source)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = cancel
            .run_until_cancelled(command.output())
            .await?
            .map_err(|e| KeepsakeError::audio(format!("failed to run {}: {e}", self.ffprobe)))?;

        if !output.status.success() {
            return Err(KeepsakeError::audio(format!(
                "ffprobe rejected {}: {}",
                audio.source,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let report = String::from_utf8_lossy(&output.stdout);
        let (has_audio, duration_secs) = parse_probe(&report);
        if !has_audio {
            return Err(KeepsakeError::audio(format!(
                "{} has no audio stream",
                audio.source
            )));
        }

        Ok(AudioInput {
            source: audio.source.clone(),
            looped: audio.looped,
            duration_secs,
        })
    }
}

/// Parse `key=value` lines printed by ffprobe.
fn parse_probe(report: &str) -> (bool, Option<f64>) {
    let mut has_audio = false;
    let mut duration = None;
    for line in report.lines() {
        match line.trim().split_once('=') {
            Some(("codec_type", "audio")) => has_audio = true,
            Some(("duration", value)) => duration = value.parse::<f64>().ok(),
            _ => {}
        }
    }
    (has_audio, duration)
}
