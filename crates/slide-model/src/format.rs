//! Output container formats and fixed output dimensions.

use serde::{Deserialize, Serialize};

/// Output frame width in pixels (9:16 portrait).
pub const OUTPUT_WIDTH: u32 = 720;

/// Output frame height in pixels.
pub const OUTPUT_HEIGHT: u32 = 1280;

/// Target video bitrate.
pub const VIDEO_BITRATE_BPS: u32 = 4_000_000;

/// Container/codec pair an export can be encoded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// H.264 + AAC in MP4. Plays natively in messaging apps.
    Mp4,
    /// VP9 + Opus in WebM.
    Webm,
}

impl VideoFormat {
    /// Formats in order of preference.
    pub const PREFERENCE: [VideoFormat; 2] = [VideoFormat::Mp4, VideoFormat::Webm];

    /// Full MIME type including codec parameters.
    pub fn mime_type(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "video/mp4; codecs=avc1.42E01E,mp4a.40.2",
            VideoFormat::Webm => "video/webm; codecs=vp9,opus",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
        }
    }

    /// ffmpeg video encoder name.
    pub fn video_encoder(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "libx264",
            VideoFormat::Webm => "libvpx-vp9",
        }
    }

    /// ffmpeg audio encoder name.
    pub fn audio_encoder(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "aac",
            VideoFormat::Webm => "libopus",
        }
    }

    /// ffmpeg muxer name.
    pub fn muxer(&self) -> &'static str {
        match self {
            VideoFormat::Mp4 => "mp4",
            VideoFormat::Webm => "webm",
        }
    }

    /// Extra muxer flags needed to write to a non-seekable pipe.
    pub fn streaming_args(&self) -> &'static [&'static str] {
        match self {
            VideoFormat::Mp4 => &["-movflags", "frag_keyframe+empty_moov"],
            VideoFormat::Webm => &[],
        }
    }

    /// Download file name for this format.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension())
    }

    /// Pick the first preferred format the environment supports.
    pub fn select(supported: impl Fn(VideoFormat) -> bool) -> Option<VideoFormat> {
        Self::PREFERENCE.into_iter().find(|format| supported(*format))
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}
