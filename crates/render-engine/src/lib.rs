//! Keepsake Render Engine
//!
//! Frame-stepped slideshow compositor. Slides are turned into display lists
//! one frame at a time, rasterized onto a single reused 720x1280 surface,
//! and piped into an encoder whose output becomes one downloadable video.
//!
//! # Pipeline Architecture
//!
//! ```text
//! slides ──► ImageLoader ──► Surface (bound images)
//!                                 │
//! Phase schedule ──► Compositor ──┤  render_frame(phase, i, n) -> DisplayList
//!                                 ▼
//!                           RasterCanvas ──► RGBA frame
//!                                                 │
//! MusicTrack ──► AudioRouter ──────────────┐      │
//!                                          ▼      ▼
//!                                        FrameEncoder (ffmpeg)
//!                                                 │
//!                                                 ▼
//!                                   chunks ──► blob ──► DownloadSink
//! ```
//!
//! Single-slide cards skip the encoder: one photo plus a caption card,
//! saved as JPEG.

pub mod audio;
pub mod card;
pub mod compositor;
pub mod download;
pub mod encoder;
pub mod export;
pub mod fonts;
pub mod images;
pub mod layout;
pub mod particles;
pub mod raster;
pub mod session;

pub use audio::{AudioRouter, FfprobeRouter, MusicTrack};
pub use card::CardExporter;
pub use compositor::{Branding, Compositor, DisplayList, DrawCommand};
pub use download::{DirectorySink, DownloadSink};
pub use encoder::{probe_formats, EncoderSupport, FfmpegEncoder, FrameEncoder};
pub use export::*;
pub use fonts::FontSet;
pub use images::{ImageLoadError, ImageLoader, SourceFetcher};
pub use raster::{RasterCanvas, Surface};
pub use session::{ExportProgress, ExportStage, ProgressCallback, SessionStatus};
