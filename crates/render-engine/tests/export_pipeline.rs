//! End-to-end export runs against in-memory surface, encoder, and sink.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use keepsake_common::cancel::CancelToken;
use keepsake_common::clock::FramePacing;
use keepsake_common::config::ImageFallbackPolicy;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use keepsake_render_engine::audio::{AudioInput, AudioRouter, CaptureAudio, MusicTrack, Playback};
use keepsake_render_engine::encoder::{EncodedMedia, EncoderSettings, EncoderSupport, FrameEncoder};
use keepsake_render_engine::images::{ImageFetcher, ImageLoadError, ImageLoader};
use keepsake_render_engine::{
    DisplayList, DownloadSink, ExportOptions, ExportOutcome, ExportProgress, ExportStage,
    ProgressCallback, SlideshowExporter, Surface,
};
use keepsake_slide_model::{Slide, VideoFormat};

#[derive(Default)]
struct SurfaceLog {
    draws: u64,
    bound: BTreeSet<usize>,
    max_bound: usize,
}

struct FakeSurface {
    log: Arc<Mutex<SurfaceLog>>,
    pixels: Vec<u8>,
}

impl Surface for FakeSurface {
    fn width(&self) -> u32 {
        72
    }

    fn height(&self) -> u32 {
        128
    }

    fn bind_image(&mut self, slide: usize, _image: &RgbaImage) {
        let mut log = self.log.lock().unwrap();
        log.bound.insert(slide);
        log.max_bound = log.max_bound.max(log.bound.len());
    }

    fn release_image(&mut self, slide: usize) {
        self.log.lock().unwrap().bound.remove(&slide);
    }

    fn draw(&mut self, _list: &DisplayList) -> KeepsakeResult<()> {
        self.log.lock().unwrap().draws += 1;
        Ok(())
    }

    fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

#[derive(Default)]
struct EncoderLog {
    settings: Option<EncoderSettings>,
    starts: u32,
    /// Fail every frame write while a music input is attached.
    reject_audio: bool,
    /// Fail every frame write.
    broken: bool,
    frames: u64,
    finished: bool,
    aborted: bool,
}

struct FakeEncoder {
    log: Arc<Mutex<EncoderLog>>,
}

#[async_trait]
impl FrameEncoder for FakeEncoder {
    async fn start(&mut self, settings: &EncoderSettings) -> KeepsakeResult<()> {
        let mut log = self.log.lock().unwrap();
        log.settings = Some(settings.clone());
        log.starts += 1;
        log.frames = 0;
        Ok(())
    }

    async fn push_frame(&mut self, _rgba: &[u8], cancel: &CancelToken) -> KeepsakeResult<()> {
        cancel.check()?;
        let mut log = self.log.lock().unwrap();
        let with_audio = log.settings.as_ref().is_some_and(|s| s.audio.is_some());
        if log.broken || (log.reject_audio && with_audio) {
            return Err(KeepsakeError::encode(
                "Failed to write frame to ffmpeg: Broken pipe (os error 32)",
            ));
        }
        log.frames += 1;
        Ok(())
    }

    async fn finish(&mut self) -> KeepsakeResult<EncodedMedia> {
        let mut log = self.log.lock().unwrap();
        log.finished = true;
        Ok(EncodedMedia {
            chunks: vec![vec![0; 8], vec![1; 8]],
            frames: log.frames,
        })
    }

    async fn abort(&mut self) {
        self.log.lock().unwrap().aborted = true;
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[derive(Default)]
struct MemorySink {
    saved: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl DownloadSink for MemorySink {
    async fn save(&self, file_name: &str, blob: &[u8]) -> KeepsakeResult<PathBuf> {
        self.saved
            .lock()
            .unwrap()
            .push((file_name.to_string(), blob.len()));
        Ok(PathBuf::from("/downloads").join(file_name))
    }
}

struct PhotoFetcher {
    photos: HashMap<String, Vec<u8>>,
}

impl PhotoFetcher {
    fn with(locations: &[&str]) -> Self {
        let image = RgbaImage::from_pixel(6, 4, Rgba([200, 120, 40, 255]));
        let mut png = std::io::Cursor::new(Vec::new());
        image.write_to(&mut png, image::ImageFormat::Png).unwrap();
        let bytes = png.into_inner();
        Self {
            photos: locations
                .iter()
                .map(|loc| (loc.to_string(), bytes.clone()))
                .collect(),
        }
    }
}

#[async_trait]
impl ImageFetcher for PhotoFetcher {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>, ImageLoadError> {
        self.photos
            .get(location)
            .cloned()
            .ok_or_else(|| ImageLoadError::Fetch {
                location: location.to_string(),
                message: "404".to_string(),
            })
    }
}

struct FailingRouter;

#[async_trait]
impl AudioRouter for FailingRouter {
    async fn route(&self, _audio: &CaptureAudio, _cancel: &CancelToken) -> KeepsakeResult<AudioInput> {
        Err(KeepsakeError::audio("no capture stream"))
    }
}

struct PassthroughRouter;

#[async_trait]
impl AudioRouter for PassthroughRouter {
    async fn route(&self, audio: &CaptureAudio, _cancel: &CancelToken) -> KeepsakeResult<AudioInput> {
        Ok(AudioInput {
            source: audio.source.clone(),
            looped: audio.looped,
            duration_secs: Some(42.0),
        })
    }
}

struct Harness {
    surface: Arc<Mutex<SurfaceLog>>,
    encoder: Arc<Mutex<EncoderLog>>,
    sink: Arc<MemorySink>,
    progress: Arc<Mutex<Vec<ExportProgress>>>,
}

impl Harness {
    fn new() -> Self {
        Self {
            surface: Arc::default(),
            encoder: Arc::default(),
            sink: Arc::default(),
            progress: Arc::default(),
        }
    }

    fn exporter(&self, fetcher: PhotoFetcher, support: EncoderSupport) -> SlideshowExporter {
        self.exporter_with(fetcher, support, ImageFallbackPolicy::Placeholder, FramePacing::Unpaced)
    }

    fn exporter_with(
        &self,
        fetcher: PhotoFetcher,
        support: EncoderSupport,
        fallback: ImageFallbackPolicy,
        pacing: FramePacing,
    ) -> SlideshowExporter {
        let surface = FakeSurface {
            log: self.surface.clone(),
            pixels: vec![0; 72 * 128 * 4],
        };
        let encoder = FakeEncoder {
            log: self.encoder.clone(),
        };
        let loader =
            ImageLoader::new(Arc::new(fetcher), Duration::from_secs(15)).with_fallback(fallback);
        let seen = self.progress.clone();
        let callback: ProgressCallback = Arc::new(move |p| seen.lock().unwrap().push(p));
        let options = ExportOptions {
            pacing,
            particle_seed: Some(7),
            ..ExportOptions::default()
        };
        SlideshowExporter::new(
            Box::new(surface),
            Box::new(encoder),
            self.sink.clone(),
            loader,
            support,
        )
        .with_options(options)
        .on_progress(callback)
    }

    fn rendering_percents(&self) -> Vec<u8> {
        self.progress
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.stage == ExportStage::Rendering)
            .map(|p| p.percent)
            .collect()
    }

    fn stages(&self) -> Vec<ExportStage> {
        self.progress.lock().unwrap().iter().map(|p| p.stage).collect()
    }
}

fn mp4_support() -> EncoderSupport {
    EncoderSupport::from_names(["libx264", "aac", "libvpx-vp9", "libopus"])
}

fn slides(sources: &[&str]) -> Vec<Slide> {
    sources
        .iter()
        .enumerate()
        .map(|(i, src)| Slide::new(format!("Friend {i}"), "Happy birthday!", *src))
        .collect()
}

#[tokio::test]
async fn test_two_slides_render_six_hundred_frames_and_download_once() {
    let harness = Harness::new();
    let mut exporter = harness.exporter(PhotoFetcher::with(&["a.png", "b.png"]), mp4_support());

    let outcome = exporter
        .export_video(&slides(&["a.png", "b.png"]), &CancelToken::new())
        .await
        .unwrap();

    match outcome {
        ExportOutcome::Saved {
            path,
            format,
            frames,
            bytes,
            with_audio,
            skipped_slides,
        } => {
            assert_eq!(path, PathBuf::from("/downloads/ellen-birthday-slideshow.mp4"));
            assert_eq!(format, VideoFormat::Mp4);
            assert_eq!(frames, 600);
            assert_eq!(bytes, 16);
            assert!(!with_audio);
            assert!(skipped_slides.is_empty());
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    assert_eq!(harness.surface.lock().unwrap().draws, 600);
    assert_eq!(harness.encoder.lock().unwrap().frames, 600);
    assert!(harness.encoder.lock().unwrap().finished);
    assert_eq!(
        harness.sink.saved.lock().unwrap().as_slice(),
        &[("ellen-birthday-slideshow.mp4".to_string(), 16)]
    );
    assert_eq!(harness.rendering_percents(), vec![50, 100]);
    let stages = harness.stages();
    assert_eq!(stages.first(), Some(&ExportStage::Preparing));
    assert_eq!(stages.last(), Some(&ExportStage::Complete));

    let status = exporter.status().borrow().clone();
    assert!(!status.recording);
    assert_eq!(status.progress_percent, 0);
    assert_eq!(status.frames_drawn, 600);
}

#[tokio::test]
async fn test_at_most_two_images_bound_at_once() {
    let harness = Harness::new();
    let sources = ["a.png", "b.png", "c.png", "d.png"];
    let mut exporter = harness.exporter(PhotoFetcher::with(&sources), mp4_support());

    exporter
        .export_video(&slides(&sources), &CancelToken::new())
        .await
        .unwrap();

    let surface = harness.surface.lock().unwrap();
    assert_eq!(surface.max_bound, 2);
    assert!(surface.bound.is_empty());
    assert_eq!(surface.draws, 90 + 150 * 4 + 30 * 3 + 180);
}

#[tokio::test]
async fn test_empty_list_is_a_no_op() {
    let harness = Harness::new();
    let mut exporter = harness.exporter(PhotoFetcher::with(&[]), mp4_support());

    let outcome = exporter.export_video(&[], &CancelToken::new()).await.unwrap();

    assert_eq!(outcome, ExportOutcome::Empty);
    assert!(harness.encoder.lock().unwrap().settings.is_none());
    assert_eq!(harness.surface.lock().unwrap().draws, 0);
    assert!(harness.sink.saved.lock().unwrap().is_empty());
    assert!(harness.progress.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_webm_fallback_when_h264_missing() {
    let harness = Harness::new();
    let support = EncoderSupport::from_names(["libvpx-vp9", "libopus"]);
    let mut exporter = harness.exporter(PhotoFetcher::with(&["a.png"]), support);

    let outcome = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap();

    let ExportOutcome::Saved { path, format, frames, .. } = outcome else {
        panic!("expected a saved export");
    };
    assert_eq!(format, VideoFormat::Webm);
    assert_eq!(path, PathBuf::from("/downloads/ellen-birthday-whatsapp.webm"));
    assert_eq!(frames, 90 + 150 + 180);
}

#[tokio::test]
async fn test_no_supported_codec_fails_before_drawing() {
    let harness = Harness::new();
    let mut exporter = harness.exporter(PhotoFetcher::with(&["a.png"]), EncoderSupport::default());

    let err = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, KeepsakeError::Unsupported { .. }));
    assert!(harness.encoder.lock().unwrap().settings.is_none());
    assert_eq!(harness.surface.lock().unwrap().draws, 0);
    assert!(!exporter.status().borrow().recording);
}

#[tokio::test]
async fn test_audio_failure_continues_video_only() {
    let harness = Harness::new();
    let mut track = MusicTrack::new("song.mp3");
    track.set_playback(Playback::Playing { position_secs: 12.5 });
    let mut exporter = harness
        .exporter(PhotoFetcher::with(&["a.png"]), mp4_support())
        .with_music(track, Arc::new(FailingRouter));

    let outcome = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ExportOutcome::Saved { with_audio: false, .. }));
    assert!(harness
        .encoder
        .lock()
        .unwrap()
        .settings
        .as_ref()
        .unwrap()
        .audio
        .is_none());
    assert_eq!(
        exporter.music().unwrap().playback(),
        Playback::Playing { position_secs: 12.5 }
    );
}

#[tokio::test]
async fn test_routed_music_reaches_encoder() {
    let harness = Harness::new();
    let mut exporter = harness
        .exporter(PhotoFetcher::with(&["a.png"]), mp4_support())
        .with_music(MusicTrack::new("song.mp3"), Arc::new(PassthroughRouter));

    let outcome = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, ExportOutcome::Saved { with_audio: true, .. }));
    let log = harness.encoder.lock().unwrap();
    let audio = log.settings.as_ref().unwrap().audio.as_ref().unwrap();
    assert_eq!(audio.source, "song.mp3");
    assert!(audio.looped);
}

#[tokio::test]
async fn test_encoder_rejecting_music_restarts_video_only() {
    let harness = Harness::new();
    harness.encoder.lock().unwrap().reject_audio = true;
    let mut exporter = harness
        .exporter(PhotoFetcher::with(&["a.png"]), mp4_support())
        .with_music(MusicTrack::new("song.mp3"), Arc::new(PassthroughRouter));

    let outcome = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap();

    let ExportOutcome::Saved { frames, with_audio, .. } = outcome else {
        panic!("expected a saved export");
    };
    assert!(!with_audio);
    assert_eq!(frames, 90 + 150 + 180);

    let log = harness.encoder.lock().unwrap();
    assert_eq!(log.starts, 2);
    assert!(log.aborted);
    assert!(log.finished);
    assert!(log.settings.as_ref().unwrap().audio.is_none());
    drop(log);

    assert_eq!(harness.surface.lock().unwrap().draws, 1 + 420);
    assert!(harness.surface.lock().unwrap().bound.is_empty());
    assert_eq!(harness.sink.saved.lock().unwrap().len(), 1);
    let status = exporter.status().borrow().clone();
    assert!(!status.recording);
    assert_eq!(status.stage, ExportStage::Complete);
}

#[tokio::test]
async fn test_encoder_failure_without_music_is_fatal() {
    let harness = Harness::new();
    harness.encoder.lock().unwrap().broken = true;
    let mut exporter = harness.exporter(PhotoFetcher::with(&["a.png"]), mp4_support());

    let err = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, KeepsakeError::Encode { .. }));
    let log = harness.encoder.lock().unwrap();
    assert_eq!(log.starts, 1);
    assert!(log.aborted);
    assert!(!log.finished);
    drop(log);
    assert!(harness.sink.saved.lock().unwrap().is_empty());
    let status = exporter.status().borrow().clone();
    assert!(!status.recording);
    assert_eq!(status.stage, ExportStage::Failed);
}

#[tokio::test]
async fn test_cancel_mid_export_skips_download_and_resets_status() {
    let harness = Harness::new();
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let mut exporter = harness
        .exporter(PhotoFetcher::with(&["a.png", "b.png"]), mp4_support())
        .on_progress(Arc::new(move |p: ExportProgress| {
            if p.stage == ExportStage::Rendering && p.percent >= 50 {
                trigger.cancel();
            }
        }));

    let outcome = exporter
        .export_video(&slides(&["a.png", "b.png"]), &cancel)
        .await
        .unwrap();

    assert_eq!(outcome, ExportOutcome::Cancelled { frames_drawn: 240 });
    assert!(harness.encoder.lock().unwrap().aborted);
    assert!(!harness.encoder.lock().unwrap().finished);
    assert!(harness.sink.saved.lock().unwrap().is_empty());
    assert!(harness.surface.lock().unwrap().bound.is_empty());

    let status = exporter.status().borrow().clone();
    assert!(!status.recording);
    assert_eq!(status.progress_percent, 0);
    assert_eq!(status.stage, ExportStage::Cancelled);
}

#[tokio::test]
async fn test_skip_policy_drops_failing_slide_and_its_transition() {
    let harness = Harness::new();
    let mut exporter = harness.exporter_with(
        PhotoFetcher::with(&["a.png", "c.png"]),
        mp4_support(),
        ImageFallbackPolicy::Skip,
        FramePacing::Unpaced,
    );

    let outcome = exporter
        .export_video(&slides(&["a.png", "missing.png", "c.png"]), &CancelToken::new())
        .await
        .unwrap();

    let ExportOutcome::Saved { frames, skipped_slides, .. } = outcome else {
        panic!("expected a saved export");
    };
    assert_eq!(frames, 90 + 150 * 2 + 30 + 180);
    assert_eq!(skipped_slides, vec![1]);
    assert_eq!(harness.rendering_percents(), vec![33, 67, 100]);

    let progress = harness.progress.lock().unwrap();
    let done = progress.last().unwrap();
    assert_eq!(done.stage, ExportStage::Complete);
    assert_eq!(done.total_frames, frames);
    assert_eq!(done.frames_rendered, done.total_frames);
    let first = progress.first().unwrap();
    assert_eq!(first.total_frames, 90 + 150 * 3 + 30 * 2 + 180);
}

#[tokio::test]
async fn test_placeholder_policy_keeps_frame_count() {
    let harness = Harness::new();
    let mut exporter = harness.exporter(PhotoFetcher::with(&["a.png"]), mp4_support());

    let outcome = exporter
        .export_video(&slides(&["a.png", "missing.png", "gone.png"]), &CancelToken::new())
        .await
        .unwrap();

    let ExportOutcome::Saved { frames, skipped_slides, .. } = outcome else {
        panic!("expected a saved export");
    };
    assert_eq!(frames, 90 + 150 * 3 + 30 * 2 + 180);
    assert!(skipped_slides.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_realtime_pacing_takes_the_video_duration() {
    let harness = Harness::new();
    // No photos: placeholders keep the run free of blocking decode work.
    let mut exporter = harness.exporter_with(
        PhotoFetcher::with(&[]),
        mp4_support(),
        ImageFallbackPolicy::Placeholder,
        FramePacing::Realtime,
    );

    let start = tokio::time::Instant::now();
    let outcome = exporter
        .export_video(&slides(&["a.png"]), &CancelToken::new())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(matches!(outcome, ExportOutcome::Saved { frames: 420, .. }));
    assert!(elapsed >= Duration::from_millis(13_900), "elapsed {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(14_100), "elapsed {elapsed:?}");
}
