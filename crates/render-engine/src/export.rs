//! Slideshow export: drives the compositor, surface, and encoder frame by
//! frame and hands the finished video to the download sink.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use keepsake_common::cancel::CancelToken;
use keepsake_common::clock::{FrameClock, FramePacer, FramePacing};
use keepsake_common::config::AppConfig;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use keepsake_slide_model::{
    ExportTimeline, Phase, Slide, VideoFormat, FRAME_RATE_HZ, INTRO_FRAMES, OUTRO_FRAMES,
    VIDEO_BITRATE_BPS,
};

use crate::audio::{AudioInput, AudioRouter, MusicTrack};
use crate::compositor::{Branding, Compositor};
use crate::download::DownloadSink;
use crate::encoder::{EncodedMedia, EncoderSettings, EncoderSupport, FrameEncoder};
use crate::images::ImageLoader;
use crate::layout::{ApproxMetrics, TextMeasure};
use crate::raster::Surface;
use crate::session::{ExportStage, ProgressCallback, RenderSession, SessionStatus};

/// How an export run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    /// No slides: nothing was drawn, recorded, or downloaded.
    Empty,
    /// The video was encoded and saved.
    Saved {
        path: PathBuf,
        format: VideoFormat,
        frames: u64,
        bytes: usize,
        with_audio: bool,
        skipped_slides: Vec<usize>,
    },
    /// Cancelled before the download; nothing was saved.
    Cancelled { frames_drawn: u64 },
}

/// Export parameters that do not change between runs.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub pacing: FramePacing,
    /// Particle seed; random per export when unset.
    pub particle_seed: Option<u64>,
    pub branding: Branding,
    pub mp4_stem: String,
    pub webm_stem: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ExportOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pacing: config.render.pacing,
            particle_seed: config.render.particle_seed,
            branding: Branding {
                recipient: config.branding.recipient.clone(),
                attribution: config.branding.attribution.clone(),
            },
            mp4_stem: config.branding.mp4_stem.clone(),
            webm_stem: config.branding.webm_stem.clone(),
        }
    }

    /// Download file name for `format`.
    pub fn file_name(&self, format: VideoFormat) -> String {
        match format {
            VideoFormat::Mp4 => format.file_name(&self.mp4_stem),
            VideoFormat::Webm => format.file_name(&self.webm_stem),
        }
    }
}

/// Renders slide lists into downloadable slideshow videos.
///
/// The exporter exclusively owns its surface and encoder; one export runs at
/// a time (`&mut self`).
pub struct SlideshowExporter {
    surface: Box<dyn Surface>,
    encoder: Box<dyn FrameEncoder>,
    sink: Arc<dyn DownloadSink>,
    images: ImageLoader,
    support: EncoderSupport,
    measure: Arc<dyn TextMeasure + Send + Sync>,
    music: Option<(MusicTrack, Arc<dyn AudioRouter>)>,
    options: ExportOptions,
    status: Arc<watch::Sender<SessionStatus>>,
    progress: Option<ProgressCallback>,
}

impl SlideshowExporter {
    pub fn new(
        surface: Box<dyn Surface>,
        encoder: Box<dyn FrameEncoder>,
        sink: Arc<dyn DownloadSink>,
        images: ImageLoader,
        support: EncoderSupport,
    ) -> Self {
        Self {
            surface,
            encoder,
            sink,
            images,
            support,
            measure: Arc::new(ApproxMetrics::default()),
            music: None,
            options: ExportOptions::default(),
            status: Arc::new(watch::channel(SessionStatus::default()).0),
            progress: None,
        }
    }

    /// Measure captions with the rasterizer's fonts.
    pub fn with_measure(mut self, measure: Arc<dyn TextMeasure + Send + Sync>) -> Self {
        self.measure = measure;
        self
    }

    pub fn with_music(mut self, track: MusicTrack, router: Arc<dyn AudioRouter>) -> Self {
        self.music = Some((track, router));
        self
    }

    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.options = options;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Watch the recording flag and progress.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// The background music, untouched by exports.
    pub fn music(&self) -> Option<&MusicTrack> {
        self.music.as_ref().map(|(track, _)| track)
    }

    /// Render `slides` into one video and save it through the download sink.
    pub async fn export_video(
        &mut self,
        slides: &[Slide],
        cancel: &CancelToken,
    ) -> KeepsakeResult<ExportOutcome> {
        if slides.is_empty() {
            tracing::warn!("No slides to export");
            return Ok(ExportOutcome::Empty);
        }

        let format = self.support.select().ok_or_else(|| {
            KeepsakeError::unsupported(
                "no supported encoder profile (need libx264+aac or libvpx-vp9+libopus)",
            )
        })?;

        let timeline = ExportTimeline::for_slide_count(slides.len());
        tracing::info!(
            slides = slides.len(),
            format = %format,
            total_frames = timeline.total_frames(),
            duration_secs = timeline.duration_secs(),
            "Starting slideshow export"
        );

        let session = RenderSession::begin(
            self.status.clone(),
            self.progress.clone(),
            slides.len(),
            timeline.total_frames(),
        );

        let mut audio = match self.capture_audio(cancel).await {
            Ok(audio) => audio,
            Err(err) if err.is_cancelled() => {
                let frames_drawn = session.frames_drawn();
                session.cancel();
                return Ok(ExportOutcome::Cancelled { frames_drawn });
            }
            Err(err) => return Err(err),
        };

        let seed = self
            .options
            .particle_seed
            .unwrap_or_else(|| fastrand::u64(..));
        let compositor = Compositor::new(
            self.surface.width(),
            self.surface.height(),
            slides,
            self.options.branding.clone(),
            seed,
            self.measure.clone(),
        );

        let mut session = session;
        let (media, skipped_slides, with_audio) = loop {
            let with_audio = audio.is_some();
            let settings = EncoderSettings {
                format,
                width: self.surface.width(),
                height: self.surface.height(),
                fps: FRAME_RATE_HZ,
                bitrate_bps: VIDEO_BITRATE_BPS,
                audio: audio.clone(),
            };
            let attempt = self
                .record(&settings, &compositor, slides, &mut session, cancel)
                .await;
            match attempt {
                Ok((media, skipped)) => break (media, skipped, with_audio),
                Err(err) if err.is_cancelled() => {
                    let frames_drawn = session.frames_drawn();
                    tracing::info!(frames_drawn, "Export cancelled");
                    session.cancel();
                    return Ok(ExportOutcome::Cancelled { frames_drawn });
                }
                Err(err) if with_audio && matches!(err, KeepsakeError::Encode { .. }) => {
                    tracing::warn!(
                        error = %err,
                        "Encoding with background music failed, restarting video-only"
                    );
                    audio = None;
                    session.restart(timeline.total_frames());
                }
                Err(err) => {
                    tracing::error!(error = %err, "Export failed while rendering");
                    return Err(err);
                }
            }
        };

        let frames = media.frames;
        let blob = media.into_blob();
        let bytes = blob.len();
        if bytes == 0 {
            return Err(KeepsakeError::encode("encoder produced no output"));
        }

        let file_name = self.options.file_name(format);
        let path = self.sink.save(&file_name, &blob).await?;
        session.complete();

        tracing::info!(
            path = %path.display(),
            frames,
            bytes,
            with_audio,
            skipped = skipped_slides.len(),
            "Slideshow export finished"
        );
        Ok(ExportOutcome::Saved {
            path,
            format,
            frames,
            bytes,
            with_audio,
            skipped_slides,
        })
    }

    /// One recording pass: start the encoder, render every frame, finish.
    /// On failure the encoder is aborted and bound images are released.
    async fn record(
        &mut self,
        settings: &EncoderSettings,
        compositor: &Compositor,
        slides: &[Slide],
        session: &mut RenderSession,
        cancel: &CancelToken,
    ) -> KeepsakeResult<(EncodedMedia, Vec<usize>)> {
        self.encoder.start(settings).await?;

        let skipped = match self.render_frames(compositor, slides, session, cancel).await {
            Ok(skipped) => skipped,
            Err(err) => {
                self.encoder.abort().await;
                for index in 0..slides.len() {
                    self.surface.release_image(index);
                }
                return Err(err);
            }
        };

        session.report(ExportStage::Finalizing);
        match self.encoder.finish().await {
            Ok(media) => Ok((media, skipped)),
            Err(err) => {
                self.encoder.abort().await;
                Err(err)
            }
        }
    }

    /// Route background music into the recording. Failures other than
    /// cancellation are logged and yield `None`.
    async fn capture_audio(&self, cancel: &CancelToken) -> KeepsakeResult<Option<AudioInput>> {
        let Some((track, router)) = &self.music else {
            return Ok(None);
        };
        let capture = track.clone_for_capture();
        match router.route(&capture, cancel).await {
            Ok(input) => {
                tracing::info!(source = %input.source, "Recording with background music");
                Ok(Some(input))
            }
            Err(err) if err.is_cancelled() => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "Could not capture audio, continuing video-only");
                Ok(None)
            }
        }
    }

    /// Intro, slides with transitions, outro. Returns the skipped slides.
    async fn render_frames(
        &mut self,
        compositor: &Compositor,
        slides: &[Slide],
        session: &mut RenderSession,
        cancel: &CancelToken,
    ) -> KeepsakeResult<Vec<usize>> {
        let mut pacer = FramePacer::new(FrameClock::new(FRAME_RATE_HZ), self.options.pacing);
        let mut skipped = Vec::new();

        self.render_phase(compositor, Phase::Intro, session, &mut pacer, cancel)
            .await?;

        let mut previous: Option<usize> = None;
        for (index, slide) in slides.iter().enumerate() {
            let image = self.images.resolve(index, slide, cancel).await?;
            let Some(image) = image.image() else {
                skipped.push(index);
                session.replan(planned_frames(slides.len(), &skipped));
                session.slide_completed(index + 1);
                continue;
            };
            self.surface.bind_image(index, image);

            if let Some(from) = previous {
                let transition = Phase::Transition { from, to: index };
                self.render_phase(compositor, transition, session, &mut pacer, cancel)
                    .await?;
                self.surface.release_image(from);
            }

            self.render_phase(compositor, Phase::Slide { index }, session, &mut pacer, cancel)
                .await?;
            session.slide_completed(index + 1);
            previous = Some(index);
        }
        if let Some(last) = previous {
            self.surface.release_image(last);
        }

        self.render_phase(compositor, Phase::Outro, session, &mut pacer, cancel)
            .await?;
        Ok(skipped)
    }

    /// Draw, encode, then wait one frame interval, for every frame of `phase`.
    async fn render_phase(
        &mut self,
        compositor: &Compositor,
        phase: Phase,
        session: &mut RenderSession,
        pacer: &mut FramePacer,
        cancel: &CancelToken,
    ) -> KeepsakeResult<()> {
        let total = phase.frames();
        tracing::debug!(phase = phase.label(), frames = total, "Rendering phase");
        for frame in 0..total {
            cancel.check()?;
            let list = compositor.render_frame(phase, frame, total);
            self.surface.draw(&list)?;
            self.encoder.push_frame(self.surface.pixels(), cancel).await?;
            session.frame_drawn(phase);
            pacer.tick(cancel).await?;
        }
        Ok(())
    }
}

/// Frames an export will draw once `skipped` slides are left out.
fn planned_frames(slide_count: usize, skipped: &[usize]) -> u64 {
    let rendered: Vec<usize> = (0..slide_count).filter(|i| !skipped.contains(i)).collect();
    if rendered.is_empty() {
        return (INTRO_FRAMES + OUTRO_FRAMES) as u64;
    }
    ExportTimeline::from_rendered_slides(&rendered).total_frames()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_follow_format() {
        let options = ExportOptions::default();
        assert_eq!(
            options.file_name(VideoFormat::Mp4),
            "ellen-birthday-slideshow.mp4"
        );
        assert_eq!(
            options.file_name(VideoFormat::Webm),
            "ellen-birthday-whatsapp.webm"
        );
    }

    #[test]
    fn test_planned_frames_drop_skipped_slides() {
        assert_eq!(planned_frames(3, &[]), 90 + 150 * 3 + 30 * 2 + 180);
        assert_eq!(planned_frames(3, &[1]), 90 + 150 * 2 + 30 + 180);
        assert_eq!(planned_frames(2, &[0, 1]), 90 + 180);
    }

    #[test]
    fn test_options_follow_config() {
        let mut config = AppConfig::default();
        config.branding.recipient = "Ama".to_string();
        config.render.pacing = FramePacing::Unpaced;
        config.render.particle_seed = Some(5);
        let options = ExportOptions::from_config(&config);
        assert_eq!(options.branding.recipient, "Ama");
        assert_eq!(options.pacing, FramePacing::Unpaced);
        assert_eq!(options.particle_seed, Some(5));
    }
}
