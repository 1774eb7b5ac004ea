//! Frame encoders.
//!
//! The export loop hands raw RGBA frames to a [`FrameEncoder`] and receives
//! the encoded container back as a list of chunks once the encoder is
//! finished. [`FfmpegEncoder`] streams frames into an `ffmpeg` child process
//! and collects its stdout.

use std::collections::HashSet;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use keepsake_common::cancel::CancelToken;
use keepsake_common::error::{KeepsakeError, KeepsakeResult};
use keepsake_slide_model::{VideoFormat, FRAME_RATE_HZ, OUTPUT_HEIGHT, OUTPUT_WIDTH, VIDEO_BITRATE_BPS};

use crate::audio::AudioInput;

/// Size of each stdout read; also the upper bound of one output chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// Parameters of one encoding run.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderSettings {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_bps: u32,
    pub audio: Option<AudioInput>,
}

impl EncoderSettings {
    /// Portrait 720x1280 at 30 fps and 4 Mbps.
    pub fn portrait(format: VideoFormat) -> Self {
        Self {
            format,
            width: OUTPUT_WIDTH,
            height: OUTPUT_HEIGHT,
            fps: FRAME_RATE_HZ,
            bitrate_bps: VIDEO_BITRATE_BPS,
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: Option<AudioInput>) -> Self {
        self.audio = audio;
        self
    }

    /// Bytes in one RGBA frame.
    pub fn frame_bytes(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

/// Encoded container as produced by the encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedMedia {
    pub chunks: Vec<Vec<u8>>,
    pub frames: u64,
}

impl EncodedMedia {
    pub fn len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate all chunks into one blob.
    pub fn into_blob(self) -> Vec<u8> {
        let mut blob = Vec::with_capacity(self.len());
        for chunk in self.chunks {
            blob.extend_from_slice(&chunk);
        }
        blob
    }
}

/// Consumes raw frames and produces an encoded container.
#[async_trait]
pub trait FrameEncoder: Send {
    /// Begin a recording. Must be called before the first frame.
    async fn start(&mut self, settings: &EncoderSettings) -> KeepsakeResult<()>;

    /// Encode one frame of tightly packed RGBA bytes.
    async fn push_frame(&mut self, rgba: &[u8], cancel: &CancelToken) -> KeepsakeResult<()>;

    /// Stop the recording and return everything it produced.
    async fn finish(&mut self) -> KeepsakeResult<EncodedMedia>;

    /// Stop the recording and discard its output.
    async fn abort(&mut self);

    fn name(&self) -> &str;
}

/// Encoders available to the configured ffmpeg binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncoderSupport {
    encoders: HashSet<String>,
}

impl EncoderSupport {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encoders: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse the listing printed by `ffmpeg -encoders`.
    pub fn parse(listing: &str) -> Self {
        let encoders = listing
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let flags = fields.next()?;
                let name = fields.next()?;
                let is_row = flags.len() == 6
                    && matches!(flags.as_bytes()[0], b'V' | b'A' | b'S')
                    && name != "=";
                is_row.then(|| name.to_string())
            })
            .collect();
        Self { encoders }
    }

    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.contains(name)
    }

    /// Both the video and the audio encoder of `format` are present.
    pub fn supports(&self, format: VideoFormat) -> bool {
        self.has_encoder(format.video_encoder()) && self.has_encoder(format.audio_encoder())
    }

    /// Preferred supported format.
    pub fn select(&self) -> Option<VideoFormat> {
        VideoFormat::select(|format| self.supports(format))
    }
}

/// Ask `ffmpeg` which encoders it was built with.
pub async fn probe_formats(ffmpeg: &str) -> KeepsakeResult<EncoderSupport> {
    let output = Command::new(ffmpeg)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| KeepsakeError::unsupported(format!("cannot run {ffmpeg}: {e}")))?;

    if !output.status.success() {
        return Err(KeepsakeError::unsupported(format!(
            "{ffmpeg} -encoders failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let support = EncoderSupport::parse(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(encoders = support.encoders.len(), "Probed ffmpeg encoders");
    Ok(support)
}

/// Whether `binary` resolves on `PATH` (or is an existing path).
pub fn command_exists(binary: &str) -> bool {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        return std::path::Path::new(binary).exists();
    }
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Build the ffmpeg argument list for `settings`.
pub fn ffmpeg_args(settings: &EncoderSettings) -> Vec<String> {
    let format = settings.format;
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-s".into(),
        format!("{}x{}", settings.width, settings.height),
        "-r".into(),
        settings.fps.to_string(),
        "-i".into(),
        "pipe:0".into(),
    ];

    if let Some(audio) = &settings.audio {
        if audio.looped {
            args.extend(["-stream_loop".into(), "-1".into()]);
        }
        args.extend(["-i".into(), audio.source.clone()]);
    }

    args.extend(["-map".into(), "0:v:0".into()]);
    if settings.audio.is_some() {
        args.extend(["-map".into(), "1:a:0".into()]);
    }

    let bitrate = format!("{}k", settings.bitrate_bps / 1000);
    args.extend(["-c:v".into(), format.video_encoder().into()]);
    match format {
        VideoFormat::Mp4 => args.extend([
            "-preset".into(),
            "veryfast".into(),
            "-profile:v".into(),
            "baseline".into(),
        ]),
        VideoFormat::Webm => args.extend([
            "-deadline".into(),
            "realtime".into(),
            "-cpu-used".into(),
            "8".into(),
        ]),
    }
    args.extend([
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-b:v".into(),
        bitrate.clone(),
        "-maxrate".into(),
        bitrate,
        "-bufsize".into(),
        format!("{}k", settings.bitrate_bps / 500),
    ]);

    if settings.audio.is_some() {
        args.extend([
            "-c:a".into(),
            format.audio_encoder().into(),
            "-b:a".into(),
            "128k".into(),
            "-shortest".into(),
        ]);
    }

    args.extend(["-f".into(), format.muxer().into()]);
    args.extend(format.streaming_args().iter().map(|arg| arg.to_string()));
    args.push("pipe:1".into());
    args
}

struct RunningFfmpeg {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout_task: JoinHandle<std::io::Result<Vec<Vec<u8>>>>,
    stderr_task: JoinHandle<String>,
}

/// Encodes by piping raw frames through an `ffmpeg` child process.
pub struct FfmpegEncoder {
    binary: String,
    running: Option<RunningFfmpeg>,
    frame_bytes: usize,
    frames: u64,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            running: None,
            frame_bytes: 0,
            frames: 0,
        }
    }
}

#[async_trait]
impl FrameEncoder for FfmpegEncoder {
    async fn start(&mut self, settings: &EncoderSettings) -> KeepsakeResult<()> {
        if self.running.is_some() {
            return Err(KeepsakeError::encode("encoder already started"));
        }

        let args = ffmpeg_args(settings);
        tracing::debug!(args = ?args, "Starting ffmpeg encoder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| KeepsakeError::encode(format!("Failed to start ffmpeg: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| KeepsakeError::encode("Failed to capture ffmpeg stdin"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| KeepsakeError::encode("Failed to capture ffmpeg stdout"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| KeepsakeError::encode("Failed to capture ffmpeg stderr"))?;

        tracing::info!(
            pid = child.id(),
            format = %settings.format,
            audio = settings.audio.is_some(),
            "ffmpeg encoder started"
        );

        let stdout_task = tokio::spawn(async move {
            let mut chunks = Vec::new();
            let mut buf = vec![0u8; CHUNK_SIZE];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                chunks.push(buf[..n].to_vec());
            }
            Ok::<_, std::io::Error>(chunks)
        });

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match stderr.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        self.frame_bytes = settings.frame_bytes();
        self.frames = 0;
        self.running = Some(RunningFfmpeg {
            child,
            stdin: Some(stdin),
            stdout_task,
            stderr_task,
        });
        Ok(())
    }

    async fn push_frame(&mut self, rgba: &[u8], cancel: &CancelToken) -> KeepsakeResult<()> {
        if rgba.len() != self.frame_bytes {
            return Err(KeepsakeError::encode(format!(
                "frame is {} bytes, expected {}",
                rgba.len(),
                self.frame_bytes
            )));
        }
        let stdin = self
            .running
            .as_mut()
            .and_then(|running| running.stdin.as_mut())
            .ok_or_else(|| KeepsakeError::encode("encoder is not running"))?;

        cancel
            .run_until_cancelled(stdin.write_all(rgba))
            .await?
            .map_err(|e| KeepsakeError::encode(format!("Failed to write frame to ffmpeg: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    async fn finish(&mut self) -> KeepsakeResult<EncodedMedia> {
        let mut running = self
            .running
            .take()
            .ok_or_else(|| KeepsakeError::encode("encoder is not running"))?;

        if let Some(mut stdin) = running.stdin.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| KeepsakeError::encode(format!("Failed to close ffmpeg stdin: {e}")))?;
        }

        let status = running
            .child
            .wait()
            .await
            .map_err(|e| KeepsakeError::encode(format!("Failed to wait on ffmpeg: {e}")))?;

        let chunks = running
            .stdout_task
            .await
            .map_err(|e| KeepsakeError::encode(format!("ffmpeg stdout reader panicked: {e}")))?
            .map_err(|e| KeepsakeError::encode(format!("Failed reading ffmpeg output: {e}")))?;
        let stderr_output = running
            .stderr_task
            .await
            .unwrap_or_else(|_| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(KeepsakeError::encode(format!(
                "ffmpeg export failed (status {}): {}",
                status,
                stderr_output.trim()
            )));
        }

        let media = EncodedMedia {
            chunks,
            frames: self.frames,
        };
        tracing::info!(
            frames = media.frames,
            bytes = media.len(),
            chunks = media.chunks.len(),
            "ffmpeg encoder finished"
        );
        Ok(media)
    }

    async fn abort(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        drop(running.stdin.take());
        if let Err(err) = running.child.kill().await {
            tracing::warn!(error = %err, "Failed to kill ffmpeg");
        }
        running.stdout_task.abort();
        running.stderr_task.abort();
        tracing::info!(frames = self.frames, "ffmpeg encoder aborted");
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn test_parse_encoder_listing() {
        let support = EncoderSupport::parse(LISTING);
        assert!(support.has_encoder("libx264"));
        assert!(support.has_encoder("aac"));
        assert!(!support.has_encoder("="));
        assert!(!support.has_encoder("libopus"));
        assert!(support.supports(VideoFormat::Mp4));
        assert!(!support.supports(VideoFormat::Webm));
        assert_eq!(support.select(), Some(VideoFormat::Mp4));
    }

    #[test]
    fn test_webm_selected_without_h264() {
        let support = EncoderSupport::from_names(["libvpx-vp9", "libopus", "aac"]);
        assert_eq!(support.select(), Some(VideoFormat::Webm));
        assert_eq!(EncoderSupport::default().select(), None);
    }

    #[test]
    fn test_ffmpeg_args_video_only() {
        let args = ffmpeg_args(&EncoderSettings::portrait(VideoFormat::Mp4));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgba -s 720x1280 -r 30 -i pipe:0"));
        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-b:v 4000k"));
        assert!(joined.contains("-movflags frag_keyframe+empty_moov"));
        assert!(!joined.contains("-c:a"));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));
    }

    #[test]
    fn test_ffmpeg_args_with_looping_audio() {
        let settings = EncoderSettings::portrait(VideoFormat::Webm).with_audio(Some(AudioInput {
            source: "song.mp3".to_string(),
            looped: true,
            duration_secs: Some(30.0),
        }));
        let joined = ffmpeg_args(&settings).join(" ");
        assert!(joined.contains("-stream_loop -1 -i song.mp3"));
        assert!(joined.contains("-map 1:a:0"));
        assert!(joined.contains("-c:a libopus"));
        assert!(joined.contains("-shortest"));
        assert!(joined.contains("-f webm pipe:1"));
    }

    #[test]
    fn test_media_blob_concatenates_chunks() {
        let media = EncodedMedia {
            chunks: vec![vec![1, 2], vec![3], vec![]],
            frames: 3,
        };
        assert_eq!(media.len(), 3);
        assert_eq!(media.into_blob(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_push_before_start_fails() {
        let mut encoder = FfmpegEncoder::new("ffmpeg");
        let err = encoder.push_frame(&[], &CancelToken::new()).await.unwrap_err();
        assert!(matches!(err, KeepsakeError::Encode { .. }));
        // Aborting an idle encoder is a no-op.
        encoder.abort().await;
    }
}
