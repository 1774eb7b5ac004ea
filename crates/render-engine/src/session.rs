//! Per-export session state, progress reporting, and teardown.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use keepsake_slide_model::{progress_percent, Phase};

/// Progress callback for export rendering.
pub type ProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Export progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportProgress {
    /// Whole percent of slides completed, 0..=100.
    pub percent: u8,

    /// Slides finished (drawn or skipped) so far.
    pub completed_slides: usize,

    /// Frames drawn so far.
    pub frames_rendered: u64,

    /// Frames planned for the whole export.
    pub total_frames: u64,

    /// Current stage.
    pub stage: ExportStage,
}

/// Stages of the export process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    #[default]
    Idle,
    Preparing,
    Rendering,
    Finalizing,
    Complete,
    Cancelled,
    Failed,
}

/// Observable state of the exporter.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStatus {
    /// A recording is in flight.
    pub recording: bool,
    pub progress_percent: u8,
    pub frames_drawn: u64,
    pub stage: ExportStage,
    /// Phase of the most recent frame.
    #[serde(skip)]
    pub phase: Option<Phase>,
}

/// Live state of one export run.
///
/// Dropping the session always clears the recording flag and resets
/// progress, whichever way the export ended.
pub struct RenderSession {
    status: Arc<watch::Sender<SessionStatus>>,
    progress: Option<ProgressCallback>,
    slide_count: usize,
    completed_slides: usize,
    frames_drawn: u64,
    total_frames: u64,
    outcome: ExportStage,
}

impl RenderSession {
    pub fn begin(
        status: Arc<watch::Sender<SessionStatus>>,
        progress: Option<ProgressCallback>,
        slide_count: usize,
        total_frames: u64,
    ) -> Self {
        status.send_replace(SessionStatus {
            recording: true,
            progress_percent: 0,
            frames_drawn: 0,
            stage: ExportStage::Preparing,
            phase: None,
        });
        let session = Self {
            status,
            progress,
            slide_count,
            completed_slides: 0,
            frames_drawn: 0,
            total_frames,
            outcome: ExportStage::Failed,
        };
        session.report(ExportStage::Preparing);
        session
    }

    pub fn percent(&self) -> u8 {
        progress_percent(self.completed_slides, self.slide_count)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Record one drawn and encoded frame.
    pub fn frame_drawn(&mut self, phase: Phase) {
        self.frames_drawn += 1;
        let frames = self.frames_drawn;
        self.status.send_modify(|status| {
            status.frames_drawn = frames;
            status.stage = ExportStage::Rendering;
            status.phase = Some(phase);
        });
    }

    /// Record that the slide at 1-based position `completed` is finished.
    pub fn slide_completed(&mut self, completed: usize) {
        self.completed_slides = completed.min(self.slide_count);
        let percent = self.percent();
        self.status.send_modify(|status| status.progress_percent = percent);
        self.report(ExportStage::Rendering);
        tracing::debug!(completed, percent, "Slide finished");
    }

    /// Replace the planned frame count, e.g. after a slide was skipped.
    pub fn replan(&mut self, total_frames: u64) {
        if total_frames != self.total_frames {
            tracing::debug!(from = self.total_frames, to = total_frames, "Export replanned");
        }
        self.total_frames = total_frames;
    }

    /// Start the recording over from the first frame.
    pub fn restart(&mut self, total_frames: u64) {
        self.completed_slides = 0;
        self.frames_drawn = 0;
        self.total_frames = total_frames;
        self.status.send_modify(|status| {
            status.progress_percent = 0;
            status.frames_drawn = 0;
            status.stage = ExportStage::Preparing;
            status.phase = None;
        });
        self.report(ExportStage::Preparing);
    }

    pub fn report(&self, stage: ExportStage) {
        if let Some(callback) = &self.progress {
            callback(ExportProgress {
                percent: self.percent(),
                completed_slides: self.completed_slides,
                frames_rendered: self.frames_drawn,
                total_frames: self.total_frames,
                stage,
            });
        }
    }

    /// The download was triggered.
    pub fn complete(mut self) {
        self.outcome = ExportStage::Complete;
        self.report(ExportStage::Complete);
    }

    /// The export was cancelled.
    pub fn cancel(mut self) {
        self.outcome = ExportStage::Cancelled;
        self.report(ExportStage::Cancelled);
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        if self.outcome == ExportStage::Failed {
            self.report(ExportStage::Failed);
        }
        let stage = self.outcome;
        let frames = self.frames_drawn;
        self.status.send_modify(|status| {
            status.recording = false;
            status.progress_percent = 0;
            status.frames_drawn = frames;
            status.stage = stage;
            status.phase = None;
        });
        tracing::debug!(stage = ?stage, frames, "Render session torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn recorder() -> (ProgressCallback, Arc<Mutex<Vec<ExportProgress>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: ProgressCallback = Arc::new(move |p| sink.lock().unwrap().push(p));
        (callback, seen)
    }

    #[test]
    fn test_progress_per_slide() {
        let status = Arc::new(watch::channel(SessionStatus::default()).0);
        let (callback, seen) = recorder();
        let mut session = RenderSession::begin(status.clone(), Some(callback), 3, 870);
        assert!(status.borrow().recording);

        session.frame_drawn(Phase::Intro);
        session.slide_completed(1);
        assert_eq!(status.borrow().progress_percent, 33);
        session.slide_completed(3);
        session.complete();

        let stages: Vec<(ExportStage, u8)> =
            seen.lock().unwrap().iter().map(|p| (p.stage, p.percent)).collect();
        assert_eq!(
            stages,
            vec![
                (ExportStage::Preparing, 0),
                (ExportStage::Rendering, 33),
                (ExportStage::Rendering, 100),
                (ExportStage::Complete, 100),
            ]
        );
        let final_status = status.borrow().clone();
        assert!(!final_status.recording);
        assert_eq!(final_status.progress_percent, 0);
        assert_eq!(final_status.stage, ExportStage::Complete);
        assert_eq!(final_status.frames_drawn, 1);
    }

    #[test]
    fn test_dropped_session_resets_status() {
        let status = Arc::new(watch::channel(SessionStatus::default()).0);
        {
            let mut session = RenderSession::begin(status.clone(), None, 2, 600);
            session.slide_completed(1);
            assert_eq!(status.borrow().progress_percent, 50);
        }
        let after = status.borrow().clone();
        assert!(!after.recording);
        assert_eq!(after.progress_percent, 0);
        assert_eq!(after.stage, ExportStage::Failed);
    }

    #[test]
    fn test_restart_clears_counters_and_keeps_recording() {
        let status = Arc::new(watch::channel(SessionStatus::default()).0);
        let (callback, seen) = recorder();
        let mut session = RenderSession::begin(status.clone(), Some(callback), 2, 600);
        session.frame_drawn(Phase::Intro);
        session.slide_completed(1);
        session.replan(420);

        session.restart(600);
        assert_eq!(session.frames_drawn(), 0);
        assert_eq!(session.percent(), 0);
        let current = status.borrow().clone();
        assert!(current.recording);
        assert_eq!(current.frames_drawn, 0);
        assert_eq!(current.stage, ExportStage::Preparing);

        let last = seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last.stage, ExportStage::Preparing);
        assert_eq!(last.total_frames, 600);
    }
}
