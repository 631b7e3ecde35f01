//! The shared frame recognition loop.
//!
//! One engine replaces the three near-identical per-screen loops of the
//! original app (webcam tool, practice mode, challenge game): per tick it
//! classifies at most once, skips classification when the source has not
//! advanced, redraws the overlay from the retained last result either way,
//! and pushes detection state through the anti-flicker tracker. What each
//! surface does with the events is its own `DetectionSink`.

use image::RgbaImage;

use crate::config::PipelineConfig;
use crate::detection::{ClassificationEvent, DetectionTracker, TrackerUpdate};
use crate::frame::VideoFrame;
use crate::overlay::LandmarkPainter;
use crate::recognizer::{RecognitionOutput, RecognizerInstance};

/// Receives what the loop produces. One implementation per consumption
/// surface: the webcam tool updates its display, the challenge game runs
/// its score policy, practice mode matches against the expected sign.
pub trait DetectionSink: Send + Sync {
    fn on_detection(&self, event: &ClassificationEvent);

    /// The grace window elapsed with nothing accepted.
    fn on_cleared(&self) {}

    /// A freshly rendered landmark overlay, once per tick.
    fn on_overlay(&self, _overlay: &RgbaImage) {}
}

/// Per-loop mutable state. Lives inside the loop and reaches the UI layer
/// only through sink events, so there is no shared mutable mode/result
/// state to drift out of sync.
pub struct LoopState {
    tracker: DetectionTracker,
    painter: LandmarkPainter,
    last_video_time_ms: i64,
    last_output: Option<RecognitionOutput>,
}

impl LoopState {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            tracker: DetectionTracker::new(config.display_floor_percent, config.grace_window_ms),
            painter: LandmarkPainter::default(),
            last_video_time_ms: -1,
            last_output: None,
        }
    }

    pub fn current_detection(&self) -> Option<&ClassificationEvent> {
        self.tracker.current()
    }

    /// Back to the fresh state: a restarted loop must not see a stale
    /// video-time marker or a retained result.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.last_video_time_ms = -1;
        self.last_output = None;
    }

    /// One tick: classify if the frame advanced, redraw the retained
    /// overlay either way, update detection state. A classifier error is
    /// logged and swallowed; one bad frame must not kill the session.
    pub fn tick(
        &mut self,
        frame: &VideoFrame,
        instance: &mut RecognizerInstance,
        sink: &dyn DetectionSink,
    ) {
        let now_ms = frame.timestamp_ms;

        if frame.timestamp_ms != self.last_video_time_ms {
            self.last_video_time_ms = frame.timestamp_ms;
            match instance.recognize_video_frame(frame, now_ms) {
                Ok(output) => self.last_output = Some(output),
                Err(err) => {
                    log::warn!("Recognition failed on frame at {now_ms}ms: {err}");
                }
            }
        }

        // Redraw from the retained result even on skipped ticks, so the
        // overlay does not flicker between present and absent.
        let hands: &[Vec<crate::recognizer::Landmark>] = self
            .last_output
            .as_ref()
            .map(|output| output.hands.as_slice())
            .unwrap_or(&[]);
        let overlay = self.painter.render(frame.width(), frame.height(), hands);
        sink.on_overlay(&overlay);

        let best = self.last_output.as_ref().and_then(|output| output.best());
        match self.tracker.observe(best, now_ms) {
            TrackerUpdate::Accepted(event) => sink.on_detection(&event),
            TrackerUpdate::Cleared => sink.on_cleared(),
            TrackerUpdate::Held | TrackerUpdate::Idle => {}
        }
    }
}
