//! The classifier seam: the narrow surface the pipeline needs from the
//! underlying vision runtime, and the instance wrapper that keeps running
//! modes from being violated.

use serde::Serialize;
use thiserror::Error;

use crate::frame::VideoFrame;

/// Operating mode of a classifier. The two are mutually exclusive per
/// instance; switching is an explicit reconfiguration, never implicit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunningMode {
    Image,
    Video,
}

/// One hand landmark in normalized image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// One scored label out of a recognition call. `score` is 0..1.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GestureCandidate {
    pub label: String,
    pub score: f32,
}

impl GestureCandidate {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Everything one recognition call produced: candidates best-first, plus
/// one landmark set per detected hand for the overlay.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RecognitionOutput {
    pub candidates: Vec<GestureCandidate>,
    pub hands: Vec<Vec<Landmark>>,
}

impl RecognitionOutput {
    pub fn best(&self) -> Option<&GestureCandidate> {
        self.candidates.first()
    }
}

#[derive(Error, Debug)]
pub enum RecognitionError {
    #[error("classifier failed: {0}")]
    Classifier(String),
    #[error("classifier is in {actual:?} mode, {expected:?} required")]
    WrongMode {
        expected: RunningMode,
        actual: RunningMode,
    },
    #[error("mode switch failed: {0}")]
    ModeSwitch(String),
}

impl RecognitionError {
    pub fn user_message(&self) -> &'static str {
        "The sign recognizer failed to process the image. Please try again."
    }
}

/// What the pipeline requires of a loaded classifier. Implemented by the
/// embedder over its vision runtime; tests substitute scripted fakes.
pub trait Classifier: Send {
    fn recognize_image(&mut self, frame: &VideoFrame) -> Result<RecognitionOutput, RecognitionError>;

    fn recognize_video_frame(
        &mut self,
        frame: &VideoFrame,
        timestamp_ms: i64,
    ) -> Result<RecognitionOutput, RecognitionError>;

    fn set_running_mode(&mut self, mode: RunningMode) -> Result<(), RecognitionError>;

    fn running_mode(&self) -> RunningMode;
}

impl std::fmt::Debug for dyn Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier").finish_non_exhaustive()
    }
}

/// A loaded classifier bound to one model and one running mode. The
/// wrapper refuses mode-mismatched calls outright so a VIDEO-mode call can
/// never reach an IMAGE-mode classifier, whatever the caller got wrong.
pub struct RecognizerInstance {
    classifier: Box<dyn Classifier>,
    cache_key: String,
    display_name: String,
}

impl RecognizerInstance {
    pub fn new(
        classifier: Box<dyn Classifier>,
        cache_key: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            classifier,
            cache_key: cache_key.into(),
            display_name: display_name.into(),
        }
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn running_mode(&self) -> RunningMode {
        self.classifier.running_mode()
    }

    /// Explicit mode switch. Callers must have stopped any frame loop
    /// first; the camera session guarantees that by joining its worker.
    pub fn set_running_mode(&mut self, mode: RunningMode) -> Result<(), RecognitionError> {
        if self.classifier.running_mode() == mode {
            return Ok(());
        }
        log::debug!("Switching classifier to {mode:?} mode");
        self.classifier.set_running_mode(mode)
    }

    pub fn recognize_still(
        &mut self,
        frame: &VideoFrame,
    ) -> Result<RecognitionOutput, RecognitionError> {
        self.require_mode(RunningMode::Image)?;
        self.classifier.recognize_image(frame)
    }

    pub fn recognize_video_frame(
        &mut self,
        frame: &VideoFrame,
        timestamp_ms: i64,
    ) -> Result<RecognitionOutput, RecognitionError> {
        self.require_mode(RunningMode::Video)?;
        self.classifier.recognize_video_frame(frame, timestamp_ms)
    }

    fn require_mode(&self, expected: RunningMode) -> Result<(), RecognitionError> {
        let actual = self.classifier.running_mode();
        if actual != expected {
            return Err(RecognitionError::WrongMode { expected, actual });
        }
        Ok(())
    }
}
