//! Detection state tracking: confidence floors, the anti-flicker grace
//! window, and the answer scoring policy.

use serde::Serialize;

use crate::recognizer::GestureCandidate;
use crate::registry::normalize_label;

/// One accepted detection. Transient; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassificationEvent {
    /// Normalized sign label (synonyms mapped, upper-cased).
    pub label: String,
    /// The label exactly as the classifier produced it.
    pub raw_label: String,
    /// 0-100, rounded to two decimals.
    pub confidence_percent: f32,
    pub timestamp_ms: i64,
}

impl ClassificationEvent {
    pub fn from_candidate(candidate: &GestureCandidate, timestamp_ms: i64) -> Self {
        Self {
            label: normalize_label(&candidate.label),
            raw_label: candidate.label.clone(),
            confidence_percent: confidence_percent(candidate.score),
            timestamp_ms,
        }
    }
}

/// Score (0..1) to display percent, rounded to two decimals.
pub fn confidence_percent(score: f32) -> f32 {
    (score as f64 * 10000.0).round() as f32 / 100.0
}

/// What one observation did to the tracked detection state.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackerUpdate {
    /// A candidate cleared the display floor and is now the current
    /// detection.
    Accepted(ClassificationEvent),
    /// Nothing accepted this tick; the last detection is still inside the
    /// grace window and stays displayed.
    Held,
    /// The grace window elapsed with no acceptance; the detection is gone.
    Cleared,
    /// Nothing tracked, nothing observed.
    Idle,
}

/// Smooths per-frame recognizer jitter: a momentary empty result does not
/// clear the displayed detection until the grace window has elapsed since
/// the last acceptance.
pub struct DetectionTracker {
    display_floor_percent: f32,
    grace_window_ms: i64,
    current: Option<ClassificationEvent>,
    last_accept_ms: i64,
}

impl DetectionTracker {
    pub fn new(display_floor_percent: f32, grace_window_ms: i64) -> Self {
        Self {
            display_floor_percent,
            grace_window_ms,
            current: None,
            last_accept_ms: 0,
        }
    }

    /// The detection currently on display, if any.
    pub fn current(&self) -> Option<&ClassificationEvent> {
        self.current.as_ref()
    }

    /// Feeds one tick's best candidate (or absence thereof) through the
    /// floor and the grace window.
    pub fn observe(
        &mut self,
        best: Option<&GestureCandidate>,
        now_ms: i64,
    ) -> TrackerUpdate {
        if let Some(candidate) = best {
            let confidence = confidence_percent(candidate.score);
            if confidence >= self.display_floor_percent {
                let event = ClassificationEvent::from_candidate(candidate, now_ms);
                self.current = Some(event.clone());
                self.last_accept_ms = now_ms;
                return TrackerUpdate::Accepted(event);
            }
        }

        if self.current.is_some() {
            if now_ms - self.last_accept_ms > self.grace_window_ms {
                self.current = None;
                TrackerUpdate::Cleared
            } else {
                TrackerUpdate::Held
            }
        } else {
            TrackerUpdate::Idle
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.last_accept_ms = 0;
    }
}

/// Decides whether a detection counts as a correct answer. The floor here
/// is stricter than the display floor; showing a sign and scoring it are
/// different judgements.
#[derive(Clone, Debug)]
pub struct ScorePolicy {
    pub answer_floor_percent: f32,
}

impl ScorePolicy {
    pub fn new(answer_floor_percent: f32) -> Self {
        Self {
            answer_floor_percent,
        }
    }

    pub fn is_correct(&self, event: &ClassificationEvent, expected: &str) -> bool {
        event.confidence_percent >= self.answer_floor_percent
            && event.label == normalize_label(expected)
    }
}
