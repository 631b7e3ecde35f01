pub mod cache;
pub mod camera;
pub mod config;
pub mod detection;
mod engine;
mod error;
pub mod frame;
pub mod frame_loop;
pub mod loader;
pub mod overlay;
pub mod recognizer;
pub mod registry;

pub use engine::{SignEngine, StillOutcome};
pub use error::PipelineError;

/// Milliseconds since the Unix epoch, used for frame and cache timestamps.
pub(crate) fn unix_time_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
