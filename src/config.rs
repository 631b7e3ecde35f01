//! Pipeline tuning knobs, overridable from the environment.

use std::path::PathBuf;

/// One provider of the vision runtime: the bundle to fetch plus the asset
/// base path that ships the matching WASM binaries. The two must always come
/// from the same origin and version, so they travel as a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeEndpoint {
    pub bundle_url: String,
    pub wasm_base_url: String,
}

impl RuntimeEndpoint {
    pub fn new(bundle_url: impl Into<String>, wasm_base_url: impl Into<String>) -> Self {
        Self {
            bundle_url: bundle_url.into(),
            wasm_base_url: wasm_base_url.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum confidence (percent) for a candidate to be shown as the
    /// current detection.
    pub display_floor_percent: f32,
    /// Stricter floor (percent) for "this counts as a correct answer"
    /// scoring. Kept separate from the display floor on purpose.
    pub answer_floor_percent: f32,
    /// How long a detection survives without being re-confirmed before the
    /// UI state is cleared. Smooths momentary false negatives.
    pub grace_window_ms: i64,
    /// Pacing of the continuous recognition loop.
    pub frame_interval_ms: u64,
    /// How long to wait for the camera's first decodable frame.
    pub camera_startup_timeout_ms: u64,
    /// Total tries per runtime endpoint (1 initial + retries).
    pub tries_per_endpoint: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Wall-clock bound on a single download attempt.
    pub download_timeout_secs: u64,
    /// Base URL of the hosted storage bucket the model registry points into.
    pub storage_base_url: String,
    /// Override for the on-disk asset cache location.
    pub cache_dir: Option<PathBuf>,
    /// Runtime providers, in priority order.
    pub endpoints: Vec<RuntimeEndpoint>,
}

const TASKS_VISION_VERSION: &str = "0.10.3";

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            display_floor_percent: 50.0,
            answer_floor_percent: 60.0,
            grace_window_ms: 500,
            frame_interval_ms: 33,
            camera_startup_timeout_ms: 5000,
            tries_per_endpoint: 3,
            backoff_base_ms: 1000,
            backoff_cap_ms: 4000,
            download_timeout_secs: 30,
            storage_base_url:
                "https://models.signademy.app/storage/v1/object/public/models".to_string(),
            cache_dir: None,
            endpoints: vec![
                RuntimeEndpoint::new(
                    format!(
                        "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision@{TASKS_VISION_VERSION}/vision_bundle.mjs"
                    ),
                    format!(
                        "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision@{TASKS_VISION_VERSION}/wasm"
                    ),
                ),
                RuntimeEndpoint::new(
                    format!(
                        "https://unpkg.com/@mediapipe/tasks-vision@{TASKS_VISION_VERSION}/vision_bundle.mjs"
                    ),
                    format!(
                        "https://unpkg.com/@mediapipe/tasks-vision@{TASKS_VISION_VERSION}/wasm"
                    ),
                ),
                RuntimeEndpoint::new(
                    format!("https://esm.sh/@mediapipe/tasks-vision@{TASKS_VISION_VERSION}"),
                    format!(
                        "https://cdn.jsdelivr.net/npm/@mediapipe/tasks-vision@{TASKS_VISION_VERSION}/wasm"
                    ),
                ),
            ],
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides("SIGN_");
        config
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();

        if let Some(v) = parse_env("DISPLAY_FLOOR").and_then(|s| s.parse().ok()) {
            self.display_floor_percent = v;
        }
        if let Some(v) = parse_env("ANSWER_FLOOR").and_then(|s| s.parse().ok()) {
            self.answer_floor_percent = v;
        }
        if let Some(v) = parse_env("GRACE_MS").and_then(|s| s.parse().ok()) {
            self.grace_window_ms = v;
        }
        if let Some(v) = parse_env("FRAME_INTERVAL_MS").and_then(|s| s.parse().ok()) {
            self.frame_interval_ms = v;
        }
        if let Some(v) = parse_env("DOWNLOAD_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.download_timeout_secs = v;
        }
        if let Some(v) = parse_env("STORAGE_BASE_URL") {
            if !v.is_empty() {
                self.storage_base_url = v;
            }
        }
        if let Some(v) = parse_env("CACHE_DIR") {
            if !v.is_empty() {
                self.cache_dir = Some(PathBuf::from(v));
            }
        }
    }
}
