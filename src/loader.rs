//! Vision runtime resolution and classifier construction.
//!
//! The runtime bundle is fetched from an ordered list of CDN endpoints with
//! retry and exponential backoff, then memoized so the fetch happens once
//! per process. Model bytes come out of the asset cache. Load progress is
//! reported on one strictly increasing 0-100 scale: runtime resolution
//! covers 0-70, model bytes 70-100.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::cache::{AssetCache, DownloadProgress, Fetcher};
use crate::config::{PipelineConfig, RuntimeEndpoint};
use crate::error::PipelineError;
use crate::recognizer::{Classifier, RunningMode};

#[derive(Error, Debug)]
pub enum RuntimeLoadError {
    #[error("all runtime endpoints failed:\n{}", .attempts.join("\n"))]
    Exhausted { attempts: Vec<String> },
    #[error("runtime initialization failed: {0}")]
    Init(String),
    #[error("classifier construction failed: {0}")]
    Classifier(String),
    #[error("no runtime endpoints configured")]
    NoEndpoints,
}

impl RuntimeLoadError {
    pub fn user_message(&self) -> &'static str {
        "Could not load the sign recognizer. Please refresh and try again."
    }
}

/// A fetched runtime bundle plus the asset base path of whichever endpoint
/// won, so WASM binaries come from the same origin and version as the
/// module code.
pub struct RuntimeBundle {
    pub module_bytes: Vec<u8>,
    pub wasm_base_url: String,
    pub endpoint_url: String,
}

/// Builds the embedder's vision runtime out of a fetched bundle. This is
/// where WASM initialization against the resolved asset path happens; the
/// pipeline itself stays agnostic of the runtime's interior.
pub trait RuntimeFactory: Send + Sync {
    fn initialize(&self, bundle: &RuntimeBundle) -> Result<Arc<dyn VisionRuntime>, RuntimeLoadError>;
}

/// An initialized runtime that can mint classifiers from model bytes.
pub trait VisionRuntime: Send + Sync {
    fn create_classifier(
        &self,
        model_bytes: &[u8],
        mode: RunningMode,
    ) -> Result<Box<dyn Classifier>, RuntimeLoadError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LoadPhase {
    Runtime,
    Model,
    Ready,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct LoadProgress {
    pub phase: LoadPhase,
    pub percent: u8,
}

const RUNTIME_PROGRESS_SHARE: u32 = 70;

pub struct RecognizerLoader {
    endpoints: Vec<RuntimeEndpoint>,
    tries_per_endpoint: u32,
    backoff_base_ms: u64,
    backoff_cap_ms: u64,
    factory: Arc<dyn RuntimeFactory>,
    // Resolved once per process; every subsequent load shares the handle.
    // Holding the lock across resolution makes concurrent first loads
    // single-flight.
    runtime: Mutex<Option<Arc<dyn VisionRuntime>>>,
}

impl RecognizerLoader {
    pub fn new(config: &PipelineConfig, factory: Arc<dyn RuntimeFactory>) -> Self {
        Self {
            endpoints: config.endpoints.clone(),
            tries_per_endpoint: config.tries_per_endpoint.max(1),
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
            factory,
            runtime: Mutex::new(None),
        }
    }

    /// Runs the full load sequence: runtime resolution, model bytes via the
    /// cache, classifier construction with an explicit initial mode. Any
    /// step failing discards partial state; no half-initialized classifier
    /// ever escapes.
    pub fn load(
        &self,
        fetcher: &dyn Fetcher,
        cache: &AssetCache,
        cache_key: &str,
        model_url: &str,
        mode: RunningMode,
        mut on_progress: impl FnMut(LoadProgress),
    ) -> Result<Box<dyn Classifier>, PipelineError> {
        // Progress must be strictly increasing for consumers rendering a
        // bar, whatever the provider reports per chunk.
        let mut last_percent: i16 = -1;
        let mut emit = |phase: LoadPhase, percent: u8| {
            if i16::from(percent) > last_percent {
                last_percent = i16::from(percent);
                on_progress(LoadProgress { phase, percent });
            }
        };

        emit(LoadPhase::Runtime, 0);
        let runtime = self.runtime_handle(fetcher, &mut |progress: &DownloadProgress| {
            let scaled = (u32::from(progress.percent) * RUNTIME_PROGRESS_SHARE / 100) as u8;
            emit(LoadPhase::Runtime, scaled);
        })?;
        emit(LoadPhase::Runtime, RUNTIME_PROGRESS_SHARE as u8);

        let model_bytes =
            cache.get_or_fetch(fetcher, cache_key, model_url, |progress: &DownloadProgress| {
                let scaled = RUNTIME_PROGRESS_SHARE
                    + u32::from(progress.percent) * (100 - RUNTIME_PROGRESS_SHARE) / 100;
                emit(LoadPhase::Model, (scaled as u8).min(99));
            })?;

        let classifier = runtime
            .create_classifier(&model_bytes, mode)
            .map_err(PipelineError::RuntimeLoad)?;
        emit(LoadPhase::Ready, 100);
        log::info!("Recognizer ready for {cache_key} in {mode:?} mode");
        Ok(classifier)
    }

    fn runtime_handle(
        &self,
        fetcher: &dyn Fetcher,
        on_progress: &mut dyn FnMut(&DownloadProgress),
    ) -> Result<Arc<dyn VisionRuntime>, RuntimeLoadError> {
        let mut guard = self.runtime.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(runtime) = guard.as_ref() {
            return Ok(runtime.clone());
        }

        let bundle = self.resolve_bundle(fetcher, on_progress)?;
        let runtime = self.factory.initialize(&bundle)?;
        *guard = Some(runtime.clone());
        Ok(runtime)
    }

    /// Walks the endpoint list in priority order, each with retry and
    /// exponential backoff, and only fails once every endpoint and attempt
    /// is exhausted. The aggregated error names every failure.
    fn resolve_bundle(
        &self,
        fetcher: &dyn Fetcher,
        on_progress: &mut dyn FnMut(&DownloadProgress),
    ) -> Result<RuntimeBundle, RuntimeLoadError> {
        if self.endpoints.is_empty() {
            return Err(RuntimeLoadError::NoEndpoints);
        }

        let mut attempts = Vec::new();
        for (endpoint_index, endpoint) in self.endpoints.iter().enumerate() {
            for attempt in 1..=self.tries_per_endpoint {
                if attempt > 1 {
                    let backoff = (self.backoff_base_ms << (attempt - 2)).min(self.backoff_cap_ms);
                    log::info!(
                        "Retry {}/{} for runtime bundle from {} in {backoff}ms",
                        attempt,
                        self.tries_per_endpoint,
                        endpoint.bundle_url
                    );
                    thread::sleep(Duration::from_millis(backoff));
                }

                let mut bytes = Vec::new();
                let result = fetcher.fetch(&endpoint.bundle_url, &mut |chunk, total| {
                    bytes.extend_from_slice(chunk);
                    on_progress(&DownloadProgress::new(bytes.len() as u64, total));
                });

                match result {
                    Ok(()) => {
                        if endpoint_index > 0 {
                            log::info!(
                                "Runtime bundle loaded from fallback endpoint {}",
                                endpoint.bundle_url
                            );
                        }
                        return Ok(RuntimeBundle {
                            module_bytes: bytes,
                            wasm_base_url: endpoint.wasm_base_url.clone(),
                            endpoint_url: endpoint.bundle_url.clone(),
                        });
                    }
                    Err(err) => {
                        log::warn!(
                            "Runtime bundle attempt {attempt} from {} failed: {err}",
                            endpoint.bundle_url
                        );
                        attempts.push(format!(
                            "{} (attempt {attempt}): {err}",
                            endpoint.bundle_url
                        ));
                    }
                }
            }
        }

        let endpoints: HashSet<_> = self.endpoints.iter().map(|e| &e.bundle_url).collect();
        log::error!(
            "Runtime bundle failed from all {} endpoints ({} attempts)",
            endpoints.len(),
            attempts.len()
        );
        Err(RuntimeLoadError::Exhausted { attempts })
    }
}
