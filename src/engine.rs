//! High-level gesture pipeline facade.
//!
//! `SignEngine` is what consumption surfaces talk to: load a model for a
//! category (or a custom URL), start and stop the live camera loop,
//! recognize a still image, manage the asset cache. It owns the sequencing
//! guarantees: a category switch fully stops the old loop before the new
//! instance exists, and running-mode switches only ever happen while no
//! loop is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use image::{RgbImage, RgbaImage};

use crate::cache::{AssetCache, CacheEntryStatus, DownloadProgress, Fetcher, UreqFetcher};
use crate::camera::{CameraDevice, CameraSession};
use crate::config::PipelineConfig;
use crate::detection::ClassificationEvent;
use crate::error::PipelineError;
use crate::frame::VideoFrame;
use crate::frame_loop::{DetectionSink, LoopState};
use crate::loader::{LoadProgress, RecognizerLoader, RuntimeFactory};
use crate::overlay::LandmarkPainter;
use crate::recognizer::{RecognizerInstance, RunningMode};
use crate::registry::{ModelRegistry, ModelSource};

/// Result of a single-shot recognition. `Stale` means the request was
/// superseded (the user cleared or replaced the image) and the result was
/// dropped without reaching the UI.
#[derive(Debug)]
pub enum StillOutcome {
    Recognized {
        event: Option<ClassificationEvent>,
        overlay: RgbaImage,
    },
    Stale,
}

pub struct SignEngine {
    config: PipelineConfig,
    registry: ModelRegistry,
    cache: AssetCache,
    fetcher: Arc<dyn Fetcher>,
    loader: RecognizerLoader,
    instance: Arc<Mutex<Option<RecognizerInstance>>>,
    session: CameraSession,
    painter: LandmarkPainter,
    still_generation: AtomicU64,
}

impl SignEngine {
    pub fn new(
        config: PipelineConfig,
        registry: ModelRegistry,
        factory: Arc<dyn RuntimeFactory>,
    ) -> Result<Self, PipelineError> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(UreqFetcher::new(Duration::from_secs(
            config.download_timeout_secs,
        )));
        Self::with_fetcher(config, registry, factory, fetcher)
    }

    /// Like [`SignEngine::new`] with the transport injected, so embedders
    /// and tests can substitute their own.
    pub fn with_fetcher(
        config: PipelineConfig,
        registry: ModelRegistry,
        factory: Arc<dyn RuntimeFactory>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, PipelineError> {
        let cache = match &config.cache_dir {
            Some(dir) => AssetCache::open(dir),
            None => AssetCache::open_default(),
        }
        .map_err(|err| PipelineError::AssetDownload(err.into()))?;

        let loader = RecognizerLoader::new(&config, factory);
        let session = CameraSession::new(&config);
        Ok(Self {
            config,
            registry,
            cache,
            fetcher,
            loader,
            instance: Arc::new(Mutex::new(None)),
            session,
            painter: LandmarkPainter::default(),
            still_generation: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn is_ready(&self) -> bool {
        self.lock_instance().is_some()
    }

    pub fn current_model(&self) -> Option<String> {
        self.lock_instance()
            .as_ref()
            .map(|instance| instance.cache_key().to_string())
    }

    pub fn camera_running(&self) -> bool {
        self.session.is_running()
    }

    /// Loads a model, tearing down any running camera loop first.
    /// Switching category is always stop → full reload → restart by the
    /// caller, never an in-place mutation of the live instance.
    pub fn load_model(
        &mut self,
        source: &ModelSource,
        on_progress: impl FnMut(LoadProgress),
    ) -> Result<(), PipelineError> {
        self.session.stop();

        let (cache_key, url, display_name) = self.resolve(source)?;
        log::info!("Loading model {display_name} ({cache_key})");

        // The old instance goes away before the load starts, so a failure
        // leaves the engine idle rather than half-initialized.
        *self.lock_instance() = None;

        let classifier = self.loader.load(
            self.fetcher.as_ref(),
            &self.cache,
            &cache_key,
            &url,
            RunningMode::Image,
            on_progress,
        )?;

        *self.lock_instance() = Some(RecognizerInstance::new(classifier, cache_key, display_name));
        Ok(())
    }

    fn resolve(&self, source: &ModelSource) -> Result<(String, String, String), PipelineError> {
        match source {
            ModelSource::Category(category) => self
                .registry
                .get(category)
                .map(|entry| {
                    (
                        entry.key.clone(),
                        entry.url.clone(),
                        entry.display_name.clone(),
                    )
                })
                .ok_or_else(|| PipelineError::UnknownCategory(category.clone())),
            // A custom model is cached keyed by its URL; the cache contract
            // is otherwise identical.
            ModelSource::Custom { url, display_name } => {
                Ok((url.clone(), url.clone(), display_name.clone()))
            }
        }
    }

    /// Switches the classifier to VIDEO mode (while no loop runs) and
    /// starts the camera loop. Fails without holding any resource if the
    /// device cannot be opened or never produces a frame.
    pub fn start_camera(
        &mut self,
        device: &mut dyn CameraDevice,
        sink: Arc<dyn DetectionSink>,
    ) -> Result<(), PipelineError> {
        {
            let mut guard = self.lock_instance();
            let instance = guard.as_mut().ok_or(PipelineError::ModelNotLoaded)?;
            instance.set_running_mode(RunningMode::Video)?;
        }

        let state = LoopState::new(&self.config);
        self.session
            .start(device, self.instance.clone(), state, sink)?;
        Ok(())
    }

    /// Stops the loop, joins the worker, releases the stream's tracks, and
    /// restores IMAGE mode so a later still recognition does not hit a
    /// VIDEO-mode classifier. Idempotent.
    pub fn stop_camera(&mut self) {
        self.session.stop();
        if let Some(instance) = self.lock_instance().as_mut() {
            if let Err(err) = instance.set_running_mode(RunningMode::Image) {
                log::warn!("Mode reset after camera stop failed: {err}");
            }
        }
    }

    /// One-shot recognition of a decoded still image. The generation token
    /// discards the result if [`SignEngine::clear_still`] ran while the
    /// recognition was in flight.
    pub fn recognize_still(&self, image: RgbImage) -> Result<StillOutcome, PipelineError> {
        if self.session.is_running() {
            return Err(PipelineError::CameraBusy);
        }

        let generation = self.still_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = VideoFrame::new(image, crate::unix_time_ms());

        let output = {
            let mut guard = self.lock_instance();
            let instance = guard.as_mut().ok_or(PipelineError::ModelNotLoaded)?;
            instance.set_running_mode(RunningMode::Image)?;
            instance.recognize_still(&frame)?
        };

        if self.still_generation.load(Ordering::SeqCst) != generation {
            log::debug!("Stale still recognition discarded");
            return Ok(StillOutcome::Stale);
        }

        let overlay = self
            .painter
            .render(frame.width(), frame.height(), &output.hands);
        let event = output
            .best()
            .map(|candidate| ClassificationEvent::from_candidate(candidate, frame.timestamp_ms));
        Ok(StillOutcome::Recognized { event, overlay })
    }

    /// Invalidates any in-flight still recognition (the user cleared or
    /// replaced the image).
    pub fn clear_still(&self) {
        self.still_generation.fetch_add(1, Ordering::SeqCst);
    }

    // Cache management passthroughs for the admin surface.

    pub fn cache_status(&self) -> Vec<CacheEntryStatus> {
        self.cache.status(&self.registry)
    }

    pub fn cache_total_size(&self) -> u64 {
        self.cache.total_size()
    }

    pub fn remove_cached_model(&self, category: &str) -> Result<(), PipelineError> {
        let entry = self
            .registry
            .get(category)
            .ok_or_else(|| PipelineError::UnknownCategory(category.to_string()))?;
        self.cache
            .remove(&entry.key)
            .map_err(|err| PipelineError::AssetDownload(err.into()))
    }

    pub fn clear_cache(&self) -> Result<(), PipelineError> {
        self.cache
            .clear()
            .map_err(|err| PipelineError::AssetDownload(err.into()))
    }

    /// Downloads every registry model not yet cached.
    pub fn prefetch_all_models(
        &self,
        on_progress: impl FnMut(&str, &DownloadProgress),
        on_model_complete: impl FnMut(&str, usize, usize),
        cancel: &std::sync::atomic::AtomicBool,
    ) -> Result<(), PipelineError> {
        self.cache
            .prefetch_all(
                self.fetcher.as_ref(),
                &self.registry,
                on_progress,
                on_model_complete,
                cancel,
            )
            .map_err(PipelineError::AssetDownload)
    }

    fn lock_instance(&self) -> std::sync::MutexGuard<'_, Option<RecognizerInstance>> {
        self.instance
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SignEngine {
    fn drop(&mut self) {
        self.session.stop();
    }
}
