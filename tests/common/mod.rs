//! Shared fakes: a scriptable fetcher, classifier factory, camera device,
//! and a recording detection sink.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use image::RgbImage;

use sign_sense::cache::{AssetDownloadError, Fetcher};
use sign_sense::camera::{CameraAccessError, CameraDevice, CameraStream};
use sign_sense::detection::ClassificationEvent;
use sign_sense::frame::VideoFrame;
use sign_sense::frame_loop::DetectionSink;
use sign_sense::loader::{RuntimeBundle, RuntimeFactory, RuntimeLoadError, VisionRuntime};
use sign_sense::recognizer::{
    Classifier, GestureCandidate, Landmark, RecognitionError, RecognitionOutput, RunningMode,
};

pub fn temp_dir(label: &str) -> std::path::PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("sign_sense_{label}_{nanos}"));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

pub fn test_frame(timestamp_ms: i64) -> VideoFrame {
    VideoFrame::new(RgbImage::new(8, 8), timestamp_ms)
}

pub fn output_with(label: &str, score: f32) -> RecognitionOutput {
    RecognitionOutput {
        candidates: vec![GestureCandidate::new(label, score)],
        hands: vec![vec![Landmark::new(0.5, 0.5, 0.0); 21]],
    }
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// What a `ScriptedFetcher` does when asked for a URL.
#[derive(Clone)]
pub enum FetchScript {
    /// Deliver these bytes in small chunks, reporting the total length.
    Ok(Vec<u8>),
    /// Deliver these bytes but report an unknown content length.
    OkUnknownLength(Vec<u8>),
    /// Respond with a non-success HTTP status.
    Status(u16),
    /// Fail before delivering anything.
    NetworkError,
    /// Deliver a prefix, then abort mid-stream.
    Abort(Vec<u8>),
}

/// Counts every request and plays back per-URL scripts. URLs without a
/// script fail with a network error, so tests notice unexpected fetches.
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<FetchScript>>>,
    requests: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
    chunk_size: usize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            requests: AtomicUsize::new(0),
            per_url: Mutex::new(HashMap::new()),
            chunk_size: 3,
        }
    }

    /// Queues one response for a URL. Responses play back in order; the
    /// last one repeats forever.
    pub fn script(&self, url: &str, script: FetchScript) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(script);
    }

    /// Replaces whatever is queued for a URL with a single response.
    pub fn set_script(&self, url: &str, script: FetchScript) {
        let mut queue = VecDeque::new();
        queue.push_back(script);
        self.scripts.lock().unwrap().insert(url.to_string(), queue);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn requests_for(&self, url: &str) -> usize {
        self.per_url.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

impl Fetcher for ScriptedFetcher {
    fn fetch(
        &self,
        url: &str,
        on_chunk: &mut dyn FnMut(&[u8], u64),
    ) -> Result<(), AssetDownloadError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self
            .per_url
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue.front().cloned().unwrap_or(FetchScript::NetworkError),
                None => FetchScript::NetworkError,
            }
        };

        match script {
            FetchScript::Ok(bytes) => {
                let total = bytes.len() as u64;
                for chunk in bytes.chunks(self.chunk_size) {
                    on_chunk(chunk, total);
                }
                Ok(())
            }
            FetchScript::OkUnknownLength(bytes) => {
                for chunk in bytes.chunks(self.chunk_size) {
                    on_chunk(chunk, 0);
                }
                Ok(())
            }
            FetchScript::Status(status) => Err(AssetDownloadError::Status {
                url: url.to_string(),
                status,
            }),
            FetchScript::NetworkError => Err(AssetDownloadError::Network {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
            FetchScript::Abort(prefix) => {
                let total = (prefix.len() as u64) * 4;
                for chunk in prefix.chunks(self.chunk_size) {
                    on_chunk(chunk, total);
                }
                Err(AssetDownloadError::Network {
                    url: url.to_string(),
                    message: "connection reset mid-stream".to_string(),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier / runtime factory
// ---------------------------------------------------------------------------

/// Shared handle letting a test watch and steer one fake classifier.
#[derive(Clone, Default)]
pub struct ClassifierProbe {
    pub video_calls: Arc<AtomicUsize>,
    pub image_calls: Arc<AtomicUsize>,
    /// Outputs played back per video/image call; an empty queue yields
    /// empty recognition results.
    pub outputs: Arc<Mutex<VecDeque<RecognitionOutput>>>,
    /// When set, every recognition call fails with this message.
    pub fail_with: Arc<Mutex<Option<String>>>,
    /// Artificial latency per recognition call, for interleaving tests.
    pub delay: Arc<Mutex<Duration>>,
}

impl ClassifierProbe {
    pub fn push_output(&self, output: RecognitionOutput) {
        self.outputs.lock().unwrap().push_back(output);
    }

    fn next_output(&self) -> Result<RecognitionOutput, RecognitionError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(RecognitionError::Classifier(message));
        }
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }
}

pub struct FakeClassifier {
    probe: ClassifierProbe,
    mode: RunningMode,
}

impl FakeClassifier {
    pub fn new(probe: ClassifierProbe, mode: RunningMode) -> Self {
        Self { probe, mode }
    }
}

impl Classifier for FakeClassifier {
    fn recognize_image(
        &mut self,
        _frame: &VideoFrame,
    ) -> Result<RecognitionOutput, RecognitionError> {
        self.probe.image_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.next_output()
    }

    fn recognize_video_frame(
        &mut self,
        _frame: &VideoFrame,
        _timestamp_ms: i64,
    ) -> Result<RecognitionOutput, RecognitionError> {
        self.probe.video_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.next_output()
    }

    fn set_running_mode(&mut self, mode: RunningMode) -> Result<(), RecognitionError> {
        self.mode = mode;
        Ok(())
    }

    fn running_mode(&self) -> RunningMode {
        self.mode
    }
}

/// Factory handing out fake classifiers. Each `create_classifier` call pops
/// the next queued probe (the last one repeats), so a test can watch each
/// loaded instance separately.
pub struct FakeFactory {
    pub init_calls: Arc<AtomicUsize>,
    pub seen_wasm_base: Arc<Mutex<Option<String>>>,
    probes: Arc<Mutex<VecDeque<ClassifierProbe>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            init_calls: Arc::new(AtomicUsize::new(0)),
            seen_wasm_base: Arc::new(Mutex::new(None)),
            probes: Arc::new(Mutex::new(VecDeque::new())),
        })
    }

    pub fn queue_probe(&self, probe: ClassifierProbe) {
        self.probes.lock().unwrap().push_back(probe);
    }

    fn next_probe(&self) -> ClassifierProbe {
        let mut probes = self.probes.lock().unwrap();
        if probes.len() > 1 {
            probes.pop_front().unwrap()
        } else {
            probes.front().cloned().unwrap_or_default()
        }
    }
}

struct FakeRuntime {
    factory_probes: Arc<Mutex<VecDeque<ClassifierProbe>>>,
}

impl VisionRuntime for FakeRuntime {
    fn create_classifier(
        &self,
        _model_bytes: &[u8],
        mode: RunningMode,
    ) -> Result<Box<dyn Classifier>, RuntimeLoadError> {
        let probe = {
            let mut probes = self.factory_probes.lock().unwrap();
            if probes.len() > 1 {
                probes.pop_front().unwrap()
            } else {
                probes.front().cloned().unwrap_or_default()
            }
        };
        Ok(Box::new(FakeClassifier::new(probe, mode)))
    }
}

impl RuntimeFactory for FakeFactory {
    fn initialize(&self, bundle: &RuntimeBundle) -> Result<Arc<dyn VisionRuntime>, RuntimeLoadError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_wasm_base.lock().unwrap() = Some(bundle.wasm_base_url.clone());
        Ok(Arc::new(FakeRuntime {
            factory_probes: self.probes.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

/// Scripted camera: serves a fixed frame sequence, then reports "nothing
/// new". The track counter is shared with the test so teardown can be
/// asserted from outside.
pub struct ScriptedCamera {
    frames: Vec<VideoFrame>,
    pub tracks: Arc<AtomicUsize>,
    fail_open: Option<CameraAccessError>,
}

impl ScriptedCamera {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        Self {
            frames,
            tracks: Arc::new(AtomicUsize::new(0)),
            fail_open: None,
        }
    }

    pub fn failing(error: CameraAccessError) -> Self {
        Self {
            frames: Vec::new(),
            tracks: Arc::new(AtomicUsize::new(0)),
            fail_open: Some(error),
        }
    }

    pub fn live_tracks(&self) -> usize {
        self.tracks.load(Ordering::SeqCst)
    }
}

impl CameraDevice for ScriptedCamera {
    fn open(&mut self) -> Result<Box<dyn CameraStream>, CameraAccessError> {
        if let Some(err) = self.fail_open.clone() {
            return Err(err);
        }
        self.tracks.store(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            frames: self.frames.clone().into(),
            tracks: self.tracks.clone(),
        }))
    }
}

struct ScriptedStream {
    frames: VecDeque<VideoFrame>,
    tracks: Arc<AtomicUsize>,
}

impl CameraStream for ScriptedStream {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraAccessError> {
        Ok(self.frames.pop_front())
    }

    fn live_tracks(&self) -> usize {
        self.tracks.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.tracks.store(0, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingSink {
    pub detections: Mutex<Vec<ClassificationEvent>>,
    pub cleared: AtomicUsize,
    pub overlays: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn detection_count(&self) -> usize {
        self.detections.lock().unwrap().len()
    }

    pub fn last_detection(&self) -> Option<ClassificationEvent> {
        self.detections.lock().unwrap().last().cloned()
    }

    pub fn cleared_count(&self) -> usize {
        self.cleared.load(Ordering::SeqCst)
    }
}

impl DetectionSink for RecordingSink {
    fn on_detection(&self, event: &ClassificationEvent) {
        self.detections.lock().unwrap().push(event.clone());
    }

    fn on_cleared(&self) {
        self.cleared.fetch_add(1, Ordering::SeqCst);
    }

    fn on_overlay(&self, _overlay: &image::RgbaImage) {
        self.overlays.fetch_add(1, Ordering::SeqCst);
    }
}

/// Polls until the condition holds or the deadline passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
