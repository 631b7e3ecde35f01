//! Camera session lifecycle: acquire the device, pump frames through the
//! recognition loop on a worker thread, release every track on stop.
//!
//! Stop, category switch, and teardown all run the identical path: flip
//! the running flag, join the worker (so no tick is in flight), stop the
//! stream's tracks. The loop only starts once the stream has produced its
//! first decodable frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::PipelineConfig;
use crate::frame::VideoFrame;
use crate::frame_loop::{DetectionSink, LoopState};
use crate::recognizer::RecognizerInstance;

#[derive(Error, Debug, Clone)]
pub enum CameraAccessError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device available")]
    NoDevice,
    #[error("camera is already running")]
    AlreadyRunning,
    #[error("camera produced no frames")]
    NoFrames,
    #[error("camera device error: {0}")]
    Device(String),
}

impl CameraAccessError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied => {
                "Camera access was denied. Allow camera access and try again."
            }
            Self::NoDevice => "No camera found. Please check your device settings.",
            Self::AlreadyRunning => "The camera is already running.",
            Self::NoFrames | Self::Device(_) => {
                "A camera error occurred. Please check your device settings."
            }
        }
    }
}

/// A live capture stream. `next_frame` returns the latest decodable frame,
/// or `None` when nothing new has arrived yet.
pub trait CameraStream: Send {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraAccessError>;

    /// Number of live device tracks this stream still holds.
    fn live_tracks(&self) -> usize;

    /// Stops every track. Idempotent.
    fn stop(&mut self);
}

/// The platform capture seam. Device capture is consumed, not implemented,
/// by the pipeline; embedders and tests provide the backend.
pub trait CameraDevice: Send {
    fn open(&mut self) -> Result<Box<dyn CameraStream>, CameraAccessError>;
}

/// At most one camera session exists per consumption surface.
pub struct CameraSession {
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    frame_interval: Duration,
    startup_timeout: Duration,
}

impl CameraSession {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            frame_interval: Duration::from_millis(config.frame_interval_ms),
            startup_timeout: Duration::from_millis(config.camera_startup_timeout_ms),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Opens the device, waits for the first decodable frame, then starts
    /// the recognition loop on a worker thread. A failed open or a stream
    /// that never decodes leaves the session stopped with no track held.
    pub fn start(
        &mut self,
        device: &mut dyn CameraDevice,
        instance: Arc<Mutex<Option<RecognizerInstance>>>,
        mut state: LoopState,
        sink: Arc<dyn DetectionSink>,
    ) -> Result<(), CameraAccessError> {
        if self.is_running() {
            return Err(CameraAccessError::AlreadyRunning);
        }

        let mut stream = device.open()?;
        let first = match self.wait_first_frame(stream.as_mut()) {
            Ok(frame) => frame,
            Err(err) => {
                stream.stop();
                return Err(err);
            }
        };

        state.reset();
        self.running.store(true, Ordering::SeqCst);
        let running = self.running.clone();
        let interval = self.frame_interval;

        let worker = thread::Builder::new()
            .name("camera-loop".to_string())
            .spawn(move || {
                log::info!("Camera loop started");
                let mut pending = Some(first);
                while running.load(Ordering::Relaxed) {
                    let tick_started = Instant::now();
                    let frame = match pending.take() {
                        Some(frame) => Some(frame),
                        None => match stream.next_frame() {
                            Ok(frame) => frame,
                            Err(err) => {
                                log::warn!("Camera read failed: {err}");
                                running.store(false, Ordering::SeqCst);
                                break;
                            }
                        },
                    };

                    if let Some(frame) = frame {
                        if let Ok(mut guard) = instance.lock() {
                            if let Some(instance) = guard.as_mut() {
                                state.tick(&frame, instance, sink.as_ref());
                            }
                        }
                    }

                    thread::sleep(interval.saturating_sub(tick_started.elapsed()));
                }
                stream.stop();
                log::info!("Camera loop exiting");
            })
            .map_err(|e| CameraAccessError::Device(e.to_string()))?;

        self.worker = Some(worker);
        Ok(())
    }

    fn wait_first_frame(
        &self,
        stream: &mut dyn CameraStream,
    ) -> Result<VideoFrame, CameraAccessError> {
        let deadline = Instant::now() + self.startup_timeout;
        loop {
            if let Some(frame) = stream.next_frame()? {
                return Ok(frame);
            }
            if Instant::now() >= deadline {
                return Err(CameraAccessError::NoFrames);
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Stops the loop and joins the worker, which stops every stream track
    /// on its way out. Safe to call repeatedly and with no loop running.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Camera worker panicked");
            }
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}
