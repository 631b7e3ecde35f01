use thiserror::Error;

use crate::cache::AssetDownloadError;
use crate::camera::CameraAccessError;
use crate::loader::RuntimeLoadError;
use crate::recognizer::RecognitionError;

/// Unified pipeline errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Runtime load: {0}")]
    RuntimeLoad(#[from] RuntimeLoadError),

    #[error("Asset download: {0}")]
    AssetDownload(#[from] AssetDownloadError),

    #[error("Camera: {0}")]
    Camera(#[from] CameraAccessError),

    #[error("Recognition: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Unknown model category: {0}")]
    UnknownCategory(String),

    #[error("Model is not loaded yet")]
    ModelNotLoaded,

    #[error("The camera loop is active; stop it first")]
    CameraBusy,
}

impl serde::Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl PipelineError {
    /// A message suitable for direct display on a consumption surface.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RuntimeLoad(err) => err.user_message(),
            Self::AssetDownload(err) => err.user_message(),
            Self::Camera(err) => err.user_message(),
            Self::Recognition(err) => err.user_message(),
            Self::UnknownCategory(_) => "That sign category does not exist.",
            Self::ModelNotLoaded => "The sign model is not loaded yet. Please wait and try again.",
            Self::CameraBusy => "Stop the camera before analyzing a still image.",
        }
    }
}
