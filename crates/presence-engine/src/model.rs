//! Detector acquisition and teardown.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use presence_core::{DetectorError, DetectorOptions, FaceDetector, Frame, RawDetection};
use presence_models::ModelIntegrityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model asset unavailable: {0}")]
    Asset(#[from] ModelIntegrityError),
    #[error("inference runtime failed to initialize: {0}")]
    Runtime(String),
    #[error("device not supported: {0}")]
    UnsupportedDevice(String),
    #[error("model loader task failed: {0}")]
    Join(String),
}

/// Builds a detector instance. Runs on the blocking pool, so
/// implementations may do file and device I/O directly.
pub trait DetectorLoader: Send + Sync + 'static {
    fn load(&self, options: &DetectorOptions) -> Result<Box<dyn FaceDetector>, LoadError>;
}

impl<F> DetectorLoader for F
where
    F: Fn(&DetectorOptions) -> Result<Box<dyn FaceDetector>, LoadError> + Send + Sync + 'static,
{
    fn load(&self, options: &DetectorOptions) -> Result<Box<dyn FaceDetector>, LoadError> {
        self(options)
    }
}

/// Inference runtime that turns a verified model file into a detector.
///
/// This is where a real detection runtime plugs in. No backend ships with
/// this crate; wrap one in an [`AssetLoader`] and hand that to
/// [`PresenceEngine::new`](crate::PresenceEngine::new). Tests and trace
/// replay supply detectors through closure loaders instead.
pub trait DetectorBackend: Send + Sync + 'static {
    fn open(
        &self,
        model_path: &Path,
        options: &DetectorOptions,
    ) -> Result<Box<dyn FaceDetector>, LoadError>;
}

/// Loader that verifies the model asset on disk before opening it.
///
/// The production loader: the same checks `presence model verify` runs
/// (presence, non-empty, optional pinned SHA-256) gate every load, and
/// only a verified path reaches the [`DetectorBackend`].
///
/// ```no_run
/// use std::path::Path;
/// use presence_core::{DetectorOptions, FaceDetector};
/// use presence_engine::{AssetLoader, DetectorBackend, EngineConfig, LoadError, PresenceEngine};
///
/// struct MyRuntime;
///
/// impl DetectorBackend for MyRuntime {
///     fn open(
///         &self,
///         model_path: &Path,
///         _options: &DetectorOptions,
///     ) -> Result<Box<dyn FaceDetector>, LoadError> {
///         Err(LoadError::Runtime(format!("cannot open {}", model_path.display())))
///     }
/// }
///
/// let config = EngineConfig::from_env();
/// let loader = AssetLoader::new(config.model_dir.clone(), config.model_sha256.clone(), MyRuntime);
/// let engine = PresenceEngine::new(config, loader);
/// ```
pub struct AssetLoader<B> {
    model_dir: PathBuf,
    expected_sha256: Option<String>,
    backend: B,
}

impl<B: DetectorBackend> AssetLoader<B> {
    pub fn new(model_dir: impl Into<PathBuf>, expected_sha256: Option<String>, backend: B) -> Self {
        Self {
            model_dir: model_dir.into(),
            expected_sha256,
            backend,
        }
    }
}

impl<B: DetectorBackend> DetectorLoader for AssetLoader<B> {
    fn load(&self, options: &DetectorOptions) -> Result<Box<dyn FaceDetector>, LoadError> {
        let verified =
            presence_models::verify_model_dir(&self.model_dir, self.expected_sha256.as_deref())?;
        tracing::info!(
            path = %verified.path.display(),
            sha256 = %verified.sha256,
            bytes = verified.size_bytes,
            pinned = self.expected_sha256.is_some(),
            "detector model verified"
        );
        self.backend.open(&verified.path, options)
    }
}

/// A loaded detector plus its release flag.
pub(crate) struct DetectorSlot {
    detector: Box<dyn FaceDetector>,
    released: bool,
}

impl DetectorSlot {
    pub(crate) fn detect(
        &mut self,
        frame: &Frame,
        timestamp: Duration,
    ) -> Result<Vec<RawDetection>, DetectorError> {
        if self.released {
            return Err(DetectorError::Released);
        }
        self.detector.detect_for_video(frame, timestamp)
    }

    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        self.detector.close();
        true
    }
}

pub(crate) type SharedDetector = Arc<Mutex<DetectorSlot>>;

/// Exclusive owner of the engine's detector.
///
/// The mutex serializes inference with teardown: releasing waits for an
/// in-flight call to return, and any call that reaches the detector
/// afterwards gets `DetectorError::Released`.
#[derive(Default)]
pub struct ModelHandle {
    slot: Option<SharedDetector>,
}

impl ModelHandle {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self {
            slot: Some(Arc::new(Mutex::new(DetectorSlot {
                detector,
                released: false,
            }))),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.is_some()
    }

    pub(crate) fn detector(&self) -> Option<SharedDetector> {
        self.slot.clone()
    }

    /// Close the detector. Returns false if there was nothing to release.
    pub fn release(&mut self) -> bool {
        let Some(slot) = self.slot.take() else {
            return false;
        };
        let released = lock(&slot).release();
        released
    }
}

impl Drop for ModelHandle {
    fn drop(&mut self) {
        if self.release() {
            tracing::debug!("detector released on drop");
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
