/// Depth estimator collaborator interface.
///
/// The monocular depth model is an external collaborator: the pipeline only
/// consumes its dense relative-depth output and drives its load/unload
/// lifecycle. The model is shared read-only across concurrent inference
/// calls and explicitly releasable to free accelerator memory.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};

use depth_fusion::DepthMap;
use depth_fusion::extract::RgbImage;

/// Failure modes of the depth estimation collaborator.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The model backend is not available (failed to load, missing
    /// runtime). Distinct from a computation failure so callers can fall
    /// back to LiDAR-only output instead of retrying.
    #[error("depth estimator unavailable")]
    Unavailable,

    /// Inference ran but failed for this input.
    #[error("depth inference failed: {0}")]
    Inference(String),
}

/// Monocular depth estimation collaborator.
///
/// Implementations must tolerate `predict` being called before `load`;
/// the shared [`ModelHandle`] auto-loads on first use.
pub trait DepthEstimator: Send + Sync {
    /// Load the model. Returns false when the backend is unavailable.
    fn load(&self) -> bool;

    /// Release the model and any accelerator memory it holds.
    fn unload(&self);

    /// Whether the model is currently loaded.
    fn is_loaded(&self) -> bool;

    /// Predict a dense relative depth map (values 0-1) for an RGB frame.
    fn predict(&self, image: &RgbImage) -> Result<DepthMap, ModelError>;
}

/// Shared, lazily-loading handle around a depth estimator.
///
/// Injected into the orchestrator instead of a process-global singleton.
/// Loading happens at most once per handle; an unavailable backend is
/// logged once and every subsequent call fails fast.
#[derive(Clone)]
pub struct ModelHandle {
    estimator: Arc<dyn DepthEstimator>,
    load: Arc<Once>,
    load_failed: Arc<AtomicBool>,
}

impl ModelHandle {
    /// Wrap an estimator in a shared handle.
    pub fn new(estimator: Arc<dyn DepthEstimator>) -> Self {
        Self {
            estimator,
            load: Arc::new(Once::new()),
            load_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle whose backend is permanently unavailable.
    pub fn unavailable() -> Self {
        Self::new(Arc::new(UnavailableEstimator))
    }

    /// Predict relative depth, loading the model on first use.
    ///
    /// The first caller performs the load; concurrent callers block until
    /// it finishes, so `load()` runs at most once per handle even from the
    /// rayon pool.
    pub fn predict(&self, image: &RgbImage) -> Result<DepthMap, ModelError> {
        self.load.call_once(|| {
            if !self.estimator.is_loaded() && !self.estimator.load() {
                self.load_failed.store(true, Ordering::Release);
                tracing::warn!("depth estimator failed to load, AI enhancement disabled");
            }
        });
        if self.load_failed.load(Ordering::Acquire) {
            return Err(ModelError::Unavailable);
        }
        self.estimator.predict(image)
    }

    /// Release the model.
    pub fn unload(&self) {
        self.estimator.unload();
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("load_failed", &self.load_failed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Estimator stub for deployments without a depth model backend.
struct UnavailableEstimator;

impl DepthEstimator for UnavailableEstimator {
    fn load(&self) -> bool {
        false
    }

    fn unload(&self) {}

    fn is_loaded(&self) -> bool {
        false
    }

    fn predict(&self, _image: &RgbImage) -> Result<DepthMap, ModelError> {
        Err(ModelError::Unavailable)
    }
}
