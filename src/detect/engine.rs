use std::sync::{Arc, OnceLock};

use image::RgbImage;
use parking_lot::Mutex;

use super::backend::DetectorBackend;
use super::result::{ClassNames, Detection, Inference, Threshold};
use crate::error::DetectError;

/// Lowest confidence requested from a backend. Candidates between this floor
/// and the caller's threshold are counted but not returned, which is how a
/// "below threshold" result is told apart from an empty model response.
pub const CANDIDATE_FLOOR: f32 = 0.25;

/// Single-image inference over a loaded backend.
///
/// Shared by the still-image and live paths through an `Arc`. Calls are
/// serialized on the backend; the engine itself is otherwise read-only.
pub struct DetectionEngine {
    backend: Mutex<Box<dyn DetectorBackend>>,
    names: ClassNames,
    backend_name: &'static str,
}

impl std::fmt::Debug for DetectionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionEngine")
            .field("backend_name", &self.backend_name)
            .finish_non_exhaustive()
    }
}

impl DetectionEngine {
    pub fn new(backend: Box<dyn DetectorBackend>) -> Self {
        let names = ClassNames::new(backend.class_names().to_vec());
        let backend_name = backend.name();
        Self {
            backend: Mutex::new(backend),
            names,
            backend_name,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    pub fn class_names(&self) -> &ClassNames {
        &self.names
    }

    pub fn warm_up(&self) -> Result<(), DetectError> {
        self.backend
            .lock()
            .warm_up()
            .map_err(|e| DetectError::ModelUnavailable(format!("{:#}", e)))
    }

    /// Run one inference. Boxes are in `image` pixel coordinates.
    pub fn infer(&self, image: &RgbImage, threshold: Threshold) -> Result<Inference, DetectError> {
        let floor = CANDIDATE_FLOOR.min(threshold.value());
        let mut raw = self
            .backend
            .lock()
            .predict(image, floor)
            .map_err(|e| DetectError::Inference(format!("{:#}", e)))?;
        raw.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let candidates = raw.len();
        let detections = raw
            .into_iter()
            .filter(|r| threshold.admits(r.confidence))
            .map(|r| Detection {
                class_index: r.class_index,
                class_name: self.names.name(r.class_index),
                confidence: r.confidence,
                bbox: r.bbox,
            })
            .collect();
        Ok(Inference {
            detections,
            candidates,
        })
    }
}

type Loader = Box<dyn FnOnce() -> anyhow::Result<DetectionEngine> + Send>;

/// Process-owned, lazily loaded model.
///
/// The loader runs at most once, on first `get`. A failed load is remembered
/// and every later call reports the same `ModelUnavailable`.
pub struct ModelHandle {
    loader: Mutex<Option<Loader>>,
    engine: OnceLock<Result<Arc<DetectionEngine>, DetectError>>,
}

impl ModelHandle {
    pub fn new<F>(loader: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<DetectionEngine> + Send + 'static,
    {
        Self {
            loader: Mutex::new(Some(Box::new(loader))),
            engine: OnceLock::new(),
        }
    }

    /// Wrap an engine that is already loaded.
    pub fn ready(engine: DetectionEngine) -> Self {
        let handle = Self {
            loader: Mutex::new(None),
            engine: OnceLock::new(),
        };
        let _ = handle.engine.set(Ok(Arc::new(engine)));
        handle
    }

    pub fn get(&self) -> Result<Arc<DetectionEngine>, DetectError> {
        self.engine
            .get_or_init(|| {
                let loader = self.loader.lock().take();
                let Some(loader) = loader else {
                    return Err(DetectError::ModelUnavailable(
                        "model loader already consumed".to_string(),
                    ));
                };
                match loader() {
                    Ok(engine) => {
                        log::info!("detection model loaded (backend: {})", engine.backend_name());
                        Ok(Arc::new(engine))
                    }
                    Err(err) => {
                        log::error!("detection model failed to load: {:#}", err);
                        Err(DetectError::ModelUnavailable(format!("{:#}", err)))
                    }
                }
            })
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.engine.get(), Some(Ok(_)))
    }
}
