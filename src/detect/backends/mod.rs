pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

use anyhow::Result;

use super::engine::DetectionEngine;
use crate::config::ModelSettings;

pub use scripted::{Script, ScriptProbe, ScriptedBackend};

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Build the engine named by the model settings.
///
/// `stub://` paths select the scripted demo backend; anything else is an
/// ONNX file and needs the `backend-tract` feature.
pub fn load_engine(settings: &ModelSettings) -> Result<DetectionEngine> {
    let path = settings.path.to_string_lossy();
    if path.starts_with("stub://") {
        return Ok(DetectionEngine::new(Box::new(ScriptedBackend::demo(
            settings.class_names.clone(),
        ))));
    }

    #[cfg(feature = "backend-tract")]
    {
        let backend = TractBackend::load(
            &settings.path,
            settings.input_size,
            settings.class_names.clone(),
            settings.iou,
        )?;
        let engine = DetectionEngine::new(Box::new(backend));
        engine.warm_up()?;
        Ok(engine)
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(anyhow::anyhow!(
            "cannot load {}: built without the backend-tract feature",
            path
        ))
    }
}
