use anyhow::Result;
use image::RgbImage;

use super::result::RawBox;

/// Detector backend trait.
///
/// Backends receive the image exactly as it should be inferred on and return
/// boxes in that image's pixel coordinates. Resizing to the model's input
/// tensor and mapping back is the backend's business.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names indexed by the `class_index` the backend emits.
    fn class_names(&self) -> &[String];

    /// Run detection on one image, dropping candidates below `min_confidence`.
    fn predict(&mut self, image: &RgbImage, min_confidence: f32) -> Result<Vec<RawBox>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
