pub mod backend;
pub mod backends;
pub mod engine;
pub mod nms;
pub mod result;

pub use backend::DetectorBackend;
pub use engine::{DetectionEngine, ModelHandle, CANDIDATE_FLOOR};
pub use result::{BoundingBox, ClassNames, Detection, Inference, RawBox, Threshold};
