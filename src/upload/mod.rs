//! Still-image detection for uploaded photos.

pub mod pipeline;
pub mod session;
pub mod verdict;

pub use pipeline::{SaveStatus, StillImagePipeline, StillResult, UploadOutcome, NO_DETECTION_SUMMARY};
pub use session::{content_hash, UploadSession};
pub use verdict::{LeafVerdict, AMBIGUITY_WARNING};
