//! Live video annotation.
//!
//! The processor runs on the stream's own thread and never waits on the
//! consumer. The only state shared with the UI side is the summary queue
//! and a single-slot frame queue carrying the frame to show.

pub mod processor;
pub mod queue;
pub mod stream;
pub mod summary;

pub use processor::{LiveAnnotationProcessor, ProcessorSettings, ProcessorStats};
pub use queue::{
    latest_channel, summary_channel, LatestReceiver, LatestSender, SummaryReceiver, SummarySender,
};
pub use stream::{FrameReceiver, LiveStream, StreamStats, MAX_CONSECUTIVE_SOURCE_ERRORS};
pub use summary::{DetectionSummary, TickStatus};
