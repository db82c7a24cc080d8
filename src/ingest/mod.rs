//! Frame ingestion sources for the live stream.
//!
//! - `stub://` synthetic generator (testing, demos)
//! - a local directory of still images played in name order
//!
//! Sources hand over `RawFrame`s in the device's pixel layout; the stream
//! worker normalizes them to RGB.

pub mod directory;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::config::LiveSettings;
use crate::frame::RawFrame;

pub use directory::DirectorySource;
pub use synthetic::{SyntheticConfig, SyntheticSource};

/// Something that yields camera frames.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn describe(&self) -> String;

    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

/// Open the source named by the live settings.
pub fn open_source(live: &LiveSettings) -> Result<Box<dyn FrameSource>> {
    let url = live.source.trim();
    if url.is_empty() {
        return Err(anyhow!("live source is empty"));
    }
    if url.starts_with("stub://") {
        let config = SyntheticConfig::parse(url, live.frame_width, live.frame_height)?;
        return Ok(Box::new(SyntheticSource::new(config)));
    }
    if url.contains("://") {
        return Err(anyhow!("unsupported live source {}: only stub:// and local directories", url));
    }
    Ok(Box::new(DirectorySource::open(url)?))
}
