//! Melon leaf disease detection.
//!
//! Finds disease regions on melon leaves in uploaded photos and in live
//! camera video, draws them, and keeps a per-user history of results.
//!
//! # Module Structure
//!
//! - `detect`: detector backends, the shared `DetectionEngine` and its lazily
//!   loaded `ModelHandle`
//! - `live`: frame-by-frame annotation of a video stream, summary hand-off
//!   to the UI side, and the stream worker thread
//! - `upload`: still-image detection with idempotent history saving
//! - `storage`: users and detection history (SQLite or in-memory)
//! - `session`: page navigation and per-user state
//! - `frame`, `annotate`, `ingest`: pixel formats, drawing, frame sources
//! - `config`, `error`: settings and the failure taxonomy

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use rusqlite::{Connection, OpenFlags};

pub mod annotate;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod live;
pub mod session;
pub mod storage;
pub mod upload;

pub use annotate::Annotator;
pub use config::AppConfig;
pub use detect::{
    BoundingBox, Detection, DetectionEngine, DetectorBackend, ModelHandle, Threshold,
};
pub use error::DetectError;
pub use frame::{PixelFormat, RawFrame};
pub use ingest::FrameSource;
pub use live::{
    summary_channel, DetectionSummary, LiveAnnotationProcessor, LiveStream, ProcessorSettings,
    SummaryReceiver, TickStatus,
};
pub use session::{DetectionMode, Page, RegisterOutcome, Session};
pub use storage::{HistoryRecord, HistoryStore, InMemoryStore, SqliteStore, UserStore};
pub use upload::{LeafVerdict, SaveStatus, StillImagePipeline, UploadOutcome, UploadSession};

/// Unique shared-cache in-memory SQLite URI, usable from several connections.
pub fn shared_memory_uri() -> String {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!(
        "file:melon_leaf_{}_{}_{:x}?mode=memory&cache=shared",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed),
        nanos
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}
