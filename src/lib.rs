//! Lostwatch
//!
//! Turns a sampled stream of object detections into deduplicated "lost object"
//! records and, when enabled, reports each one to an external items store at
//! most once.
//!
//! # Pipeline
//!
//! 1. **Detection source**: raw per-frame detections (detector output or simulator).
//! 2. **Track builder**: groups detections by class and coarse spatial bucket.
//! 3. **Stationarity classifier**: dispersion and duration checks per track.
//! 4. **Aggregator**: one `LostObject` per qualifying track.
//! 5. **Reporter**: optional, at-most-once submission per object.
//!
//! # Module Structure
//!
//! - `detect`: detection types and sources
//! - `track`, `stationary`, `aggregate`: the inference stages
//! - `report`: item sinks and the at-most-once gate
//! - `store`: video analysis records
//! - `pipeline`: job orchestration, cancellation and progress
//! - `config`, `settings`: process configuration and per-video settings

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};

pub mod aggregate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod pipeline;
pub mod report;
pub mod settings;
pub mod stationary;
pub mod store;
pub mod track;
pub mod ui;

pub use aggregate::{category_for_class, describe, Aggregator, LostObject, ObjectLocation, TrackData};
pub use detect::{
    BoundingBox, Detection, DetectionSource, JsonLinesSource, RawDetection, ScriptedSource,
    SimulatedSource, SimulationConfig,
};
pub use frame::{FrameExtractor, PathFrameExtractor, PlaceholderFrameExtractor};
pub use pipeline::{
    AnalysisPipeline, AnalysisSummary, CancellationToken, Progress, ProgressStage, RunOutcome,
    VideoProcessor,
};
pub use report::{
    InMemoryItemSink, ItemRequest, ItemSink, ReportOutcome, Reporter, Urgency,
};
pub use settings::VideoAnalysisSettings;
pub use stationary::{StationarityClassifier, StationaryAssessment};
pub use store::{InMemoryVideoStore, SqliteVideoStore, VideoAnalysis, VideoStatus, VideoStore};
pub use track::{filter_detections, BucketTracker, Track, TrackKey, Tracker};

pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:lostwatch_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
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
