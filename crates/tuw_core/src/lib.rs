//! # tuw_core - Platformer session telemetry analysis
//!
//! Turns a recorded session dump into a short list of runs worth watching
//! again, and maps those runs onto the screen recordings of the session.
//!
//! ## Pipeline
//! - [`telemetry`]: length-prefixed binary records → [`GameState`] list
//! - [`runs`]: state list → closed [`Run`]s under a [`SegmentPolicy`]
//! - [`analysis`]: per-room trajectory clustering and per-run
//!   classification
//! - [`export`]: selected runs → recording-relative clips → concat list

pub mod analysis;
pub mod config;
pub mod error;
pub mod export;
pub mod runs;
pub mod telemetry;

pub use analysis::{
    classify, ConditionKind, DensityClusterer, Extraction, ExtractionSummary, PointClusterer,
    RunInclusion, SessionAnalysis,
};
pub use config::{ClusterConfig, EnabledConditions, ExtractConfig};
pub use error::{CatalogError, ClipError, ClusterError, ConfigError, DecodeError, Result, TuwError};
pub use export::{ClipMapper, ClipPlan, ClipSegment, RecordingCatalog};
pub use runs::{extract_runs, PolicyKind, Run, RunSummary, SegmentPolicy};
pub use telemetry::{GameState, StateDump};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
