//! Synchronization pipeline.
//!
//! Implements a multi-station pipeline where each station runs in its own thread,
//! connected by bounded crossbeam channels for backpressure.

pub mod aligner_station;
pub mod error;
pub mod orchestrator;
pub mod router;
pub mod segmenter_station;
pub mod station;
pub mod stop;
pub mod types;
pub mod worker;

pub use aligner_station::{AlignerStation, Alignment};
pub use error::{ErrorReporter, LogReporter, StationError};
pub use orchestrator::{Pipeline, PipelineConfig, PipelineReport};
pub use router::{RouterConfig, RouterState, RouterStats, SegmentRouter};
pub use segmenter_station::SegmenterStation;
pub use station::{Station, StationRunner};
pub use stop::{StopReason, StopSignal};
pub use types::{AudioChunk, Hypothesis, SegmentEvent};
pub use worker::{RecognitionWorker, WorkerFailure, WorkerId};
