//! autosubsync - Re-time subtitles to a video's spoken audio
//!
//! Transcribes portions of the audio and aligns recognized phrases against
//! subtitle lines to estimate one global time shift.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod align;
pub mod app;
pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod pipeline;
pub mod stt;
pub mod subtitle;

// Core traits (source → recognize → align)
pub use audio::source::PcmSource;
pub use stt::recognizer::{RecognitionSession, Recognizer};

// Synchronization
pub use app::{SyncOptions, SyncOutcome, Synchronizer, synchronize};
pub use pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineReport};

// Error handling
pub use error::{Result, SyncError};

// Config
pub use config::Config;

// Station framework (for advanced users)
pub use pipeline::error::{ErrorReporter, StationError};
pub use pipeline::station::Station;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.0+abc1234"` when git hash is available, `"0.3.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
