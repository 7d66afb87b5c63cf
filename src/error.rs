//! Error types for autosubsync.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio decoding errors
    #[error("Audio decoding failed: {message}")]
    Decode { message: String },

    // Recognition errors
    #[error("Speech recognition failed: {message}")]
    Recognition { message: String },

    // Subtitle errors
    #[error("Invalid subtitle file at line {line}: {message}")]
    SubtitleParse { line: usize, message: String },

    #[error("Shift would move subtitle {line} to a negative timestamp ({time_ms}ms)")]
    NegativeTimestamp { line: u32, time_ms: i64 },

    // Pipeline plumbing errors (thread panics, broken wiring)
    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
