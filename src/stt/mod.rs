//! Speech recognition backends.

pub mod recognizer;
pub mod whisper;

pub use recognizer::{
    MockRecognizer, RecognitionSession, Recognizer, SessionConfig, SessionScript, Transcript,
    WordTiming,
};
pub use whisper::{WhisperConfig, WhisperRecognizer};
