//! Default configuration constants for autosubsync.
//!
//! Shared between the TOML config, the CLI and the pipeline so every entry
//! point agrees on the same tuning.

/// Sample rate of the decoded PCM stream in Hz.
///
/// 16kHz mono is what speech recognizers expect; the decoder resamples to it.
pub const SAMPLE_RATE: u32 = 16000;

/// Bytes per PCM sample (signed 16-bit little-endian, single channel).
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Duration of each decoded audio chunk in milliseconds.
pub const CHUNK_MS: u32 = 100;

/// RMS level (0.0 to 1.0) above which a chunk counts as speech.
pub const VAD_THRESHOLD: f32 = 0.02;

/// Silence that must elapse inside a segment before it is declared ended.
pub const VAD_DEBOUNCE_MS: u32 = 1000;

/// Language code passed to the recognizer.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Where to start decoding in the media file (10 minutes skips most intros).
pub const SEEK_SECS: u64 = 600;

/// Amount of recognized speech after which the run stops early.
pub const MAX_SPEECH_SECS: u64 = 60;

/// Minimum similarity (exclusive) for a hypothesis window to match a subtitle line.
pub const MATCH_THRESHOLD: f64 = 0.80;

/// Minimum number of words on both sides of a match.
pub const MIN_WORD_MATCH_COUNT: usize = 4;

/// How many leading words of the longer sequence may be skipped when matching.
pub const MAX_WORD_SHIFT: usize = 8;

/// Inlier bound for the running-mean outlier filter, in milliseconds.
pub const OUTLIER_BOUND_MS: f64 = 1000.0;

/// File name postfix for synchronized output (`movie.synced.srt`).
pub const OUTPUT_POSTFIX: &str = "synced";

/// Name of the transcoder binary.
pub const FFMPEG_BINARY: &str = "ffmpeg";

/// Capacity of the decoder → segmenter channel, in chunks.
pub const CHUNK_BUFFER: usize = 32;

/// Capacity of the segmenter → router channel, in events.
pub const SEGMENT_BUFFER: usize = 32;

/// Capacity of each recognition worker's input and output channels.
pub const WORKER_BUFFER: usize = 16;

/// Capacity of the router → aligner channel, in hypotheses.
pub const HYPOTHESIS_BUFFER: usize = 8;

/// Number of PCM bytes in one chunk of `chunk_ms` at `sample_rate`.
pub fn chunk_bytes(sample_rate: u32, chunk_ms: u32) -> usize {
    (sample_rate as u64 * BYTES_PER_SAMPLE as u64 * chunk_ms as u64 / 1000) as usize
}

/// Stream time in milliseconds covered by `bytes` of PCM at `sample_rate`.
pub fn bytes_to_ms(bytes: u64, sample_rate: u32) -> u64 {
    bytes * 1000 / (sample_rate as u64 * BYTES_PER_SAMPLE as u64)
}
