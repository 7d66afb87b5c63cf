//! Data types flowing between pipeline stages.

use crate::stt::recognizer::Transcript;
pub use crate::stt::recognizer::WordTiming;
use serde::Serialize;

/// A chunk of decoded PCM (s16le, mono).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw little-endian 16-bit samples.
    pub data: Vec<u8>,
    /// Milliseconds since the pipeline started decoding.
    pub timestamp_ms: u64,
}

impl AudioChunk {
    pub fn new(data: Vec<u8>, timestamp_ms: u64) -> Self {
        Self { data, timestamp_ms }
    }

    /// Decodes the byte buffer into samples, ignoring a trailing odd byte.
    pub fn samples(&self) -> Vec<i16> {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// An audio chunk tagged with voice-activity boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentEvent {
    pub chunk: AudioChunk,
    /// First chunk of a new voiced segment.
    pub start: bool,
    /// Chunk that closes the current segment.
    pub end: bool,
    /// Absolute media time of the chunk (decode offset included).
    pub stream_time_ms: u64,
}

impl SegmentEvent {
    /// A chunk outside or inside a segment without boundary flags.
    pub fn plain(chunk: AudioChunk, stream_time_ms: u64) -> Self {
        Self {
            chunk,
            start: false,
            end: false,
            stream_time_ms,
        }
    }

    pub fn with_start(mut self) -> Self {
        self.start = true;
        self
    }

    pub fn with_end(mut self) -> Self {
        self.end = true;
        self
    }
}

/// A recognized transcript bound to the absolute start of its segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hypothesis {
    pub transcript: String,
    /// Word offsets relative to `segment_start_ms`.
    pub words: Vec<WordTiming>,
    pub segment_start_ms: u64,
}

impl Hypothesis {
    pub fn from_transcript(transcript: Transcript, segment_start_ms: u64) -> Self {
        Self {
            transcript: transcript.text,
            words: transcript.words,
            segment_start_ms,
        }
    }

    /// Span of recognized speech, first word start to last word end.
    pub fn speech_ms(&self) -> u64 {
        match (self.words.first(), self.words.last()) {
            (Some(first), Some(last)) => last.end_ms.saturating_sub(first.start_ms),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_chunk_samples_little_endian() {
        let chunk = AudioChunk::new(vec![0x01, 0x00, 0xff, 0xff, 0x7f], 0);
        assert_eq!(chunk.samples(), vec![1, -1]);
        assert!(!chunk.is_empty());
    }

    #[test]
    fn test_segment_event_flags() {
        let event = SegmentEvent::plain(AudioChunk::new(vec![0, 0], 100), 600_100)
            .with_start()
            .with_end();
        assert!(event.start);
        assert!(event.end);
        assert_eq!(event.stream_time_ms, 600_100);
    }

    #[test]
    fn test_hypothesis_speech_ms() {
        let hyp = Hypothesis::from_transcript(
            Transcript::new(
                "hello there",
                vec![
                    WordTiming::new("hello", 200, 500),
                    WordTiming::new("there", 600, 1100),
                ],
            ),
            5000,
        );
        assert_eq!(hyp.speech_ms(), 900);
        assert_eq!(hyp.segment_start_ms, 5000);

        let empty = Hypothesis::from_transcript(Transcript::new("", vec![]), 0);
        assert_eq!(empty.speech_ms(), 0);
    }
}
