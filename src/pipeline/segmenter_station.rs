//! Segmenter station: tags decoded chunks with voice-activity boundaries.

use crate::audio::vad::{Vad, VadConfig, VadEvent};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::types::{AudioChunk, SegmentEvent};

/// Turns `AudioChunk`s into `SegmentEvent`s.
///
/// Every chunk is forwarded; chunks outside a segment carry no flags and are
/// dropped by the router. Stream times include the decode seek offset.
///
/// Without a detector the whole stream is one segment: the first chunk opens
/// it and nothing closes it, so the router finalizes it when upstream ends.
pub struct SegmenterStation {
    vad: Option<Vad>,
    seek_ms: u64,
    segments: u64,
}

impl SegmenterStation {
    pub fn new(config: VadConfig) -> Self {
        Self {
            vad: Some(Vad::new(config)),
            seek_ms: 0,
            segments: 0,
        }
    }

    /// Segmenter that treats the whole stream as a single segment.
    pub fn whole_stream() -> Self {
        Self {
            vad: None,
            seek_ms: 0,
            segments: 0,
        }
    }

    /// Media position where decoding started.
    pub fn with_seek_ms(mut self, seek_ms: u64) -> Self {
        self.seek_ms = seek_ms;
        self
    }
}

impl Station for SegmenterStation {
    type Input = AudioChunk;
    type Output = SegmentEvent;

    fn name(&self) -> &'static str {
        "segmenter"
    }

    fn process(&mut self, chunk: AudioChunk) -> Result<Option<SegmentEvent>, StationError> {
        if chunk.is_empty() {
            return Ok(None);
        }

        let stream_time_ms = self.seek_ms + chunk.timestamp_ms;
        let event = SegmentEvent::plain(chunk, stream_time_ms);
        let Some(vad) = self.vad.as_mut() else {
            if self.segments > 0 {
                return Ok(Some(event));
            }
            self.segments = 1;
            return Ok(Some(event.with_start()));
        };
        let result = vad.process_with_info(&event.chunk.samples(), stream_time_ms);

        Ok(Some(match result.event {
            VadEvent::SpeechStart => {
                self.segments += 1;
                tracing::trace!(stream_time_ms, level = result.level, "speech started");
                event.with_start()
            }
            VadEvent::SpeechEnd => {
                tracing::trace!(stream_time_ms, silence_ms = result.silence_ms, "speech ended");
                event.with_end()
            }
            VadEvent::Speech | VadEvent::Silence => event,
        }))
    }

    fn shutdown(&mut self) {
        tracing::debug!(segments = self.segments, "segmenter finished");
    }
}
