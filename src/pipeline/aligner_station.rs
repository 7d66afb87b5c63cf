//! Aligner station: matches hypotheses against subtitles and enforces the
//! recognized-speech budget.

use crate::align::aligner::{MatchCandidate, MatchConfig, align_hypothesis};
use crate::pipeline::error::StationError;
use crate::pipeline::station::Station;
use crate::pipeline::stop::{StopReason, StopSignal};
use crate::pipeline::types::Hypothesis;
use crate::subtitle::SubtitleLine;
use std::sync::Arc;

/// Candidates produced for one hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Recognized speech covered by the hypothesis.
    pub speech_ms: u64,
    pub candidates: Vec<MatchCandidate>,
}

/// Aligns each hypothesis against every subtitle line.
///
/// Once the summed speech of all hypotheses reaches `max_speech_ms`, the
/// station triggers the stop signal; the alignment that crossed the limit is
/// still emitted.
pub struct AlignerStation {
    lines: Arc<Vec<SubtitleLine>>,
    config: MatchConfig,
    max_speech_ms: Option<u64>,
    speech_ms: u64,
    stop: Option<StopSignal>,
}

impl AlignerStation {
    pub fn new(lines: Arc<Vec<SubtitleLine>>, config: MatchConfig) -> Self {
        Self {
            lines,
            config,
            max_speech_ms: None,
            speech_ms: 0,
            stop: None,
        }
    }

    /// Stops the pipeline through `stop` after `max_speech_ms` of speech.
    pub fn with_speech_limit(mut self, max_speech_ms: u64, stop: StopSignal) -> Self {
        self.max_speech_ms = Some(max_speech_ms);
        self.stop = Some(stop);
        self
    }

    /// Recognized speech seen so far.
    pub fn speech_ms(&self) -> u64 {
        self.speech_ms
    }

    fn check_speech_limit(&self) {
        if let (Some(limit), Some(stop)) = (self.max_speech_ms, &self.stop)
            && self.speech_ms >= limit
            && stop.trigger(StopReason::SpeechLimit)
        {
            tracing::info!(speech_ms = self.speech_ms, limit, "speech limit reached, stopping");
        }
    }
}

impl Station for AlignerStation {
    type Input = Hypothesis;
    type Output = Alignment;

    fn name(&self) -> &'static str {
        "aligner"
    }

    fn process(&mut self, hypothesis: Hypothesis) -> Result<Option<Alignment>, StationError> {
        if hypothesis.words.is_empty() {
            return Err(StationError::Recoverable(format!(
                "hypothesis at {}ms has no word timings: '{}'",
                hypothesis.segment_start_ms, hypothesis.transcript
            )));
        }

        let speech_ms = hypothesis.speech_ms();
        let candidates = align_hypothesis(&hypothesis, &self.lines, &self.config);
        tracing::debug!(
            segment_start_ms = hypothesis.segment_start_ms,
            speech_ms,
            matches = candidates.len(),
            transcript = %hypothesis.transcript,
            "hypothesis aligned"
        );

        self.speech_ms += speech_ms;
        self.check_speech_limit();

        Ok(Some(Alignment {
            speech_ms,
            candidates,
        }))
    }

    fn shutdown(&mut self) {
        tracing::debug!(speech_ms = self.speech_ms, "aligner finished");
    }
}
