//! Voice Activity Detection (VAD) module.
//!
//! Detects speech activity in a decoded audio stream using RMS-based
//! thresholding and a state machine that debounces short pauses. Timing is
//! driven by stream time rather than the wall clock, so a file decoded faster
//! than real time segments the same way as one played back live.

use crate::defaults;

/// Configuration for Voice Activity Detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// RMS threshold for detecting speech (0.0 to 1.0).
    pub speech_threshold: f32,
    /// Silence (stream milliseconds) before a segment is considered ended.
    pub debounce_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: defaults::VAD_THRESHOLD,
            debounce_ms: defaults::VAD_DEBOUNCE_MS,
        }
    }
}

/// Current state of voice activity detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech detected.
    Idle,
    /// Speech is being detected.
    Speaking,
    /// Silence detected, waiting to confirm the segment end.
    MaybeSilence,
}

/// Events emitted by the VAD processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    /// First voiced chunk of a new segment.
    SpeechStart,
    /// Chunk inside a segment (voiced, or a pause shorter than the debounce).
    Speech,
    /// Chunk outside any segment.
    Silence,
    /// Chunk that closes the current segment.
    SpeechEnd,
}

/// Detailed VAD processing result with level information.
#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    pub event: VadEvent,
    /// Current RMS level (0.0 to 1.0)
    pub level: f32,
    /// Milliseconds of silence (when in MaybeSilence state)
    pub silence_ms: u64,
}

/// Voice Activity Detector state machine.
#[derive(Debug, Clone)]
pub struct Vad {
    config: VadConfig,
    state: VadState,
    silence_start_ms: Option<u64>,
}

impl Vad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Idle,
            silence_start_ms: None,
        }
    }

    /// Processes the samples of one chunk starting at stream time `now_ms`.
    pub fn process(&mut self, samples: &[i16], now_ms: u64) -> VadEvent {
        self.process_with_info(samples, now_ms).event
    }

    /// Processes one chunk and returns the event with level info.
    pub fn process_with_info(&mut self, samples: &[i16], now_ms: u64) -> VadResult {
        let rms = calculate_rms(samples);
        let is_speech = rms > self.config.speech_threshold;

        let (event, silence_ms) = match self.state {
            VadState::Idle => {
                if is_speech {
                    self.state = VadState::Speaking;
                    (VadEvent::SpeechStart, 0)
                } else {
                    (VadEvent::Silence, 0)
                }
            }
            VadState::Speaking => {
                if !is_speech {
                    self.state = VadState::MaybeSilence;
                    self.silence_start_ms = Some(now_ms);
                }
                (VadEvent::Speech, 0)
            }
            VadState::MaybeSilence => {
                if is_speech {
                    self.state = VadState::Speaking;
                    self.silence_start_ms = None;
                    (VadEvent::Speech, 0)
                } else {
                    let silence_elapsed = self
                        .silence_start_ms
                        .map(|start| now_ms.saturating_sub(start))
                        .unwrap_or(0);

                    if silence_elapsed >= u64::from(self.config.debounce_ms) {
                        self.reset();
                        (VadEvent::SpeechEnd, silence_elapsed)
                    } else {
                        (VadEvent::Speech, silence_elapsed)
                    }
                }
            }
        };

        VadResult {
            event,
            level: rms,
            silence_ms,
        }
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    /// Resets the VAD to idle state.
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.silence_start_ms = None;
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }
}

/// Calculates the Root Mean Square (RMS) of audio samples.
///
/// Returns a normalized value where 0.0 is silence and 1.0 is full scale.
pub fn calculate_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&sample| {
            let normalized = sample as f64 / i16::MAX as f64;
            normalized * normalized
        })
        .sum();

    let mean_square = sum_squares / samples.len() as f64;
    mean_square.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_silence(count: usize) -> Vec<i16> {
        vec![0i16; count]
    }

    fn make_speech(count: usize, amplitude: i16) -> Vec<i16> {
        vec![amplitude; count]
    }

    fn short_debounce() -> VadConfig {
        VadConfig {
            speech_threshold: 0.02,
            debounce_ms: 300,
        }
    }

    #[test]
    fn test_rms_silence_is_zero() {
        assert_eq!(calculate_rms(&make_silence(1000)), 0.0);
    }

    #[test]
    fn test_rms_max_amplitude() {
        let rms = calculate_rms(&make_speech(1000, i16::MAX));
        assert!((rms - 1.0).abs() < 0.001, "RMS should be ~1.0, got {}", rms);
    }

    #[test]
    fn test_rms_mixed_positive_negative() {
        let mut mixed = make_speech(500, 1000);
        mixed.extend(make_speech(500, -1000));
        let rms = calculate_rms(&mixed);
        assert!(
            rms > 0.025 && rms < 0.035,
            "RMS should be ~0.0305, got {}",
            rms
        );
    }

    #[test]
    fn test_calculate_rms_empty_samples() {
        assert_eq!(calculate_rms(&[]), 0.0);
    }

    #[test]
    fn test_vad_starts_idle() {
        let vad = Vad::new(VadConfig::default());
        assert_eq!(vad.state(), VadState::Idle);
        assert_eq!(vad.config().debounce_ms, 1000);
    }

    #[test]
    fn test_vad_detects_speech_start() {
        let mut vad = Vad::new(VadConfig::default());

        assert_eq!(vad.process(&make_silence(1600), 0), VadEvent::Silence);
        assert_eq!(vad.state(), VadState::Idle);

        assert_eq!(vad.process(&make_speech(1600, 3000), 100), VadEvent::SpeechStart);
        assert_eq!(vad.state(), VadState::Speaking);
    }

    #[test]
    fn test_short_pause_stays_inside_segment() {
        let mut vad = Vad::new(short_debounce());
        let speech = make_speech(1600, 3000);
        let silence = make_silence(1600);

        vad.process(&speech, 0);
        assert_eq!(vad.process(&silence, 100), VadEvent::Speech);
        assert_eq!(vad.state(), VadState::MaybeSilence);
        assert_eq!(vad.process(&silence, 200), VadEvent::Speech);
        assert_eq!(vad.process(&speech, 300), VadEvent::Speech);
        assert_eq!(vad.state(), VadState::Speaking);
    }

    #[test]
    fn test_segment_ends_after_debounce() {
        let mut vad = Vad::new(short_debounce());
        let speech = make_speech(1600, 3000);
        let silence = make_silence(1600);

        vad.process(&speech, 0);
        vad.process(&silence, 100);
        vad.process(&silence, 200);
        vad.process(&silence, 300);
        let result = vad.process_with_info(&silence, 400);
        assert_eq!(result.event, VadEvent::SpeechEnd);
        assert_eq!(result.silence_ms, 300);
        assert_eq!(vad.state(), VadState::Idle);

        // A new segment can start right after
        assert_eq!(vad.process(&speech, 500), VadEvent::SpeechStart);
    }

    #[test]
    fn test_timing_follows_stream_time_not_call_count() {
        let mut vad = Vad::new(short_debounce());
        let silence = make_silence(1600);

        vad.process(&make_speech(1600, 3000), 10_000);
        vad.process(&silence, 10_100);
        // One chunk much later in the stream is enough to close the segment
        assert_eq!(vad.process(&silence, 10_400), VadEvent::SpeechEnd);
    }

    #[test]
    fn test_vad_reset_returns_to_idle() {
        let mut vad = Vad::new(VadConfig::default());
        let speech = make_speech(1000, 3000);

        vad.process(&speech, 0);
        vad.reset();
        assert_eq!(vad.state(), VadState::Idle);
        assert_eq!(vad.process(&speech, 100), VadEvent::SpeechStart);
    }
}
