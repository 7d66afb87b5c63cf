//! Pipeline wiring: decode → segment → route/recognize → align.
//!
//! Each stage runs on its own thread and hands off through bounded channels.
//! A shared [`StopSignal`] ends the run early: the speech limit and Ctrl-C
//! stop it gracefully, while the first stage failure stops it with an error.
//! Every stage releases its resources (decoder process, recognition sessions)
//! as soon as the signal fires.

use crate::align::aligner::{MatchCandidate, MatchConfig};
use crate::audio::source::PcmSource;
use crate::audio::vad::VadConfig;
use crate::defaults;
use crate::error::{Result, SyncError};
use crate::pipeline::aligner_station::{AlignerStation, Alignment};
use crate::pipeline::error::{ErrorReporter, LogReporter};
use crate::pipeline::router::{RouterConfig, RouterStats, SegmentRouter};
use crate::pipeline::segmenter_station::SegmenterStation;
use crate::pipeline::station::StationRunner;
use crate::pipeline::stop::{StopReason, StopSignal};
use crate::pipeline::types::{AudioChunk, Hypothesis, SegmentEvent};
use crate::stt::recognizer::Recognizer;
use crate::subtitle::SubtitleLine;
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sample rate of the PCM produced by the source
    pub sample_rate: u32,
    /// Media position of the first decoded byte
    pub seek_ms: u64,
    /// Voice-activity settings; `None` sends the whole stream to one session
    pub vad: Option<VadConfig>,
    pub router: RouterConfig,
    pub matching: MatchConfig,
    /// Recognized speech after which the run stops early
    pub max_speech_ms: Option<u64>,
    /// Channel buffer sizes
    pub chunk_buffer: usize,
    pub segment_buffer: usize,
    pub hypothesis_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            seek_ms: 0,
            vad: Some(VadConfig::default()),
            router: RouterConfig::default(),
            matching: MatchConfig::default(),
            max_speech_ms: Some(defaults::MAX_SPEECH_SECS * 1000),
            chunk_buffer: defaults::CHUNK_BUFFER,
            segment_buffer: defaults::SEGMENT_BUFFER,
            hypothesis_buffer: defaults::HYPOTHESIS_BUFFER,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Match candidates in the order they were produced.
    pub candidates: Vec<MatchCandidate>,
    /// Hypotheses that reached the aligner.
    pub hypotheses: usize,
    /// Recognized speech summed over those hypotheses.
    pub speech_ms: u64,
    /// Speech segments opened by the router.
    pub segments: u64,
    /// Whether the run ended before the audio did.
    pub stopped_early: bool,
}

/// Subtitle synchronization pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    recognizer: Arc<dyn Recognizer>,
    error_reporter: Arc<dyn ErrorReporter>,
    stop: StopSignal,
}

impl Pipeline {
    /// Creates a new pipeline with default error reporter.
    pub fn new(config: PipelineConfig, recognizer: Arc<dyn Recognizer>) -> Self {
        Self {
            config,
            recognizer,
            error_reporter: Arc::new(LogReporter),
            stop: StopSignal::new(),
        }
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.error_reporter = reporter;
        self
    }

    /// Handle for stopping the run from outside (e.g. on Ctrl-C).
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Runs the pipeline to completion on background threads.
    ///
    /// Returns the candidates gathered before the audio ended or the run
    /// was stopped. Any stage failure tears everything down and is returned.
    pub fn run(
        self,
        source: Box<dyn PcmSource>,
        lines: Arc<Vec<SubtitleLine>>,
    ) -> Result<PipelineReport> {
        let stop = self.stop.clone();

        let (chunk_tx, chunk_rx) = bounded(self.config.chunk_buffer);
        let (segment_tx, segment_rx) = bounded(self.config.segment_buffer);
        let (hypothesis_tx, hypothesis_rx) = bounded(self.config.hypothesis_buffer);
        let (aligned_tx, aligned_rx) = bounded::<Alignment>(self.config.hypothesis_buffer);

        let segmenter = match self.config.vad {
            Some(vad) => SegmenterStation::new(vad),
            None => SegmenterStation::whole_stream(),
        }
        .with_seek_ms(self.config.seek_ms);
        let mut aligner = AlignerStation::new(lines, self.config.matching);
        if let Some(limit) = self.config.max_speech_ms {
            aligner = aligner.with_speech_limit(limit, stop.clone());
        }

        let segmenter_runner = StationRunner::spawn(
            segmenter,
            chunk_rx,
            segment_tx,
            self.error_reporter.clone(),
            stop.clone(),
        );
        let router = SegmentRouter::new(self.recognizer.clone(), self.config.router.clone());
        let router_handle = spawn_router(router, segment_rx, hypothesis_tx, stop.clone());
        let aligner_runner = StationRunner::spawn(
            aligner,
            hypothesis_rx,
            aligned_tx,
            self.error_reporter.clone(),
            stop.clone(),
        );
        let decoder_handle = spawn_decoder(source, chunk_tx, self.config.sample_rate, stop.clone());

        let mut report = PipelineReport::default();
        for alignment in aligned_rx.iter() {
            report.hypotheses += 1;
            report.speech_ms += alignment.speech_ms;
            report.candidates.extend(alignment.candidates);
        }

        // Join everything before deciding the outcome
        let joined = [
            join_thread(decoder_handle, "decoder"),
            segmenter_runner.join(),
            aligner_runner.join(),
        ];
        let router_stats = join_thread(router_handle, "segment-router");

        if let Some(error) = stop.take_error() {
            return Err(error);
        }
        for result in joined {
            result?;
        }
        if let Some(stats) = router_stats? {
            report.segments = stats.segments;
        }

        report.stopped_early = matches!(
            stop.reason(),
            Some(StopReason::SpeechLimit | StopReason::Interrupted)
        );
        tracing::info!(
            hypotheses = report.hypotheses,
            segments = report.segments,
            speech_ms = report.speech_ms,
            candidates = report.candidates.len(),
            stopped_early = report.stopped_early,
            "pipeline finished"
        );
        Ok(report)
    }
}

/// Runs the router, turning its failure into a pipeline-wide stop.
fn spawn_router(
    router: SegmentRouter,
    input: Receiver<SegmentEvent>,
    output: Sender<Hypothesis>,
    stop: StopSignal,
) -> Result<JoinHandle<Option<RouterStats>>> {
    let handle = thread::Builder::new()
        .name("segment-router".to_string())
        .spawn(move || match router.run(input, output, stop.clone()) {
            Ok(stats) => Some(stats),
            Err(error) => {
                stop.fail(error);
                None
            }
        })?;
    Ok(handle)
}

/// Reads the source and forwards timestamped chunks until it ends or the
/// pipeline stops. The source is always destroyed on exit.
fn spawn_decoder(
    mut source: Box<dyn PcmSource>,
    output: Sender<AudioChunk>,
    sample_rate: u32,
    stop: StopSignal,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("decoder".to_string())
        .spawn(move || {
            let mut offset_bytes: u64 = 0;
            while !stop.is_stopped() {
                let data = match source.read_chunk() {
                    Ok(Some(data)) => data,
                    Ok(None) => break,
                    Err(error) => {
                        stop.fail(error);
                        break;
                    }
                };

                let chunk = AudioChunk::new(data, defaults::bytes_to_ms(offset_bytes, sample_rate));
                offset_bytes += chunk.data.len() as u64;

                let sent = select! {
                    send(output, chunk) -> result => result.is_ok(),
                    recv(stop.receiver()) -> _ => false,
                };
                if !sent {
                    break;
                }
            }
            source.destroy();
            let decoded_ms = defaults::bytes_to_ms(offset_bytes, sample_rate);
            tracing::debug!(decoded_ms, "decoder finished");
        })?;
    Ok(handle)
}

fn join_thread<T>(handle: Result<JoinHandle<T>>, name: &str) -> Result<T> {
    handle?.join().map_err(|_| SyncError::Pipeline {
        message: format!("{name} thread panicked"),
    })
}
