//! Subtitle synchronization entry point.
//!
//! Orchestrates the complete flow:
//! read subtitles → decode → segment → recognize → align → estimate → shift → write

use crate::align::aligner::MatchConfig;
use crate::align::estimator::{Estimate, estimate_shift};
use crate::audio::open_source;
use crate::audio::source::SourceConfig;
use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::pipeline::orchestrator::{Pipeline, PipelineConfig, PipelineReport};
use crate::pipeline::router::RouterConfig;
use crate::pipeline::stop::StopSignal;
use crate::stt::recognizer::{Recognizer, SessionConfig};
use crate::stt::whisper::{WhisperConfig, WhisperRecognizer};
use crate::subtitle;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything one synchronization run needs.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub video: PathBuf,
    pub subtitles: PathBuf,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
    pub overwrite: bool,
    pub postfix: String,
    pub dry_run: bool,
}

impl SyncOptions {
    /// Derives run options from a validated configuration.
    pub fn from_config(config: &Config, video: &Path, subtitles: &Path) -> Self {
        let seek_ms = config.sync.seek_secs * 1000;
        let source = SourceConfig {
            ffmpeg: config.audio.ffmpeg.clone(),
            sample_rate: config.audio.sample_rate,
            chunk_ms: config.audio.chunk_ms,
            seek_ms,
            limit_ms: config.sync.decode_limit_secs.map(|secs| secs * 1000),
        };
        let pipeline = PipelineConfig {
            sample_rate: config.audio.sample_rate,
            seek_ms,
            vad: config.vad.enabled.then(|| (&config.vad).into()),
            router: RouterConfig {
                session: SessionConfig {
                    sample_rate: config.audio.sample_rate,
                    language: config.recognizer.language.clone(),
                    word_time_offsets: true,
                },
                worker_buffer: config.pipeline.worker_buffer,
            },
            matching: MatchConfig {
                threshold: config.sync.match_threshold,
                min_word_match_count: config.sync.min_word_match_count,
                max_word_shift: config.sync.max_word_shift,
            },
            max_speech_ms: Some(config.sync.max_speech_secs * 1000),
            chunk_buffer: config.pipeline.chunk_buffer,
            segment_buffer: config.pipeline.segment_buffer,
            hypothesis_buffer: config.pipeline.hypothesis_buffer,
        };

        Self {
            video: video.to_path_buf(),
            subtitles: subtitles.to_path_buf(),
            source,
            pipeline,
            overwrite: false,
            postfix: config.sync.postfix.clone(),
            dry_run: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Where the synchronized subtitles go.
    pub fn output_path(&self) -> PathBuf {
        subtitle::output_path(&self.subtitles, self.overwrite, &self.postfix)
    }
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// Shifted subtitles were written to `output`.
    Synced {
        estimate: Estimate,
        output: PathBuf,
        report: PipelineReport,
    },
    /// A shift was found but nothing was written.
    DryRun {
        estimate: Estimate,
        output: PathBuf,
        report: PipelineReport,
    },
    /// No recognized phrase matched any subtitle line.
    NoMatch { report: PipelineReport },
}

/// Machine-readable summary of a run, printed by `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
    pub status: &'static str,
    pub shift_ms: Option<i64>,
    pub estimate: Option<Estimate>,
    pub output: Option<PathBuf>,
    pub hypotheses: usize,
    pub speech_ms: u64,
    pub segments: u64,
    pub stopped_early: bool,
}

impl SyncOutcome {
    pub fn report(&self) -> &PipelineReport {
        match self {
            SyncOutcome::Synced { report, .. }
            | SyncOutcome::DryRun { report, .. }
            | SyncOutcome::NoMatch { report } => report,
        }
    }

    pub fn estimate(&self) -> Option<&Estimate> {
        match self {
            SyncOutcome::Synced { estimate, .. } | SyncOutcome::DryRun { estimate, .. } => {
                Some(estimate)
            }
            SyncOutcome::NoMatch { .. } => None,
        }
    }

    pub fn summary(&self) -> SyncSummary {
        let report = self.report();
        let (status, output) = match self {
            SyncOutcome::Synced { output, .. } => ("synced", Some(output.clone())),
            SyncOutcome::DryRun { output, .. } => ("dry-run", Some(output.clone())),
            SyncOutcome::NoMatch { .. } => ("no-match", None),
        };
        SyncSummary {
            status,
            shift_ms: self.estimate().map(|e| e.shift_ms),
            estimate: self.estimate().copied(),
            output,
            hypotheses: report.hypotheses,
            speech_ms: report.speech_ms,
            segments: report.segments,
            stopped_early: report.stopped_early,
        }
    }
}

/// One synchronization run, stoppable from another thread.
pub struct Synchronizer {
    options: SyncOptions,
    pipeline: Pipeline,
}

impl Synchronizer {
    pub fn new(options: SyncOptions, recognizer: Arc<dyn Recognizer>) -> Self {
        let pipeline = Pipeline::new(options.pipeline.clone(), recognizer);
        Self { options, pipeline }
    }

    /// Triggering this ends listening early; the run still estimates from
    /// what it has heard so far.
    pub fn stop_signal(&self) -> StopSignal {
        self.pipeline.stop_signal()
    }

    /// Runs to completion.
    ///
    /// The subtitle file is parsed before any audio is decoded, and a shift
    /// that would move a line before zero fails before anything is written.
    pub fn run(self) -> Result<SyncOutcome> {
        let options = self.options;
        let lines = subtitle::read_file(&options.subtitles)?;
        tracing::info!(
            path = %options.subtitles.display(),
            lines = lines.len(),
            "subtitles loaded"
        );

        let source = open_source(&options.video, &options.source)?;
        let lines = Arc::new(lines);
        let report = self.pipeline.run(source, lines.clone())?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            match serde_json::to_string(&report.candidates) {
                Ok(json) => tracing::debug!(candidates = %json, "match candidates"),
                Err(e) => tracing::debug!(error = %e, "could not serialize candidates"),
            }
        }
        tracing::info!(matches = report.candidates.len(), "alignment finished");

        let Some(estimate) = estimate_shift(&report.candidates) else {
            tracing::warn!("no phrase matched any subtitle line");
            return Ok(SyncOutcome::NoMatch { report });
        };

        let shifted = subtitle::shift_lines(&lines, estimate.shift_ms)?;
        let output = options.output_path();
        tracing::info!(
            shift_ms = estimate.shift_ms,
            output = %output.display(),
            "applying shift"
        );

        if options.dry_run {
            return Ok(SyncOutcome::DryRun {
                estimate,
                output,
                report,
            });
        }

        subtitle::write_file(&output, &shifted)?;
        Ok(SyncOutcome::Synced {
            estimate,
            output,
            report,
        })
    }
}

/// Runs one synchronization without external stop control.
pub fn synchronize(options: SyncOptions, recognizer: Arc<dyn Recognizer>) -> Result<SyncOutcome> {
    Synchronizer::new(options, recognizer).run()
}

/// Loads the configured recognizer model.
pub fn build_recognizer(config: &Config) -> Result<Arc<dyn Recognizer>> {
    let model_path = config
        .recognizer
        .model_path
        .clone()
        .ok_or_else(|| SyncError::ConfigInvalidValue {
            key: "recognizer.model_path".to_string(),
            message: "no model configured (use --model or AUTOSUBSYNC_MODEL)".to_string(),
        })?;
    let recognizer = WhisperRecognizer::new(WhisperConfig {
        model_path,
        threads: config.recognizer.threads,
    })?;
    Ok(Arc::new(recognizer))
}
