//! Command-line interface for autosubsync
//!
//! Provides argument parsing using clap derive macros.

use crate::config::Config;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Re-time subtitles to a video's spoken audio
#[derive(Parser, Debug)]
#[command(
    name = "autosubsync",
    version,
    about = "Re-time subtitles to a video's spoken audio",
    subcommand_negates_reqs = true,
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Video or audio file to listen to
    #[arg(required = true, value_name = "VIDEO")]
    pub video: Option<PathBuf>,

    /// SRT subtitle file to synchronize
    #[arg(required = true, value_name = "SUBTITLES")]
    pub subtitles: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress warnings (errors are still printed)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: progress, -vv: full diagnostics)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Where to start listening (default: 10m). Examples: 0, 90s, 10m
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub seek: Option<u64>,

    /// Recognized speech to collect before stopping (default: 60s)
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub duration: Option<u64>,

    /// Decode at most this much media after the seek position
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_secs)]
    pub decode_limit: Option<u64>,

    /// Minimum similarity for a phrase to match a subtitle line, in (0, 1]
    #[arg(long, value_name = "RATIO")]
    pub threshold: Option<f64>,

    /// Minimum number of words in a match
    #[arg(long, value_name = "COUNT")]
    pub min_words: Option<usize>,

    /// Leading words that may be skipped when aligning a phrase
    #[arg(long, value_name = "COUNT")]
    pub max_shift: Option<usize>,

    /// Path to the recognizer model file
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Language code for recognition. Examples: en, de, es, fr
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,

    /// Recognize the decoded audio as one segment instead of splitting at pauses
    #[arg(long)]
    pub no_vad: bool,

    /// Replace the subtitle file instead of writing a new one
    #[arg(long)]
    pub overwrite: bool,

    /// Postfix for the output file name (default: synced)
    #[arg(long, value_name = "POSTFIX", conflicts_with = "overwrite")]
    pub postfix: Option<String>,

    /// Compute the shift without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print the shift estimate as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

/// Parse a duration string into seconds.
///
/// Supports any duration format accepted by `humantime`: bare numbers (seconds),
/// single-unit (`30s`, `5m`, `2h`), and compound (`1h30m`, `2m30s`).
fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    // Bare number → seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }
    humantime::parse_duration(s)
        .map(|d| d.as_secs())
        .map_err(|e| e.to_string())
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

impl Cli {
    /// Layers command-line overrides on top of `config`.
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(seek) = self.seek {
            config.sync.seek_secs = seek;
        }
        if let Some(duration) = self.duration {
            config.sync.max_speech_secs = duration;
        }
        if let Some(limit) = self.decode_limit {
            config.sync.decode_limit_secs = Some(limit);
        }
        if let Some(threshold) = self.threshold {
            config.sync.match_threshold = threshold;
        }
        if let Some(min_words) = self.min_words {
            config.sync.min_word_match_count = min_words;
        }
        if let Some(max_shift) = self.max_shift {
            config.sync.max_word_shift = Some(max_shift);
        }
        if let Some(model) = &self.model {
            config.recognizer.model_path = Some(model.clone());
        }
        if let Some(language) = &self.language {
            config.recognizer.language = language.clone();
        }
        if let Some(postfix) = &self.postfix {
            config.sync.postfix = postfix.clone();
        }
        if self.no_vad {
            config.vad.enabled = false;
        }
    }
}
