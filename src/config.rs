use crate::audio::vad::VadConfig;
use crate::defaults;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub vad: VadSection,
    pub recognizer: RecognizerConfig,
    pub sync: SyncConfig,
    pub pipeline: PipelineSection,
}

/// Audio decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub chunk_ms: u32,
    /// Transcoder binary name or path
    pub ffmpeg: String,
}

/// Voice activity detection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VadSection {
    /// Split the audio at pauses; when off, one session hears everything
    pub enabled: bool,
    pub speech_threshold: f32,
    pub debounce_ms: u32,
}

/// Speech recognizer configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognizerConfig {
    pub model_path: Option<PathBuf>,
    pub language: String,
    pub threads: Option<usize>,
}

/// Matching and output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    pub seek_secs: u64,
    pub max_speech_secs: u64,
    pub decode_limit_secs: Option<u64>,
    pub match_threshold: f64,
    pub min_word_match_count: usize,
    /// Unbounded when absent
    pub max_word_shift: Option<usize>,
    pub postfix: String,
}

/// Channel capacities between pipeline stages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSection {
    pub chunk_buffer: usize,
    pub segment_buffer: usize,
    pub worker_buffer: usize,
    pub hypothesis_buffer: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            chunk_ms: defaults::CHUNK_MS,
            ffmpeg: defaults::FFMPEG_BINARY.to_string(),
        }
    }
}

impl Default for VadSection {
    fn default() -> Self {
        Self {
            enabled: true,
            speech_threshold: defaults::VAD_THRESHOLD,
            debounce_ms: defaults::VAD_DEBOUNCE_MS,
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: None,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            seek_secs: defaults::SEEK_SECS,
            max_speech_secs: defaults::MAX_SPEECH_SECS,
            decode_limit_secs: None,
            match_threshold: defaults::MATCH_THRESHOLD,
            min_word_match_count: defaults::MIN_WORD_MATCH_COUNT,
            max_word_shift: Some(defaults::MAX_WORD_SHIFT),
            postfix: defaults::OUTPUT_POSTFIX.to_string(),
        }
    }
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            chunk_buffer: defaults::CHUNK_BUFFER,
            segment_buffer: defaults::SEGMENT_BUFFER,
            worker_buffer: defaults::WORKER_BUFFER,
            hypothesis_buffer: defaults::HYPOTHESIS_BUFFER,
        }
    }
}

impl From<&VadSection> for VadConfig {
    fn from(section: &VadSection) -> Self {
        VadConfig {
            speech_threshold: section.speech_threshold,
            debounce_ms: section.debounce_ms,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only a missing file yields defaults; invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(SyncError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AUTOSUBSYNC_MODEL → recognizer.model_path
    /// - AUTOSUBSYNC_LANGUAGE → recognizer.language
    /// - AUTOSUBSYNC_FFMPEG → audio.ffmpeg
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("AUTOSUBSYNC_MODEL")
            && !model.is_empty()
        {
            self.recognizer.model_path = Some(PathBuf::from(model));
        }

        if let Ok(language) = std::env::var("AUTOSUBSYNC_LANGUAGE")
            && !language.is_empty()
        {
            self.recognizer.language = language;
        }

        if let Ok(ffmpeg) = std::env::var("AUTOSUBSYNC_FFMPEG")
            && !ffmpeg.is_empty()
        {
            self.audio.ffmpeg = ffmpeg;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/autosubsync/config.toml on Linux, or `None` when the
    /// platform has no config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("autosubsync").join("config.toml"))
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.sync.match_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(invalid("sync.match_threshold", "must be in (0, 1]"));
        }
        if self.sync.min_word_match_count < 1 {
            return Err(invalid("sync.min_word_match_count", "must be at least 1"));
        }
        if self.audio.sample_rate == 0 {
            return Err(invalid("audio.sample_rate", "must be positive"));
        }
        if self.audio.chunk_ms == 0 {
            return Err(invalid("audio.chunk_ms", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.vad.speech_threshold) {
            return Err(invalid("vad.speech_threshold", "must be in [0, 1]"));
        }

        let capacities = [
            ("pipeline.chunk_buffer", self.pipeline.chunk_buffer),
            ("pipeline.segment_buffer", self.pipeline.segment_buffer),
            ("pipeline.worker_buffer", self.pipeline.worker_buffer),
            ("pipeline.hypothesis_buffer", self.pipeline.hypothesis_buffer),
        ];
        if let Some((key, _)) = capacities.iter().find(|(_, capacity)| *capacity == 0) {
            return Err(invalid(key, "must be positive"));
        }

        Ok(())
    }
}

fn invalid(key: &str, message: &str) -> SyncError {
    SyncError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_autosubsync_env() {
        remove_env("AUTOSUBSYNC_MODEL");
        remove_env("AUTOSUBSYNC_LANGUAGE");
        remove_env("AUTOSUBSYNC_FFMPEG");
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = Config::default();

        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(config.audio.chunk_ms, 100);
        assert_eq!(config.audio.ffmpeg, "ffmpeg");

        assert_eq!(config.vad.speech_threshold, 0.02);
        assert_eq!(config.vad.debounce_ms, 1000);

        assert_eq!(config.recognizer.model_path, None);
        assert_eq!(config.recognizer.language, "en");

        assert_eq!(config.sync.seek_secs, 600);
        assert_eq!(config.sync.max_speech_secs, 60);
        assert_eq!(config.sync.decode_limit_secs, None);
        assert_eq!(config.sync.match_threshold, 0.80);
        assert_eq!(config.sync.min_word_match_count, 4);
        assert_eq!(config.sync.max_word_shift, Some(8));
        assert_eq!(config.sync.postfix, "synced");

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let file = write_config(
            r#"
            [audio]
            ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

            [recognizer]
            model_path = "/models/ggml-small.bin"
            language = "de"
            threads = 4

            [sync]
            seek_secs = 0
            match_threshold = 0.9
            postfix = "fixed"
            "#,
        );

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.audio.ffmpeg, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.audio.sample_rate, 16000);
        assert_eq!(
            config.recognizer.model_path,
            Some(PathBuf::from("/models/ggml-small.bin"))
        );
        assert_eq!(config.recognizer.language, "de");
        assert_eq!(config.recognizer.threads, Some(4));
        assert_eq!(config.sync.seek_secs, 0);
        assert_eq!(config.sync.match_threshold, 0.9);
        assert_eq!(config.sync.postfix, "fixed");
        // Untouched fields keep their defaults
        assert_eq!(config.sync.min_word_match_count, 4);
        assert_eq!(config.pipeline, PipelineSection::default());
    }

    #[test]
    fn test_vad_can_be_disabled() {
        let file = write_config("[vad]\nenabled = false\n");
        let config = Config::load(file.path()).unwrap();
        assert!(!config.vad.enabled);
        assert_eq!(config.vad.debounce_ms, 1000);
        assert!(Config::default().vad.enabled);
    }

    #[test]
    fn test_empty_file_is_default() {
        let file = write_config("");
        assert_eq!(Config::load(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_toml_returns_config_error() {
        let file = write_config("[sync\nseek_secs = ");
        let result = Config::load(file.path());
        assert!(matches!(result, Err(SyncError::Config(_))));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/autosubsync.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_invalid_toml_is_error() {
        let file = write_config("sync = = 1");
        assert!(Config::load_or_default(file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_autosubsync_env();

        set_env("AUTOSUBSYNC_MODEL", "/tmp/model.bin");
        set_env("AUTOSUBSYNC_LANGUAGE", "fr");
        set_env("AUTOSUBSYNC_FFMPEG", "/usr/local/bin/ffmpeg");

        let config = Config::default().with_env_overrides();
        clear_autosubsync_env();

        assert_eq!(config.recognizer.model_path, Some(PathBuf::from("/tmp/model.bin")));
        assert_eq!(config.recognizer.language, "fr");
        assert_eq!(config.audio.ffmpeg, "/usr/local/bin/ffmpeg");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        clear_autosubsync_env();

        set_env("AUTOSUBSYNC_LANGUAGE", "");
        let config = Config::default().with_env_overrides();
        clear_autosubsync_env();

        assert_eq!(config.recognizer.language, "en");
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        if let Some(path) = Config::default_path() {
            assert!(path.ends_with("autosubsync/config.toml"));
        }
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        for threshold in [0.0, -0.5, 1.01] {
            let mut config = Config::default();
            config.sync.match_threshold = threshold;
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("sync.match_threshold"), "{err}");
        }

        let mut config = Config::default();
        config.sync.match_threshold = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_word_count() {
        let mut config = Config::default();
        config.sync.min_word_match_count = 0;
        assert!(matches!(
            config.validate(),
            Err(SyncError::ConfigInvalidValue { key, .. }) if key == "sync.min_word_match_count"
        ));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = Config::default();
        config.pipeline.worker_buffer = 0;
        assert!(matches!(
            config.validate(),
            Err(SyncError::ConfigInvalidValue { key, .. }) if key == "pipeline.worker_buffer"
        ));
    }

    #[test]
    fn test_vad_section_converts() {
        let section = VadSection {
            enabled: true,
            speech_threshold: 0.1,
            debounce_ms: 250,
        };
        let vad = VadConfig::from(&section);
        assert_eq!(vad.speech_threshold, 0.1);
        assert_eq!(vad.debounce_ms, 250);
    }

    #[test]
    fn test_serialize_round_trips() {
        let config = Config::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
