//! Whisper-based recognition sessions.
//!
//! Each session buffers the PCM of one speech segment and runs whisper.cpp on
//! it when the segment is finished. Word offsets come from whisper's token
//! timestamps with one word per output segment.
//!
//! # Feature Gate
//!
//! Real inference requires the `whisper` feature (and cmake):
//!
//! ```bash
//! cargo build --features whisper
//! ```

use crate::error::{Result, SyncError};
use crate::stt::recognizer::{RecognitionSession, Recognizer, SessionConfig};
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use crate::defaults;
#[cfg(feature = "whisper")]
use crate::stt::recognizer::{Transcript, WordTiming};
#[cfg(feature = "whisper")]
use std::sync::{Arc, Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for the Whisper recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Number of threads for inference (None = auto-detect)
    pub threads: Option<usize>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.en.bin"),
            threads: None,
        }
    }
}

fn model_name_from_path(config: &WhisperConfig) -> String {
    config
        .model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn check_model_exists(config: &WhisperConfig) -> Result<()> {
    if config.model_path.exists() {
        Ok(())
    } else {
        Err(SyncError::Recognition {
            message: format!(
                "Whisper model not found at {}",
                config.model_path.display()
            ),
        })
    }
}

/// Recognizer backed by a local Whisper model.
#[cfg(feature = "whisper")]
pub struct WhisperRecognizer {
    context: Arc<Mutex<WhisperContext>>,
    config: WhisperConfig,
    model_name: String,
}

/// Whisper recognizer placeholder (without whisper feature).
///
/// Sessions cannot be opened; enable the `whisper` feature for recognition.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperRecognizer {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperRecognizer")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

#[cfg(feature = "whisper")]
impl WhisperRecognizer {
    /// Loads the model.
    ///
    /// # Errors
    /// Returns `SyncError::Recognition` if the model file is missing or fails to load.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        check_model_exists(&config)?;
        let model_name = model_name_from_path(&config);

        let model_path = config
            .model_path
            .to_str()
            .ok_or_else(|| SyncError::Recognition {
                message: "Invalid UTF-8 in model path".to_string(),
            })?;
        let params = WhisperContextParameters::default();
        let context = WhisperContext::new_with_params(model_path, params).map_err(|e| {
            SyncError::Recognition {
                message: format!("Failed to load Whisper model: {}", e),
            }
        })?;

        Ok(Self {
            context: Arc::new(Mutex::new(context)),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperRecognizer {
    /// Validates the model path (stub implementation).
    pub fn new(config: WhisperConfig) -> Result<Self> {
        check_model_exists(&config)?;
        let model_name = model_name_from_path(&config);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl Recognizer for WhisperRecognizer {
    fn open_session(&self, config: &SessionConfig) -> Result<Box<dyn RecognitionSession>> {
        if config.sample_rate != defaults::SAMPLE_RATE {
            return Err(SyncError::Recognition {
                message: format!(
                    "Whisper expects {}Hz audio, got {}Hz",
                    defaults::SAMPLE_RATE,
                    config.sample_rate
                ),
            });
        }
        Ok(Box::new(WhisperSession {
            context: self.context.clone(),
            language: config.language.clone(),
            word_time_offsets: config.word_time_offsets,
            threads: self.config.threads,
            samples: Vec::new(),
            pending_byte: None,
        }))
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl Recognizer for WhisperRecognizer {
    fn open_session(&self, _config: &SessionConfig) -> Result<Box<dyn RecognitionSession>> {
        Err(SyncError::Recognition {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --release --features whisper\n",
                "If build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(feature = "whisper")]
struct WhisperSession {
    context: Arc<Mutex<WhisperContext>>,
    language: String,
    word_time_offsets: bool,
    threads: Option<usize>,
    samples: Vec<f32>,
    pending_byte: Option<u8>,
}

#[cfg(feature = "whisper")]
impl WhisperSession {
    fn run_inference(&self) -> Result<Transcript> {
        let context = self.context.lock().map_err(|e| SyncError::Recognition {
            message: format!("Failed to acquire context lock: {}", e),
        })?;
        let mut state = context.create_state().map_err(|e| SyncError::Recognition {
            message: format!("Failed to create Whisper state: {}", e),
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(&self.language));
        if let Some(threads) = self.threads {
            params.set_n_threads(threads as i32);
        }
        if self.word_time_offsets {
            // One word per output segment
            params.set_token_timestamps(true);
            params.set_split_on_word(true);
            params.set_max_len(1);
        }
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &self.samples)
            .map_err(|e| SyncError::Recognition {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut text = String::new();
        let mut words = Vec::new();
        for segment in state.as_iter() {
            let piece = segment.to_string();
            text.push_str(&piece);
            let word = piece.trim();
            if word.is_empty() {
                continue;
            }
            // Whisper timestamps are in centiseconds
            words.push(WordTiming::new(
                word,
                segment.start_timestamp().max(0) as u64 * 10,
                segment.end_timestamp().max(0) as u64 * 10,
            ));
        }

        Ok(Transcript {
            text: text.trim().to_string(),
            words,
        })
    }
}

#[cfg(feature = "whisper")]
impl RecognitionSession for WhisperSession {
    fn write(&mut self, pcm: &[u8]) -> Result<Vec<Transcript>> {
        let mut bytes = pcm.iter().copied();
        if let Some(low) = self.pending_byte.take() {
            match bytes.next() {
                Some(high) => self.samples.push(pcm_to_f32(low, high)),
                None => self.pending_byte = Some(low),
            }
        }
        let rest: Vec<u8> = bytes.collect();
        let mut pairs = rest.chunks_exact(2);
        self.samples
            .extend(pairs.by_ref().map(|pair| pcm_to_f32(pair[0], pair[1])));
        if let [odd] = pairs.remainder() {
            self.pending_byte = Some(*odd);
        }
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<Transcript>> {
        if self.samples.is_empty() {
            return Ok(Vec::new());
        }
        let transcript = self.run_inference()?;
        self.samples.clear();
        if transcript.text.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![transcript])
        }
    }
}

/// Converts one little-endian s16 sample to f32 in [-1.0, 1.0].
pub fn pcm_to_f32(low: u8, high: u8) -> f32 {
    i16::from_le_bytes([low, high]) as f32 / 32768.0
}
