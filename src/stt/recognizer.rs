use crate::defaults;
use crate::error::{Result, SyncError};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A recognized word with offsets relative to the start of its segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl WordTiming {
    pub fn new(word: &str, start_ms: u64, end_ms: u64) -> Self {
        Self {
            word: word.to_string(),
            start_ms,
            end_ms,
        }
    }
}

/// One transcript result produced by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    pub text: String,
    pub words: Vec<WordTiming>,
}

impl Transcript {
    pub fn new(text: &str, words: Vec<WordTiming>) -> Self {
        Self {
            text: text.to_string(),
            words,
        }
    }
}

/// Per-segment session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub sample_rate: u32,
    pub language: String,
    pub word_time_offsets: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            word_time_offsets: true,
        }
    }
}

/// A duplex recognition session covering exactly one speech segment.
///
/// Dropping a session destroys it; no further results are produced.
pub trait RecognitionSession: Send {
    /// Accepts s16le mono PCM. May return results that became available.
    fn write(&mut self, pcm: &[u8]) -> Result<Vec<Transcript>>;

    /// Signals end of input and returns the remaining results.
    fn finish(&mut self) -> Result<Vec<Transcript>>;
}

/// Factory for recognition sessions.
///
/// This trait allows swapping implementations (real recognizer vs mock).
pub trait Recognizer: Send + Sync {
    fn open_session(&self, config: &SessionConfig) -> Result<Box<dyn RecognitionSession>>;

    /// Name of the backend or loaded model.
    fn name(&self) -> &str;
}

impl<T: Recognizer> Recognizer for Arc<T> {
    fn open_session(&self, config: &SessionConfig) -> Result<Box<dyn RecognitionSession>> {
        (**self).open_session(config)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Behaviour of one scripted mock session.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
    transcripts: Vec<Transcript>,
    emit_on_first_write: bool,
    fail_on_open: bool,
    fail_on_write: bool,
    fail_on_finish: bool,
    write_delay: Duration,
    finish_delay: Duration,
}

impl SessionScript {
    /// Session that returns `transcripts` when finished.
    pub fn returning(transcripts: Vec<Transcript>) -> Self {
        Self {
            transcripts,
            ..Default::default()
        }
    }

    /// Emit the transcripts on the first write instead of on finish.
    pub fn emitting_on_first_write(mut self) -> Self {
        self.emit_on_first_write = true;
        self
    }

    pub fn failing_on_open(mut self) -> Self {
        self.fail_on_open = true;
        self
    }

    pub fn failing_on_write(mut self) -> Self {
        self.fail_on_write = true;
        self
    }

    pub fn failing_on_finish(mut self) -> Self {
        self.fail_on_finish = true;
        self
    }

    /// Delay before every `write` returns, simulating a session that cannot keep up.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Delay before `finish` returns, simulating a slow remote service.
    pub fn with_finish_delay(mut self, delay: Duration) -> Self {
        self.finish_delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct MockCounters {
    opened: AtomicUsize,
    finished: AtomicUsize,
    closed: AtomicUsize,
    bytes_written: AtomicU64,
}

/// Mock recognizer for testing.
///
/// Sessions follow the queued scripts in open order, then the default script.
#[derive(Debug)]
pub struct MockRecognizer {
    scripts: Mutex<VecDeque<SessionScript>>,
    default_script: SessionScript,
    counters: Arc<MockCounters>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            default_script: SessionScript::default(),
            counters: Arc::new(MockCounters::default()),
        }
    }

    /// Queue a script for the next session to be opened.
    pub fn with_session(self, script: SessionScript) -> Self {
        self.scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(script);
        self
    }

    /// Script used once the queue is exhausted.
    pub fn with_default_session(mut self, script: SessionScript) -> Self {
        self.default_script = script;
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_finished(&self) -> usize {
        self.counters.finished.load(Ordering::SeqCst)
    }

    /// Sessions that have been dropped (finished or destroyed).
    pub fn sessions_closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn bytes_written(&self) -> u64 {
        self.counters.bytes_written.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for MockRecognizer {
    fn open_session(&self, _config: &SessionConfig) -> Result<Box<dyn RecognitionSession>> {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.default_script.clone());

        if script.fail_on_open {
            return Err(SyncError::Recognition {
                message: "mock session refused".to_string(),
            });
        }

        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            script,
            emitted: false,
            counters: self.counters.clone(),
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

struct MockSession {
    script: SessionScript,
    emitted: bool,
    counters: Arc<MockCounters>,
}

impl MockSession {
    fn take_transcripts(&mut self) -> Vec<Transcript> {
        if self.emitted {
            return Vec::new();
        }
        self.emitted = true;
        std::mem::take(&mut self.script.transcripts)
    }
}

impl RecognitionSession for MockSession {
    fn write(&mut self, pcm: &[u8]) -> Result<Vec<Transcript>> {
        if !self.script.write_delay.is_zero() {
            thread::sleep(self.script.write_delay);
        }
        if self.script.fail_on_write {
            return Err(SyncError::Recognition {
                message: "mock transport failure".to_string(),
            });
        }
        self.counters
            .bytes_written
            .fetch_add(pcm.len() as u64, Ordering::SeqCst);
        if self.script.emit_on_first_write {
            return Ok(self.take_transcripts());
        }
        Ok(Vec::new())
    }

    fn finish(&mut self) -> Result<Vec<Transcript>> {
        if !self.script.finish_delay.is_zero() {
            thread::sleep(self.script.finish_delay);
        }
        if self.script.fail_on_finish {
            return Err(SyncError::Recognition {
                message: "mock recognition failure".to_string(),
            });
        }
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        Ok(self.take_transcripts())
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}
