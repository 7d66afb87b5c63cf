//! Per-segment recognition worker.
//!
//! A worker owns one recognition session on its own thread. PCM arrives over
//! a bounded input channel and hypotheses leave over a bounded output channel,
//! so a slow session pushes back on whoever writes to it. Closing the input
//! (finalizing) lets the session finish and drain; destroying cancels it.

use crate::error::{Result, SyncError};
use crate::pipeline::types::Hypothesis;
use crate::stt::recognizer::{RecognitionSession, Transcript};
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// Identifies a worker within one router run.
pub type WorkerId = u64;

/// A failure reported by a worker thread.
#[derive(Debug)]
pub struct WorkerFailure {
    pub worker: WorkerId,
    pub error: SyncError,
}

/// Handle to one recognition worker.
pub struct RecognitionWorker {
    id: WorkerId,
    segment_start_ms: u64,
    input: Option<Sender<Vec<u8>>>,
    output: Receiver<Hypothesis>,
    cancelled: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RecognitionWorker {
    /// Starts a worker driving `session` for the segment at `segment_start_ms`.
    ///
    /// Failures are sent on `failures` before the worker's output closes.
    pub fn spawn(
        id: WorkerId,
        session: Box<dyn RecognitionSession>,
        segment_start_ms: u64,
        buffer: usize,
        failures: Sender<WorkerFailure>,
    ) -> Result<Self> {
        let (input_tx, input_rx) = bounded(buffer);
        let (output_tx, output_rx) = bounded(buffer);
        let cancelled = Arc::new(AtomicBool::new(false));

        let thread_cancelled = cancelled.clone();
        let handle = thread::Builder::new()
            .name(format!("recognition-{id}"))
            .spawn(move || {
                run_worker(
                    id,
                    session,
                    segment_start_ms,
                    input_rx,
                    output_tx,
                    failures,
                    thread_cancelled,
                );
            })?;

        tracing::debug!(worker = id, segment_start_ms, "recognition worker started");
        Ok(Self {
            id,
            segment_start_ms,
            input: Some(input_tx),
            output: output_rx,
            cancelled,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn segment_start_ms(&self) -> u64 {
        self.segment_start_ms
    }

    /// Input sender while the worker still accepts audio.
    pub fn input(&self) -> Option<&Sender<Vec<u8>>> {
        self.input.as_ref()
    }

    pub fn output(&self) -> &Receiver<Hypothesis> {
        &self.output
    }

    /// Signals that no more audio will arrive; the session finishes and drains.
    pub fn finalize(&mut self) {
        if self.input.take().is_some() {
            tracing::debug!(worker = self.id, "recognition worker finalized");
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.input.is_none()
    }

    /// Waits for a worker whose output has closed.
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SyncError::Pipeline {
                message: format!("recognition worker {} panicked", self.id),
            }),
            None => Ok(()),
        }
    }

    /// Cancels the session without waiting for it.
    ///
    /// The thread is detached; a session blocked inside the recognizer
    /// exits once that call returns, without emitting anything further.
    pub fn destroy(self) {
        tracing::debug!(worker = self.id, "recognition worker destroyed");
        drop(self);
    }
}

impl Drop for RecognitionWorker {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

fn run_worker(
    id: WorkerId,
    mut session: Box<dyn RecognitionSession>,
    segment_start_ms: u64,
    input: Receiver<Vec<u8>>,
    output: Sender<Hypothesis>,
    failures: Sender<WorkerFailure>,
    cancelled: Arc<AtomicBool>,
) {
    let forward = |transcripts: Vec<Transcript>| -> bool {
        transcripts.into_iter().all(|transcript| {
            !cancelled.load(Ordering::SeqCst)
                && output
                    .send(Hypothesis::from_transcript(transcript, segment_start_ms))
                    .is_ok()
        })
    };

    let result = drive_session(session.as_mut(), &input, &cancelled, forward);

    if let Err(error) = result
        && !cancelled.load(Ordering::SeqCst)
    {
        tracing::debug!(worker = id, %error, "recognition worker failed");
        // Sent before the output closes so the router sees it first
        let _ = failures.send(WorkerFailure { worker: id, error });
    }

    drop(session);
    drop(output);
}

fn drive_session(
    session: &mut dyn RecognitionSession,
    input: &Receiver<Vec<u8>>,
    cancelled: &AtomicBool,
    forward: impl Fn(Vec<Transcript>) -> bool,
) -> Result<()> {
    for pcm in input.iter() {
        if cancelled.load(Ordering::SeqCst) {
            return Ok(());
        }
        if !forward(session.write(&pcm)?) {
            return Ok(());
        }
    }
    if cancelled.load(Ordering::SeqCst) {
        return Ok(());
    }
    forward(session.finish()?);
    Ok(())
}
