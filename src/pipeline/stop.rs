//! Pipeline-wide stop signal.
//!
//! Every stage selects on [`StopSignal::receiver`] next to its data channels.
//! Triggering drops the only sender, so the receiver reports disconnection to
//! every waiting select at once. The first trigger decides the reason; a
//! failure recorded with [`StopSignal::fail`] becomes the run's error.

use crate::error::SyncError;
use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::{Arc, Mutex};

/// Why the pipeline was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Recognized speech reached the configured maximum.
    SpeechLimit,
    /// The user interrupted the run.
    Interrupted,
    /// A stage failed.
    Failure,
}

#[derive(Debug, Default)]
struct StopState {
    reason: Option<StopReason>,
    error: Option<SyncError>,
}

#[derive(Debug)]
struct Inner {
    sender: Mutex<Option<Sender<()>>>,
    state: Mutex<StopState>,
}

/// Cloneable, select-able stop broadcast.
#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                sender: Mutex::new(Some(sender)),
                state: Mutex::new(StopState::default()),
            }),
            receiver,
        }
    }

    /// Stops the pipeline. Returns `true` if this call was the first trigger.
    pub fn trigger(&self, reason: StopReason) -> bool {
        self.stop(reason, None).is_ok()
    }

    /// Records `error` as the run's failure and stops the pipeline.
    ///
    /// Only the first trigger counts: errors arriving after a graceful stop
    /// are teardown noise and are logged, not kept.
    pub fn fail(&self, error: SyncError) {
        if let Err(Some(error)) = self.stop(StopReason::Failure, Some(error)) {
            tracing::debug!(%error, "error after pipeline stop ignored");
        }
    }

    /// The error is stored before any waiter can observe the stop. Hands the
    /// error back when the signal had already fired.
    fn stop(
        &self,
        reason: StopReason,
        error: Option<SyncError>,
    ) -> std::result::Result<(), Option<SyncError>> {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.reason.is_some() {
            return Err(error);
        }
        state.reason = Some(reason);
        state.error = error;
        drop(state);

        self.inner
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        tracing::debug!(?reason, "pipeline stop triggered");
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.reason().is_some()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .reason
    }

    /// Takes the recorded failure, if any.
    pub fn take_error(&self) -> Option<SyncError> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .error
            .take()
    }

    /// Becomes ready (disconnected) once the signal is triggered.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
