//! Segment router: multiplexes one audio stream over per-segment workers.
//!
//! For every voiced segment the router opens one recognition session, feeds
//! it the segment's audio and forwards its hypotheses downstream in segment
//! order. Only one worker accepts audio at a time; finalized workers keep
//! draining in the background until their output closes.
//!
//! The run loop is a single `Select` over:
//! - the stop signal and the shared worker failure channel,
//! - upstream events, only while no write is pending,
//! - the pending write into the current worker,
//! - the pending hypothesis towards downstream,
//! - the front worker's output, only while nothing is pending downstream.
//!
//! Holding at most one item in each direction keeps memory bounded and lets
//! backpressure flow from the aligner back to the decoder. Reading only from
//! the front (oldest) worker preserves segment order; later workers buffer in
//! their own bounded channels until they reach the front.

use crate::error::{Result, SyncError};
use crate::pipeline::stop::StopSignal;
use crate::pipeline::types::{Hypothesis, SegmentEvent};
use crate::pipeline::worker::{RecognitionWorker, WorkerFailure, WorkerId};
use crate::stt::recognizer::{Recognizer, SessionConfig};
use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, unbounded};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Router settings.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Configuration for every recognition session.
    pub session: SessionConfig,
    /// Capacity of each worker's input and output channels.
    pub worker_buffer: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            worker_buffer: crate::defaults::WORKER_BUFFER,
        }
    }
}

/// Observable router state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterState {
    /// No workers alive.
    Idle,
    /// A worker is accepting audio.
    Active(WorkerId),
    /// No worker accepts audio; the given (oldest) worker is still draining.
    Draining(WorkerId),
}

/// Counters collected over one router run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub segments: u64,
    pub hypotheses: u64,
    pub dropped_chunks: u64,
}

enum Step {
    Stopped,
    Failure(WorkerFailure),
    Upstream(Option<SegmentEvent>),
    Written(bool),
    Sent(bool),
    WorkerOutput(Option<Hypothesis>),
}

/// Routes segment events to recognition workers.
pub struct SegmentRouter {
    recognizer: Arc<dyn Recognizer>,
    config: RouterConfig,
    workers: VecDeque<RecognitionWorker>,
    current: Option<WorkerId>,
    next_id: WorkerId,
    failure_tx: Sender<WorkerFailure>,
    failure_rx: Receiver<WorkerFailure>,
    stats: RouterStats,
}

impl SegmentRouter {
    pub fn new(recognizer: Arc<dyn Recognizer>, config: RouterConfig) -> Self {
        // Holds at most one failure per live worker
        let (failure_tx, failure_rx) = unbounded();
        Self {
            recognizer,
            config,
            workers: VecDeque::new(),
            current: None,
            next_id: 1,
            failure_tx,
            failure_rx,
            stats: RouterStats::default(),
        }
    }

    pub fn state(&self) -> RouterState {
        match (self.current, self.workers.front()) {
            (Some(id), _) => RouterState::Active(id),
            (None, Some(front)) => RouterState::Draining(front.id()),
            (None, None) => RouterState::Idle,
        }
    }

    pub fn stats(&self) -> RouterStats {
        self.stats
    }

    /// Runs the router on a dedicated thread.
    pub fn spawn(
        self,
        input: Receiver<SegmentEvent>,
        output: Sender<Hypothesis>,
        stop: StopSignal,
    ) -> Result<JoinHandle<Result<RouterStats>>> {
        let handle = thread::Builder::new()
            .name("segment-router".to_string())
            .spawn(move || self.run(input, output, stop))?;
        Ok(handle)
    }

    /// Routes events until upstream ends and every worker has drained, the
    /// stop signal fires, or a worker fails.
    ///
    /// The output closes when this returns. On failure every worker is
    /// destroyed and the worker's error is returned.
    pub fn run(
        mut self,
        input: Receiver<SegmentEvent>,
        output: Sender<Hypothesis>,
        stop: StopSignal,
    ) -> Result<RouterStats> {
        let result = self.route(&input, &output, &stop);
        if result.is_err() || stop.is_stopped() {
            self.destroy_all();
        }
        tracing::debug!(stats = ?self.stats, ok = result.is_ok(), "segment router finished");
        result.map(|()| self.stats)
    }

    fn route(
        &mut self,
        input: &Receiver<SegmentEvent>,
        output: &Sender<Hypothesis>,
        stop: &StopSignal,
    ) -> Result<()> {
        let mut upstream_open = true;
        let mut pending_write: Option<Vec<u8>> = None;
        let mut pending_end = false;
        let mut outbound: Option<Hypothesis> = None;

        loop {
            if !upstream_open && self.workers.is_empty() && outbound.is_none() {
                break;
            }

            let step = self.select_step(
                input,
                output,
                stop,
                upstream_open && pending_write.is_none(),
                &mut pending_write,
                &mut outbound,
            );

            match step {
                Step::Stopped => return Ok(()),
                Step::Failure(failure) => return Err(self.fail(failure)),
                Step::Upstream(Some(event)) => {
                    if event.start {
                        self.begin_segment(event.stream_time_ms)?;
                    }
                    if self.current.is_some() && !event.chunk.is_empty() {
                        pending_write = Some(event.chunk.data);
                    } else if self.current.is_none() {
                        self.stats.dropped_chunks += 1;
                    }
                    if event.end {
                        if pending_write.is_some() {
                            pending_end = true;
                        } else {
                            self.end_segment();
                        }
                    }
                }
                Step::Upstream(None) => {
                    upstream_open = false;
                    if let Some(id) = self.current.take() {
                        self.finalize(id);
                    }
                    tracing::debug!(state = ?self.state(), "upstream ended");
                }
                Step::Written(true) => {
                    if std::mem::take(&mut pending_end) {
                        self.end_segment();
                    }
                }
                Step::Written(false) => return Err(self.worker_gone()),
                Step::Sent(true) => self.stats.hypotheses += 1,
                Step::Sent(false) => {
                    tracing::debug!("downstream closed, stopping router");
                    self.destroy_all();
                    return Ok(());
                }
                Step::WorkerOutput(Some(hypothesis)) => outbound = Some(hypothesis),
                Step::WorkerOutput(None) => {
                    // A worker that failed reports before its output closes
                    if let Ok(failure) = self.failure_rx.try_recv() {
                        return Err(self.fail(failure));
                    }
                    if let Some(worker) = self.workers.pop_front() {
                        let id = worker.id();
                        if self.current == Some(id) {
                            self.current = None;
                        }
                        worker.join()?;
                        tracing::debug!(
                            worker = id,
                            state = ?self.state(),
                            "recognition worker drained"
                        );
                    }
                }
            }
        }

        match self.failure_rx.try_recv() {
            Ok(failure) => Err(self.fail(failure)),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(()),
        }
    }

    fn select_step(
        &self,
        input: &Receiver<SegmentEvent>,
        output: &Sender<Hypothesis>,
        stop: &StopSignal,
        read_upstream: bool,
        pending_write: &mut Option<Vec<u8>>,
        outbound: &mut Option<Hypothesis>,
    ) -> Step {
        let current_input = self
            .current
            .and_then(|id| self.worker(id))
            .and_then(RecognitionWorker::input);
        let front_output = self.workers.front().map(RecognitionWorker::output);

        let mut sel = Select::new();
        let stop_index = sel.recv(stop.receiver());
        let failure_index = sel.recv(&self.failure_rx);
        let input_index = read_upstream.then(|| sel.recv(input));
        let write_index = match current_input {
            Some(sender) if pending_write.is_some() => Some(sel.send(sender)),
            _ => None,
        };
        let send_index = outbound.is_some().then(|| sel.send(output));
        let front_index = match front_output {
            Some(receiver) if outbound.is_none() => Some(sel.recv(receiver)),
            _ => None,
        };

        let op = sel.select();
        let index = op.index();

        if index == stop_index {
            let _ = op.recv(stop.receiver());
            Step::Stopped
        } else if index == failure_index {
            match op.recv(&self.failure_rx) {
                Ok(failure) => Step::Failure(failure),
                // The router holds a sender, so this cannot disconnect
                Err(_) => Step::Stopped,
            }
        } else if Some(index) == input_index {
            Step::Upstream(op.recv(input).ok())
        } else if Some(index) == write_index {
            match (pending_write.take(), current_input) {
                (Some(pcm), Some(sender)) => Step::Written(op.send(sender, pcm).is_ok()),
                _ => Step::Written(false),
            }
        } else if Some(index) == send_index {
            match outbound.take() {
                Some(hypothesis) => Step::Sent(op.send(output, hypothesis).is_ok()),
                None => Step::Sent(false),
            }
        } else {
            match (front_index, front_output) {
                (Some(_), Some(receiver)) => Step::WorkerOutput(op.recv(receiver).ok()),
                _ => Step::WorkerOutput(None),
            }
        }
    }

    fn worker(&self, id: WorkerId) -> Option<&RecognitionWorker> {
        self.workers.iter().find(|w| w.id() == id)
    }

    /// Finalizes the current worker (if any) and starts a new one.
    fn begin_segment(&mut self, segment_start_ms: u64) -> Result<()> {
        if let Some(id) = self.current.take() {
            self.finalize(id);
        }

        let session = self.recognizer.open_session(&self.config.session)?;
        let id = self.next_id;
        self.next_id += 1;
        let worker = RecognitionWorker::spawn(
            id,
            session,
            segment_start_ms,
            self.config.worker_buffer,
            self.failure_tx.clone(),
        )?;
        self.workers.push_back(worker);
        self.current = Some(id);
        self.stats.segments += 1;
        tracing::debug!(worker = id, segment_start_ms, state = ?self.state(), "segment started");
        Ok(())
    }

    /// Finalizes the current worker and clears the current pointer.
    fn end_segment(&mut self) {
        if let Some(id) = self.current.take() {
            self.finalize(id);
            tracing::debug!(worker = id, state = ?self.state(), "segment ended");
        }
    }

    fn finalize(&mut self, id: WorkerId) {
        if let Some(worker) = self.workers.iter_mut().find(|w| w.id() == id) {
            worker.finalize();
        }
    }

    fn destroy_all(&mut self) {
        self.current = None;
        for worker in self.workers.drain(..) {
            worker.destroy();
        }
    }

    fn fail(&mut self, failure: WorkerFailure) -> SyncError {
        tracing::debug!(
            worker = failure.worker,
            error = %failure.error,
            "recognition worker failed"
        );
        self.destroy_all();
        failure.error
    }

    /// The current worker stopped accepting audio before it was finalized.
    fn worker_gone(&mut self) -> SyncError {
        match self.failure_rx.try_recv() {
            Ok(failure) => self.fail(failure),
            Err(_) => {
                self.destroy_all();
                SyncError::Pipeline {
                    message: "recognition worker exited unexpectedly".to_string(),
                }
            }
        }
    }
}
