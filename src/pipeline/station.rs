//! Core station abstraction and runner for the pipeline.

use crate::error::{Result, SyncError};
use crate::pipeline::error::{ErrorReporter, StationError};
use crate::pipeline::stop::StopSignal;
use crossbeam_channel::{Receiver, Sender, select};
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// A processing station in the pipeline.
///
/// Each station receives input, processes it, and produces output.
/// Stations run in their own threads and are connected by channels.
pub trait Station: Send + 'static {
    /// The input type this station receives.
    type Input: Send + 'static;
    /// The output type this station produces.
    type Output: Send + 'static;

    /// Processes a single input item.
    ///
    /// Returns:
    /// - `Ok(Some(output))` - Successfully processed and produced output
    /// - `Ok(None)` - Successfully processed but no output (e.g., filtered)
    /// - `Err(StationError)` - Processing failed
    fn process(
        &mut self,
        input: Self::Input,
    ) -> std::result::Result<Option<Self::Output>, StationError>;

    /// Returns the name of this station for logging and error reporting.
    fn name(&self) -> &'static str;

    /// Called when the station is shutting down.
    fn shutdown(&mut self) {}
}

/// Runs a station in a dedicated thread.
///
/// The station stops when its input closes, its output consumer goes away,
/// the stop signal fires, or it reports a fatal error. A fatal error is
/// recorded on the stop signal, which tears down every other stage.
pub struct StationRunner<S: Station> {
    handle: Option<JoinHandle<()>>,
    station_name: &'static str,
    _phantom: PhantomData<S>,
}

impl<S: Station> StationRunner<S> {
    /// Spawns a new station in a dedicated thread.
    pub fn spawn(
        mut station: S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
        stop: StopSignal,
    ) -> Self {
        let station_name = station.name();
        let spawn_stop = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("station-{station_name}"))
            .spawn(move || {
                Self::run_station(&mut station, input_rx, output_tx, error_reporter, stop);
            });

        match handle {
            Ok(handle) => Self {
                handle: Some(handle),
                station_name,
                _phantom: PhantomData,
            },
            Err(e) => {
                // Nothing will drain the channels; stop the rest of the pipeline
                spawn_stop.fail(SyncError::Pipeline {
                    message: format!("failed to spawn station '{station_name}': {e}"),
                });
                Self {
                    handle: None,
                    station_name,
                    _phantom: PhantomData,
                }
            }
        }
    }

    /// Main processing loop for the station.
    fn run_station(
        station: &mut S,
        input_rx: Receiver<S::Input>,
        output_tx: Sender<S::Output>,
        error_reporter: Arc<dyn ErrorReporter>,
        stop: StopSignal,
    ) {
        let station_name = station.name();

        loop {
            let input = select! {
                recv(input_rx) -> msg => match msg {
                    Ok(input) => input,
                    Err(_) => break,
                },
                recv(stop.receiver()) -> _ => break,
            };

            match station.process(input) {
                Ok(Some(output)) => {
                    // Consumers either drain or drop their receiver on stop
                    if output_tx.send(output).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(error @ StationError::Recoverable(_)) => {
                    error_reporter.report(station_name, &error);
                }
                Err(error @ StationError::Fatal(_)) => {
                    error_reporter.report(station_name, &error);
                    stop.fail(error.into_sync_error(station_name));
                    break;
                }
            }
        }

        station.shutdown();
        tracing::debug!(station = station_name, "station stopped");
    }

    /// Waits for the station thread to complete.
    pub fn join(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| SyncError::Pipeline {
                message: format!("Station '{}' thread panicked", self.station_name),
            }),
            None => Err(SyncError::Pipeline {
                message: format!("Station '{}' thread failed to start", self.station_name),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.station_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stop::StopReason;
    use crossbeam_channel::bounded;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct DoublerStation {
        shutdown_called: Arc<AtomicBool>,
    }

    impl Station for DoublerStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            Ok(Some(input * 2))
        }

        fn name(&self) -> &'static str {
            "Doubler"
        }

        fn shutdown(&mut self) {
            self.shutdown_called.store(true, Ordering::SeqCst);
        }
    }

    struct FilterStation;

    impl Station for FilterStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            if input % 2 == 0 { Ok(None) } else { Ok(Some(input)) }
        }

        fn name(&self) -> &'static str {
            "Filter"
        }
    }

    struct FailingStation {
        recoverable_on: i32,
        fatal_on: i32,
    }

    impl Station for FailingStation {
        type Input = i32;
        type Output = i32;

        fn process(&mut self, input: i32) -> std::result::Result<Option<i32>, StationError> {
            if input == self.recoverable_on {
                Err(StationError::Recoverable(format!("Failed on {}", input)))
            } else if input == self.fatal_on {
                Err(StationError::Fatal(format!("Broken on {}", input)))
            } else {
                Ok(Some(input))
            }
        }

        fn name(&self) -> &'static str {
            "Failing"
        }
    }

    #[derive(Default)]
    struct MockReporter {
        errors: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl ErrorReporter for MockReporter {
        fn report(&self, station: &str, error: &StationError) {
            let mut errors = self.errors.lock().unwrap();
            errors.push((station.to_string(), error.to_string()));
        }
    }

    fn collect(rx: Receiver<i32>) -> Vec<i32> {
        rx.iter().collect()
    }

    #[test]
    fn test_station_runner_basic_processing() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let station = DoublerStation {
            shutdown_called: shutdown_flag.clone(),
        };
        let runner = StationRunner::spawn(
            station,
            input_rx,
            output_tx,
            Arc::new(MockReporter::default()),
            StopSignal::new(),
        );
        assert_eq!(runner.name(), "Doubler");

        for i in 1..=3 {
            input_tx.send(i).unwrap();
        }
        drop(input_tx);

        assert_eq!(collect(output_rx), vec![2, 4, 6]);
        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_station_runner_filtering() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let runner = StationRunner::spawn(
            FilterStation,
            input_rx,
            output_tx,
            Arc::new(MockReporter::default()),
            StopSignal::new(),
        );

        for i in 1..=5 {
            input_tx.send(i).unwrap();
        }
        drop(input_tx);

        assert_eq!(collect(output_rx), vec![1, 3, 5]);
        runner.join().unwrap();
    }

    #[test]
    fn test_recoverable_error_is_reported_and_skipped() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let reporter = Arc::new(MockReporter::default());
        let errors = reporter.errors.clone();
        let stop = StopSignal::new();

        let station = FailingStation {
            recoverable_on: 2,
            fatal_on: -1,
        };
        let runner = StationRunner::spawn(station, input_rx, output_tx, reporter, stop.clone());

        for i in 1..=3 {
            input_tx.send(i).unwrap();
        }
        drop(input_tx);

        assert_eq!(collect(output_rx), vec![1, 3]);
        runner.join().unwrap();

        let reported = errors.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].0, "Failing");
        assert!(reported[0].1.contains("Failed on 2"));
        assert!(!stop.is_stopped());
    }

    #[test]
    fn test_fatal_error_fails_the_stop_signal() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let stop = StopSignal::new();

        let station = FailingStation {
            recoverable_on: -1,
            fatal_on: 2,
        };
        let runner = StationRunner::spawn(
            station,
            input_rx,
            output_tx,
            Arc::new(MockReporter::default()),
            stop.clone(),
        );

        input_tx.send(1).unwrap();
        input_tx.send(2).unwrap();
        input_tx.send(3).unwrap();

        assert_eq!(collect(output_rx), vec![1]);
        runner.join().unwrap();
        assert_eq!(stop.reason(), Some(StopReason::Failure));
        let error = stop.take_error().unwrap();
        assert!(error.to_string().contains("Failing: Broken on 2"));
    }

    #[test]
    fn test_stop_signal_ends_idle_station() {
        let (_input_tx, input_rx) = bounded::<i32>(10);
        let (output_tx, output_rx) = bounded(10);
        let stop = StopSignal::new();
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let runner = StationRunner::spawn(
            DoublerStation {
                shutdown_called: shutdown_flag.clone(),
            },
            input_rx,
            output_tx,
            Arc::new(MockReporter::default()),
            stop.clone(),
        );

        thread::sleep(Duration::from_millis(20));
        stop.trigger(StopReason::Interrupted);

        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
        assert!(output_rx.recv().is_err());
    }

    #[test]
    fn test_station_runner_output_channel_closed() {
        let (input_tx, input_rx) = bounded(10);
        let (output_tx, output_rx) = bounded(10);
        let shutdown_flag = Arc::new(AtomicBool::new(false));

        let runner = StationRunner::spawn(
            DoublerStation {
                shutdown_called: shutdown_flag.clone(),
            },
            input_rx,
            output_tx,
            Arc::new(MockReporter::default()),
            StopSignal::new(),
        );

        drop(output_rx);
        input_tx.send(1).unwrap();

        runner.join().unwrap();
        assert!(shutdown_flag.load(Ordering::SeqCst));
    }
}
