//! Single-slot background operation runner.
//!
//! At most one transformation runs at a time. Submitting hands the sequence
//! to a dedicated worker thread; the sequence comes back with the outcome, so
//! nothing on the interactive side can touch it while the operation runs.
//!
//! On completion the worker calls the completion sink first, then releases
//! the busy slot, then delivers the [`Outcome`] to the handle. A caller that
//! has received the outcome can therefore always submit again. A panic inside
//! an operation is reported as [`EngineError::WorkerPanicked`] and the
//! sequence still comes back.

use crate::catalog::{self, ApplyContext};
use crate::progress::{Progress, ProgressReporter, ProgressSink};
use crate::request::TransformationRequest;
use crate::{EngineConfig, EngineError, Result};
use flipbook_codec::ImageCodec;
use flipbook_core::{AffectedRange, FrameSequence};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Receives the result of every operation, on the worker thread
pub trait CompletionSink: Send + Sync {
    fn on_complete(&self, result: &Result<AffectedRange>);
}

/// What a finished operation hands back
#[derive(Debug)]
pub struct Outcome {
    /// The sequence, returned to the caller whatever the result
    pub sequence: FrameSequence,
    pub result: Result<AffectedRange>,
    /// Cancellation was requested while the operation ran
    pub cancelled: bool,
}

/// A refused submission, returning the sequence untouched
pub struct Rejected {
    pub error: EngineError,
    pub sequence: FrameSequence,
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .field("root", &self.sequence.root())
            .finish()
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for Rejected {}

/// Delivers progress to every sink in turn
struct FanOut(Vec<Arc<dyn ProgressSink>>);

impl ProgressSink for FanOut {
    fn on_progress(&self, progress: &Progress) {
        for sink in &self.0 {
            sink.on_progress(progress);
        }
    }
}

/// Clears the busy flag when the worker ends, even by panic
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type Job = (TransformationRequest, FrameSequence);

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

/// Runs transformation requests one at a time off the calling thread
pub struct OperationRunner {
    codec: Arc<dyn ImageCodec>,
    config: EngineConfig,
    busy: Arc<AtomicBool>,
    progress_sink: Option<Arc<dyn ProgressSink>>,
    completion_sink: Option<Arc<dyn CompletionSink>>,
}

impl OperationRunner {
    pub fn new(codec: Arc<dyn ImageCodec>, config: EngineConfig) -> Self {
        Self {
            codec,
            config,
            busy: Arc::new(AtomicBool::new(false)),
            progress_sink: None,
            completion_sink: None,
        }
    }

    /// Also forwards throttled progress to `sink`
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress_sink = Some(sink);
        self
    }

    /// Notifies `sink` when each operation completes
    pub fn with_completion_sink(mut self, sink: Arc<dyn CompletionSink>) -> Self {
        self.completion_sink = Some(sink);
        self
    }

    pub fn codec(&self) -> &dyn ImageCodec {
        self.codec.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Starts `request` on a worker thread.
    ///
    /// Fails without waiting when another operation is running, or when the
    /// request does not validate against `sequence`. Either way the sequence
    /// is handed back untouched inside [`Rejected`].
    pub fn submit(
        &self,
        request: TransformationRequest,
        sequence: FrameSequence,
    ) -> std::result::Result<OperationHandle, Rejected> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(operation = request.label(), "Rejected: runner busy");
            return Err(Rejected {
                error: EngineError::Busy,
                sequence,
            });
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        if let Err(error) = catalog::validate(&request, &sequence, self.codec.as_ref()) {
            tracing::warn!(operation = request.label(), %error, "Rejected");
            return Err(Rejected { error, sequence });
        }

        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (outcome_tx, outcome_rx) = mpsc::channel::<Outcome>();
        let (progress_tx, progress_rx) = mpsc::channel::<Progress>();
        let cancel = Arc::new(AtomicBool::new(false));

        let mut sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(progress_tx)];
        sinks.extend(self.progress_sink.clone());
        let progress_sink: Arc<dyn ProgressSink> = Arc::new(FanOut(sinks));

        let codec = Arc::clone(&self.codec);
        let config = self.config.clone();
        let completion_sink = self.completion_sink.clone();
        let worker_cancel = Arc::clone(&cancel);
        let label = request.label();

        let spawned = thread::Builder::new()
            .name("flipbook-operation".into())
            .spawn(move || {
                let guard = guard;
                let Ok((request, mut sequence)) = job_rx.recv() else {
                    return;
                };

                let mut progress = ProgressReporter::new(
                    request.label(),
                    0,
                    config.progress_interval,
                    progress_sink,
                );
                let mut ctx = ApplyContext {
                    codec: codec.as_ref(),
                    config: &config,
                    progress: &mut progress,
                    cancel: &worker_cancel,
                };
                let applied = panic::catch_unwind(AssertUnwindSafe(|| {
                    catalog::apply(request, &mut sequence, &mut ctx)
                }));
                let result = applied.unwrap_or_else(|payload| {
                    tracing::error!(reason = panic_message(payload.as_ref()), "Operation panicked");
                    Err(EngineError::WorkerPanicked)
                });
                let cancelled = worker_cancel.load(Ordering::Relaxed);

                match &result {
                    Ok(range) => tracing::info!(start = range.start, end = range.end, cancelled, "Operation finished"),
                    Err(error) => tracing::warn!(%error, "Operation failed"),
                }

                if let Some(sink) = &completion_sink {
                    sink.on_complete(&result);
                }
                drop(guard);

                // The handle may have been dropped; the caller gave up the sequence then
                let _ = outcome_tx.send(Outcome {
                    sequence,
                    result,
                    cancelled,
                });
            });

        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                return Err(Rejected {
                    error: EngineError::IoFailure(e),
                    sequence,
                })
            }
        };

        if let Err(mpsc::SendError((_, sequence))) = job_tx.send((request, sequence)) {
            let _ = worker.join();
            return Err(Rejected {
                error: EngineError::WorkerPanicked,
                sequence,
            });
        }

        tracing::debug!(operation = label, "Operation submitted");
        Ok(OperationHandle {
            label,
            outcome: outcome_rx,
            progress: progress_rx,
            cancel,
            worker: Some(worker),
        })
    }
}

/// Handle to a running operation.
///
/// Dropping the handle detaches the worker; its sequence is then lost to the
/// caller, though its files stay on disk.
#[derive(Debug)]
pub struct OperationHandle {
    label: &'static str,
    outcome: Receiver<Outcome>,
    progress: Receiver<Progress>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl OperationHandle {
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Asks the operation to stop before its next frame
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Progress reported since the last call
    pub fn progress(&self) -> Vec<Progress> {
        self.progress.try_iter().collect()
    }

    /// Returns the outcome if the operation has finished, without blocking
    pub fn try_wait(&mut self) -> Option<Result<Outcome>> {
        match self.outcome.try_recv() {
            Ok(outcome) => {
                self.join();
                Some(Ok(outcome))
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join();
                Some(Err(EngineError::WorkerPanicked))
            }
        }
    }

    /// Blocks until the operation finishes
    pub fn wait(mut self) -> Result<Outcome> {
        let outcome = self.outcome.recv().map_err(|_| EngineError::WorkerPanicked);
        self.join();
        outcome
    }

    fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!(operation = self.label, "Operation worker panicked");
            }
        }
    }
}
