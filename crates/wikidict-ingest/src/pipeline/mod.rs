//! Multi-stage concurrent pipeline
//!
//! Every stage runs on its own named thread and reads from its own
//! [`BoundedQueue`]; whatever it emits is pushed into the next stage's queue.
//! Bounded queues give backpressure: a slow stage blocks its producer instead
//! of letting memory grow.
//!
//! Shutdown always travels through queue closure:
//!
//! - Normal end: [`Pipeline::join`] closes the first queue. Each stage drains
//!   its input, runs [`Stage::finish`], and closes its output queue.
//! - Failure: the failing stage records its error, closes its own input (so
//!   the producer's next push is refused) and its output (so the consumer
//!   drains and exits). Later stages skip their completeness checks.
//! - Cancellation: [`Pipeline::cancel`] closes every queue at once.
//!
//! ```text
//!  submit() ─▶ [queue] ─▶ stage 1 ─▶ [queue] ─▶ stage 2 ─▶ ... ─▶ sink
//! ```

pub mod stage;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use crate::error::{IngestError, Result};
use crate::queue::BoundedQueue;

pub use stage::{flat_map, map, sink, ByteStage, FilterStage, Stage};

trait Close: Send + Sync {
    fn close(&self);
}

impl<T: Send> Close for BoundedQueue<T> {
    fn close(&self) {
        BoundedQueue::close(self)
    }
}

/// State shared by every worker of one pipeline
#[derive(Default)]
struct Shared {
    first_error: Mutex<Option<IngestError>>,
    aborted: AtomicBool,
}

impl Shared {
    fn fail(&self, err: IngestError) {
        // Record before anything gets closed so the root cause wins over
        // the errors it triggers downstream.
        let mut slot = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        } else {
            debug!(error = %err, "Suppressing follow-up pipeline error");
        }
        self.aborted.store(true, Ordering::SeqCst);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn take_error(&self) -> Option<IngestError> {
        self.first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Closes a worker's queues however the worker exits, panics included
struct CloseOnExit {
    stage: String,
    queues: Vec<Arc<dyn Close>>,
    shared: Arc<Shared>,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        // Must fail the pipeline before closing, or the next stage would
        // see a clean end of input and report an incomplete stream instead
        if std::thread::panicking() {
            self.shared.fail(IngestError::Pipeline {
                stage: self.stage.clone(),
                message: "worker thread panicked".to_string(),
            });
        }
        for queue in &self.queues {
            queue.close();
        }
    }
}

struct Worker {
    name: String,
    handle: JoinHandle<()>,
}

/// Incrementally assembled pipeline whose last stage produces `Cur`
pub struct PipelineBuilder<In, Cur> {
    input: Arc<BoundedQueue<In>>,
    tail: Arc<BoundedQueue<Cur>>,
    queues: Vec<Arc<dyn Close>>,
    workers: Vec<Worker>,
    shared: Arc<Shared>,
    capacity: usize,
}

impl<In: Send + 'static> PipelineBuilder<In, In> {
    fn new(capacity: usize) -> Self {
        let input = Arc::new(BoundedQueue::new(capacity));
        Self {
            tail: Arc::clone(&input),
            queues: vec![Arc::clone(&input) as Arc<dyn Close>],
            input,
            workers: Vec::new(),
            shared: Arc::new(Shared::default()),
            capacity,
        }
    }
}

impl<In: Send + 'static, Cur: Send + 'static> PipelineBuilder<In, Cur> {
    /// Append a stage consuming the current tail
    pub fn stage<S>(mut self, stage: S) -> Result<PipelineBuilder<In, S::Output>>
    where
        S: Stage<Input = Cur>,
    {
        let output = Arc::new(BoundedQueue::new(self.capacity));
        self.spawn(stage, Some(Arc::clone(&output)))?;
        self.queues.push(Arc::clone(&output) as Arc<dyn Close>);
        Ok(PipelineBuilder {
            input: self.input,
            tail: output,
            queues: self.queues,
            workers: self.workers,
            shared: self.shared,
            capacity: self.capacity,
        })
    }

    /// Append the terminal stage; its outputs, if any, are discarded
    pub fn sink<S>(mut self, stage: S) -> Result<Pipeline<In>>
    where
        S: Stage<Input = Cur>,
    {
        self.spawn(stage, None)?;
        Ok(Pipeline {
            input: self.input,
            queues: self.queues,
            workers: self.workers,
            shared: self.shared,
        })
    }

    fn spawn<S>(&mut self, stage: S, output: Option<Arc<BoundedQueue<S::Output>>>) -> Result<()>
    where
        S: Stage<Input = Cur>,
    {
        let name = stage.name().to_string();
        let input = Arc::clone(&self.tail);
        let shared = Arc::clone(&self.shared);
        let handle = std::thread::Builder::new()
            .name(format!("stage-{}", name))
            .spawn(move || run_stage(stage, input, output, shared))?;
        self.workers.push(Worker { name, handle });
        Ok(())
    }
}

fn run_stage<S: Stage>(
    mut stage: S,
    input: Arc<BoundedQueue<S::Input>>,
    output: Option<Arc<BoundedQueue<S::Output>>>,
    shared: Arc<Shared>,
) {
    let mut queues: Vec<Arc<dyn Close>> = vec![Arc::clone(&input) as Arc<dyn Close>];
    if let Some(ref out) = output {
        queues.push(Arc::clone(out) as Arc<dyn Close>);
    }
    let _close = CloseOnExit {
        stage: stage.name().to_string(),
        queues,
        shared: Arc::clone(&shared),
    };

    let mut downstream_open = true;
    let mut items = 0u64;

    let outcome = (|| -> Result<()> {
        while let Some(item) = input.pop() {
            if shared.is_aborted() {
                debug!(stage = stage.name(), "Pipeline aborted, dropping remaining input");
                return Ok(());
            }
            items += 1;
            stage.process(item, &mut |out| {
                if let Some(ref queue) = output {
                    if downstream_open && !queue.push(out) {
                        downstream_open = false;
                    }
                }
            })?;
            if !downstream_open {
                debug!(stage = stage.name(), "Downstream closed, stopping");
                return Ok(());
            }
        }

        if shared.is_aborted() {
            return Ok(());
        }
        stage.finish(&mut |out| {
            if let Some(ref queue) = output {
                queue.push(out);
            }
        })
    })();

    match outcome {
        Ok(()) => debug!(stage = stage.name(), items, "Stage exited"),
        Err(err) => {
            error!(stage = stage.name(), error = %err, "Stage terminated");
            shared.fail(err);
        },
    }
}

/// A running pipeline accepting `In` items
pub struct Pipeline<In> {
    input: Arc<BoundedQueue<In>>,
    queues: Vec<Arc<dyn Close>>,
    workers: Vec<Worker>,
    shared: Arc<Shared>,
}

impl<In: Send + 'static> Pipeline<In> {
    /// Start assembling a pipeline whose links hold `capacity` items each
    pub fn builder(capacity: usize) -> PipelineBuilder<In, In> {
        PipelineBuilder::new(capacity)
    }

    /// Push an item into the first stage, blocking while it is full
    ///
    /// Returns `false` once the pipeline has stopped accepting input, which
    /// happens when any stage has failed or the pipeline was cancelled.
    pub fn submit(&self, item: In) -> bool {
        self.input.push(item)
    }

    /// True once a stage has failed or the pipeline was cancelled
    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Stop every stage as soon as possible, skipping completeness checks
    pub fn cancel(&self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        for queue in &self.queues {
            queue.close();
        }
    }

    /// Signal end of input, wait for every stage, and return the first error
    pub fn join(mut self) -> Result<()> {
        self.input.close();
        self.join_workers();
        match self.shared.take_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn join_workers(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.handle.join().is_err() {
                warn!(stage = %worker.name, "Stage panicked");
                self.shared.fail(IngestError::Pipeline {
                    stage: worker.name,
                    message: "worker thread panicked".to_string(),
                });
            }
        }
    }
}

impl<In> Drop for Pipeline<In> {
    fn drop(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        // Dropped without join: tear down instead of leaking threads
        self.shared.aborted.store(true, Ordering::SeqCst);
        for queue in &self.queues {
            queue.close();
        }
        for worker in self.workers.drain(..) {
            let _ = worker.handle.join();
        }
    }
}
