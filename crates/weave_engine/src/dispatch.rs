//! Dispatch strategies for per-type transformation work.
//!
//! Each unit of work has two phases: preprocessing (classification and
//! plugin matching) evaluates to the processing closure, and processing
//! evaluates to a [`Materializable`]. Materialization folds a result into
//! the shared outcome — the sink plus the summary collections — and is the
//! single serialized step, so the sink is never written concurrently.

use crate::builder::DynamicType;
use crate::error::{EngineError, Failures, PluginError};
use crate::source::Element;
use crate::target::Sink;
use crate::types::TypeDescription;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::debug;

/// A unit of completed transformation work that has not been folded into
/// the shared result collections and the sink yet.
pub enum Materializable {
    /// A type was transformed; its bytecode and auxiliary types are stored.
    Transformed(DynamicType),
    /// An element is copied through in its original form.
    Retained(Element),
    /// A type failed during transformation; the original is retained and
    /// the failure recorded.
    Failed {
        element: Element,
        type_description: TypeDescription,
        errors: Vec<PluginError>,
    },
    /// A class file candidate could not be resolved; the original is
    /// retained and the name recorded.
    Unresolved { element: Element, type_name: String },
    /// Nothing is written for this element.
    Discarded,
}

impl Materializable {
    fn materialize(self, outcome: &mut Outcome) -> Result<(), EngineError> {
        match self {
            Materializable::Transformed(dynamic_type) => {
                let (type_description, types, _) = dynamic_type.into_parts();
                outcome.sink.store(types)?;
                outcome.transformed.push(type_description);
            }
            Materializable::Retained(element) => outcome.sink.retain(&element)?,
            Materializable::Failed {
                element,
                type_description,
                errors,
            } => {
                outcome.sink.retain(&element)?;
                outcome.failed.insert(type_description, errors);
            }
            Materializable::Unresolved { element, type_name } => {
                outcome.sink.retain(&element)?;
                outcome.unresolved.push(type_name);
            }
            Materializable::Discarded => {}
        }
        Ok(())
    }
}

/// The mutable state shared by an engine run: the open sink and the
/// accumulating summary collections.
pub struct Outcome {
    pub sink: Box<dyn Sink>,
    pub transformed: Vec<TypeDescription>,
    pub failed: Failures,
    pub unresolved: Vec<String>,
}

impl Outcome {
    pub fn new(sink: Box<dyn Sink>) -> Outcome {
        Outcome {
            sink,
            transformed: Vec::new(),
            failed: Failures::new(),
            unresolved: Vec::new(),
        }
    }
}

/// The shared outcome, guarded by the materialization mutex.
pub type SharedOutcome = Arc<Mutex<Outcome>>;

/// Locks the shared outcome, surfacing poisoning as an engine error.
pub fn lock_outcome(outcome: &SharedOutcome) -> Result<MutexGuard<'_, Outcome>, EngineError> {
    outcome.lock().map_err(|_| EngineError::Poisoned)
}

/// The second phase of a unit of work.
pub type Processing = Box<dyn FnOnce() -> Result<Materializable, EngineError> + Send>;

/// A complete unit of work: evaluating it performs the preprocessing and
/// yields the processing closure.
pub type Work = Box<dyn FnOnce() -> Result<Processing, EngineError> + Send>;

/// The strategy for executing per-type work. A dispatcher receives all
/// work before `complete` is invoked and is used from a single thread.
pub trait Dispatcher {
    /// Accepts a unit of work. When `drain_immediately` is set, the second
    /// phase including materialization happens before this call returns;
    /// otherwise it may be deferred until [`Dispatcher::complete`].
    fn accept(&mut self, work: Work, drain_immediately: bool) -> Result<(), EngineError>;

    /// Completes all outstanding work.
    fn complete(&mut self) -> Result<(), EngineError>;
}

/// Creates a dispatcher for one engine run.
pub trait DispatcherFactory: Send + Sync {
    fn make(&self, outcome: SharedOutcome) -> Result<Box<dyn Dispatcher>, EngineError>;
}

/// Runs both phases on the calling thread. Deferred processing closures
/// are queued and drained in submission order by `complete`.
pub struct ForSerialTransformation {
    outcome: SharedOutcome,
    deferred: Vec<Processing>,
}

impl ForSerialTransformation {
    pub fn new(outcome: SharedOutcome) -> ForSerialTransformation {
        ForSerialTransformation {
            outcome,
            deferred: Vec::new(),
        }
    }
}

impl Dispatcher for ForSerialTransformation {
    fn accept(&mut self, work: Work, drain_immediately: bool) -> Result<(), EngineError> {
        let processing = work()?;
        if drain_immediately {
            processing()?.materialize(&mut *lock_outcome(&self.outcome)?)
        } else {
            self.deferred.push(processing);
            Ok(())
        }
    }

    fn complete(&mut self) -> Result<(), EngineError> {
        for processing in self.deferred.drain(..) {
            processing()?.materialize(&mut *lock_outcome(&self.outcome)?)?;
        }
        Ok(())
    }
}

/// The factory for serial dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialDispatcherFactory;

impl DispatcherFactory for SerialDispatcherFactory {
    fn make(&self, outcome: SharedOutcome) -> Result<Box<dyn Dispatcher>, EngineError> {
        Ok(Box::new(ForSerialTransformation::new(outcome)))
    }
}

type Job = Box<dyn FnOnce() + Send>;

struct Coordination {
    pending: usize,
    error: Option<EngineError>,
}

struct ParallelState {
    coordination: Mutex<Coordination>,
    done: Condvar,
}

impl ParallelState {
    fn new() -> Arc<ParallelState> {
        Arc::new(ParallelState {
            coordination: Mutex::new(Coordination {
                pending: 0,
                error: None,
            }),
            done: Condvar::new(),
        })
    }

    fn guard(&self) -> MutexGuard<'_, Coordination> {
        match self.coordination.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn begin(&self) {
        self.guard().pending += 1;
    }

    fn finish(&self) {
        let mut guard = self.guard();
        guard.pending -= 1;
        if guard.pending == 0 {
            self.done.notify_all();
        }
    }

    /// Records the first error; later errors are dropped.
    fn record(&self, error: EngineError) {
        let mut guard = self.guard();
        if guard.error.is_none() {
            guard.error = Some(error);
        }
    }

    fn aborted(&self) -> bool {
        self.guard().error.is_some()
    }
}

/// Runs work on an owned pool of worker threads. Preprocessing jobs feed
/// processing jobs upon completion; materialization is funneled through
/// the shared outcome mutex. After the first recorded error, work that has
/// not started yet is skipped; in-flight work runs to completion.
///
/// Transformed types materialize in completion order, which is looser than
/// the source-iteration order guaranteed by serial dispatch.
pub struct ForParallelTransformation {
    outcome: SharedOutcome,
    state: Arc<ParallelState>,
    jobs: Option<crossbeam_channel::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl ForParallelTransformation {
    pub fn new(threads: usize, outcome: SharedOutcome) -> Result<ForParallelTransformation, EngineError> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let worker = std::thread::Builder::new()
                .name(format!("weave-worker-{index}"))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(worker);
        }
        debug!(threads, "started parallel transformation workers");
        Ok(ForParallelTransformation {
            outcome,
            state: ParallelState::new(),
            jobs: Some(sender),
            workers,
        })
    }

    /// Wraps a job body so that the pending count is maintained and a
    /// panicking plugin poisons the run instead of stalling `complete`.
    fn wrap(state: Arc<ParallelState>, body: Box<dyn FnOnce() + Send>) -> Job {
        Box::new(move || {
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)).is_err() {
                state.record(EngineError::Poisoned);
            }
            state.finish();
        })
    }

    fn enqueue(
        state: &Arc<ParallelState>,
        sender: Option<&crossbeam_channel::Sender<Job>>,
        body: Box<dyn FnOnce() + Send>,
    ) {
        // A send only fails when all workers are gone, which records an
        // error instead of panicking.
        state.begin();
        let job = Self::wrap(state.clone(), body);
        match sender {
            Some(sender) if sender.send(job).is_ok() => {}
            _ => {
                state.record(EngineError::Poisoned);
                state.finish();
            }
        }
    }
}

impl Dispatcher for ForParallelTransformation {
    fn accept(&mut self, work: Work, drain_immediately: bool) -> Result<(), EngineError> {
        if self.state.aborted() {
            // Scheduling stops at the first recorded error; the error
            // surfaces from complete.
            return Ok(());
        }
        if drain_immediately {
            let (ack_sender, ack_receiver) = crossbeam_channel::bounded::<()>(1);
            let state = self.state.clone();
            let outcome = self.outcome.clone();
            Self::enqueue(
                &self.state,
                self.jobs.as_ref(),
                Box::new(move || {
                    let result = work().and_then(|processing| processing()).and_then(
                        |materializable| materializable.materialize(&mut *lock_outcome(&outcome)?),
                    );
                    if let Err(error) = result {
                        state.record(error);
                    }
                    let _ = ack_sender.send(());
                }),
            );
            let _ = ack_receiver.recv();
            Ok(())
        } else {
            let state = self.state.clone();
            let outcome = self.outcome.clone();
            let sender = self.jobs.clone();
            Self::enqueue(
                &self.state,
                self.jobs.as_ref(),
                Box::new(move || {
                    if state.aborted() {
                        return;
                    }
                    match work() {
                        Ok(processing) => {
                            let processing_state = state.clone();
                            Self::enqueue(
                                &state,
                                sender.as_ref(),
                                Box::new(move || {
                                    if processing_state.aborted() {
                                        return;
                                    }
                                    let result = processing().and_then(|materializable| {
                                        materializable
                                            .materialize(&mut *lock_outcome(&outcome)?)
                                    });
                                    if let Err(error) = result {
                                        processing_state.record(error);
                                    }
                                }),
                            );
                        }
                        Err(error) => state.record(error),
                    }
                }),
            );
            Ok(())
        }
    }

    fn complete(&mut self) -> Result<(), EngineError> {
        let mut guard = self.state.guard();
        while guard.pending > 0 {
            guard = match self.state.done.wait(guard) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        match guard.error.take() {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

impl Drop for ForParallelTransformation {
    fn drop(&mut self) {
        // Aborting before completion skips any work that has not started;
        // after a successful completion there is nothing left to skip.
        self.state.record(EngineError::Poisoned);
        self.jobs.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

/// The factory for parallel dispatch with an owned, per-run thread pool.
#[derive(Debug, Clone, Copy)]
pub struct ParallelDispatcherFactory {
    threads: usize,
}

impl ParallelDispatcherFactory {
    pub fn new(threads: usize) -> ParallelDispatcherFactory {
        ParallelDispatcherFactory { threads }
    }
}

impl DispatcherFactory for ParallelDispatcherFactory {
    fn make(&self, outcome: SharedOutcome) -> Result<Box<dyn Dispatcher>, EngineError> {
        Ok(Box::new(ForParallelTransformation::new(
            self.threads,
            outcome,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::Discarding;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shared_outcome() -> SharedOutcome {
        Arc::new(Mutex::new(Outcome::new(Box::new(Discarding))))
    }

    fn transformed_work(name: &str) -> Work {
        let name = name.to_string();
        Box::new(move || {
            let name = name.clone();
            Ok(Box::new(move || {
                Ok(Materializable::Unresolved {
                    element: Element::of_bytes(format!("{name}.class"), Vec::new()),
                    type_name: name,
                })
            }) as Processing)
        })
    }

    #[test]
    fn serial_dispatch_preserves_submission_order_when_deferred() {
        let outcome = shared_outcome();
        let mut dispatcher = ForSerialTransformation::new(outcome.clone());
        for name in ["a.A", "a.B", "a.C"] {
            dispatcher.accept(transformed_work(name), false).expect("accept");
        }
        assert!(lock_outcome(&outcome).expect("outcome").unresolved.is_empty());
        dispatcher.complete().expect("complete");
        assert_eq!(
            lock_outcome(&outcome).expect("outcome").unresolved,
            ["a.A", "a.B", "a.C"]
        );
    }

    #[test]
    fn serial_dispatch_drains_immediately_when_requested() {
        let outcome = shared_outcome();
        let mut dispatcher = ForSerialTransformation::new(outcome.clone());
        dispatcher.accept(transformed_work("a.A"), true).expect("accept");
        assert_eq!(lock_outcome(&outcome).expect("outcome").unresolved, ["a.A"]);
    }

    #[test]
    fn serial_dispatch_raises_phase_one_errors_from_accept() {
        let mut dispatcher = ForSerialTransformation::new(shared_outcome());
        let result = dispatcher.accept(
            Box::new(|| Err(EngineError::Unresolved("a.A".into()))),
            false,
        );
        assert!(matches!(result, Err(EngineError::Unresolved(_))));
    }

    #[test]
    fn parallel_dispatch_completes_all_work() {
        let outcome = shared_outcome();
        let mut dispatcher =
            ForParallelTransformation::new(4, outcome.clone()).expect("dispatcher");
        let names: Vec<String> = (0..32).map(|index| format!("a.T{index}")).collect();
        for name in &names {
            dispatcher.accept(transformed_work(name), false).expect("accept");
        }
        dispatcher.complete().expect("complete");
        let mut seen = lock_outcome(&outcome).expect("outcome").unresolved.clone();
        seen.sort();
        let mut expected = names;
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn parallel_dispatch_propagates_the_first_error() {
        let outcome = shared_outcome();
        let mut dispatcher =
            ForParallelTransformation::new(2, outcome.clone()).expect("dispatcher");
        dispatcher
            .accept(
                Box::new(|| Err(EngineError::Unresolved("a.Broken".into()))),
                false,
            )
            .expect("accept");
        let result = dispatcher.complete();
        assert!(matches!(result, Err(EngineError::Unresolved(_))));
    }

    #[test]
    fn parallel_dispatch_blocks_for_immediate_draining() {
        let outcome = shared_outcome();
        let mut dispatcher =
            ForParallelTransformation::new(2, outcome.clone()).expect("dispatcher");
        dispatcher.accept(transformed_work("a.A"), true).expect("accept");
        assert_eq!(lock_outcome(&outcome).expect("outcome").unresolved, ["a.A"]);
        dispatcher.complete().expect("complete");
    }

    #[test]
    fn materialization_is_serialized() {
        struct CountingSink {
            concurrent: Arc<AtomicUsize>,
            max_seen: Arc<AtomicUsize>,
        }

        impl Sink for CountingSink {
            fn store(
                &mut self,
                _types: Vec<(TypeDescription, Vec<u8>)>,
            ) -> Result<(), EngineError> {
                Ok(())
            }

            fn retain(&mut self, _element: &Element) -> Result<(), EngineError> {
                let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::yield_now();
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }

            fn close(&mut self) -> Result<(), EngineError> {
                Ok(())
            }
        }

        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let outcome = Arc::new(Mutex::new(Outcome::new(Box::new(CountingSink {
            concurrent: concurrent.clone(),
            max_seen: max_seen.clone(),
        }))));
        let mut dispatcher =
            ForParallelTransformation::new(4, outcome.clone()).expect("dispatcher");
        for index in 0..64 {
            dispatcher
                .accept(transformed_work(&format!("a.T{index}")), false)
                .expect("accept");
        }
        dispatcher.complete().expect("complete");
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
