//! Blocking adapters: run a synchronous closure off-thread while the task
//! is polled cooperatively.
//!
//! Two dispatch modes exist:
//!
//! - [`Task::threaded`]: a dedicated worker thread per task. The closure
//!   receives a [`CancelFlag`]; dropping the runner before completion sets
//!   the flag so a cooperative closure can bail out early. There is no
//!   forcible abort.
//! - [`Task::pooled`]: dispatch through a shared [`WorkerPool`]. Pool
//!   jobs are not cancellable: dropping the runner abandons the result and
//!   the job runs to completion, side effects included.
//!
//! The worker writes its outcome under a mutex and then raises a `done`
//! flag with release ordering; the polling side reads the flag with
//! acquire ordering before touching the outcome, which is the only
//! cross-thread handoff in the crate.

use crate::cx::TickCx;
use crate::error::{Error, Result};
use crate::step::{Block, Step};
use crate::task::{new_slot, settle_if_empty, Task, TaskSlot};
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// How long a pool worker idles before retiring.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cooperative cancellation flag handed to threaded closures.
///
/// The flag is set when the driving runner is dropped before the worker
/// finishes. Long-running closures should poll it at convenient points
/// and return early once it is raised; the outcome of a cancelled worker
/// is discarded either way.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    fn new() -> Self {
        Self::default()
    }

    /// Returns true once cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

struct Handoff<T> {
    outcome: Mutex<Option<Result<T>>>,
    done: AtomicBool,
}

impl<T> Handoff<T> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: AtomicBool::new(false),
        }
    }

    fn publish(&self, outcome: Result<T>) {
        *self.outcome.lock() = Some(outcome);
        self.done.store(true, Ordering::Release);
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn collect(&self) -> Result<T> {
        self.outcome
            .lock()
            .take()
            .unwrap_or_else(|| Err(Error::internal("worker finished without an outcome")))
    }
}

fn describe_panic(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_owned()
    }
}

fn run_caught<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(Error::panicked(describe_panic(&*payload))),
    }
}

impl<T: Send + 'static> Task<T> {
    /// Runs `f` on a dedicated worker thread.
    ///
    /// The worker is launched on the runner's first advance; the runner
    /// pauses until the worker publishes its outcome. `f` receives a
    /// [`CancelFlag`] raised if the runner is dropped early.
    #[must_use]
    pub fn threaded<F>(f: F) -> Self
    where
        F: FnOnce(&CancelFlag) -> Result<T> + Send + 'static,
    {
        let slot = new_slot();
        let runner = Box::new(ThreadedBlock {
            slot: slot.clone(),
            f: Some(f),
            handoff: None,
            cancel: CancelFlag::new(),
        });
        Self::from_parts(slot, runner)
    }

    /// Runs `f` on the process-wide shared [`WorkerPool`].
    #[must_use]
    pub fn pooled<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        Self::pooled_on(WorkerPool::shared(), f)
    }

    /// Runs `f` on `pool`.
    #[must_use]
    pub fn pooled_on<F>(pool: &WorkerPool, f: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let slot = new_slot();
        let runner = Box::new(PooledBlock {
            slot: slot.clone(),
            pool: pool.clone(),
            f: Some(f),
            handoff: None,
        });
        Self::from_parts(slot, runner)
    }
}

struct ThreadedBlock<T, F> {
    slot: TaskSlot<T>,
    f: Option<F>,
    handoff: Option<Arc<Handoff<T>>>,
    cancel: CancelFlag,
}

impl<T, F> Block for ThreadedBlock<T, F>
where
    T: Send + 'static,
    F: FnOnce(&CancelFlag) -> Result<T> + Send + 'static,
{
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        if self.handoff.is_none() {
            let Some(f) = self.f.take() else {
                return Ok(Step::Done);
            };
            let handoff = Arc::new(Handoff::new());
            let worker_handoff = Arc::clone(&handoff);
            let cancel = self.cancel.clone();
            let spawned = thread::Builder::new()
                .name("tickflow-worker".to_owned())
                .spawn(move || {
                    let outcome = run_caught(|| f(&cancel));
                    worker_handoff.publish(outcome);
                });
            if let Err(err) = spawned {
                settle_if_empty(&self.slot, Err(Error::wrap(err).with_context("spawn worker")));
                return Ok(Step::Done);
            }
            trace!("threaded task worker launched");
            self.handoff = Some(handoff);
        }
        let done = self
            .handoff
            .as_ref()
            .map_or(false, |handoff| handoff.is_done());
        if done {
            if let Some(handoff) = self.handoff.take() {
                settle_if_empty(&self.slot, handoff.collect());
            }
            Ok(Step::Done)
        } else {
            Ok(Step::Pause)
        }
    }
}

impl<T, F> Drop for ThreadedBlock<T, F> {
    fn drop(&mut self) {
        if let Some(handoff) = &self.handoff {
            if !handoff.is_done() {
                trace!("threaded task dropped in flight, requesting cancel");
                self.cancel.cancel();
            }
        }
    }
}

struct PooledBlock<T, F> {
    slot: TaskSlot<T>,
    pool: WorkerPool,
    f: Option<F>,
    handoff: Option<Arc<Handoff<T>>>,
}

impl<T, F> Block for PooledBlock<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    fn advance(&mut self, _cx: TickCx) -> Result<Step> {
        if self.handoff.is_none() {
            let Some(f) = self.f.take() else {
                return Ok(Step::Done);
            };
            let handoff = Arc::new(Handoff::new());
            let worker_handoff = Arc::clone(&handoff);
            self.pool.submit(move || {
                let outcome = run_caught(f);
                worker_handoff.publish(outcome);
            });
            self.handoff = Some(handoff);
        }
        let done = self
            .handoff
            .as_ref()
            .map_or(false, |handoff| handoff.is_done());
        if done {
            if let Some(handoff) = self.handoff.take() {
                settle_if_empty(&self.slot, handoff.collect());
            }
            Ok(Step::Done)
        } else {
            Ok(Step::Pause)
        }
    }
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolInner {
    max_threads: usize,
    spawned: AtomicUsize,
    idle: AtomicUsize,
    next_worker: AtomicUsize,
    queue: SegQueue<Job>,
    mutex: Mutex<()>,
    condvar: Condvar,
    shutdown: AtomicBool,
}

/// A shared pool of lazily spawned worker threads.
///
/// Threads are spawned on demand up to the configured cap and retire
/// after idling; the pool never cancels a job once dequeued.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Creates a pool that spawns at most `max_threads` workers.
    #[must_use]
    pub fn new(max_threads: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_threads: max_threads.max(1),
                spawned: AtomicUsize::new(0),
                idle: AtomicUsize::new(0),
                next_worker: AtomicUsize::new(0),
                queue: SegQueue::new(),
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// The process-wide pool used by [`Task::pooled`].
    #[must_use]
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<WorkerPool> = OnceLock::new();
        SHARED.get_or_init(|| {
            let threads = thread::available_parallelism().map_or(2, |n| n.get().min(4));
            WorkerPool::new(threads)
        })
    }

    /// Enqueues `job` for execution on a pool worker.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        self.inner.queue.push(Box::new(job));
        if self.inner.idle.load(Ordering::Acquire) > 0 {
            let _guard = self.inner.mutex.lock();
            self.inner.condvar.notify_one();
            return;
        }
        self.maybe_spawn_worker();
    }

    /// Number of jobs waiting for a worker.
    #[must_use]
    pub fn queued_jobs(&self) -> usize {
        self.inner.queue.len()
    }

    /// Asks all workers to retire once the queue drains. Queued jobs still
    /// run; new submissions after shutdown are never picked up.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        let _guard = self.inner.mutex.lock();
        self.inner.condvar.notify_all();
    }

    fn maybe_spawn_worker(&self) {
        let inner = &self.inner;
        loop {
            let current = inner.spawned.load(Ordering::Acquire);
            if current >= inner.max_threads {
                let _guard = inner.mutex.lock();
                inner.condvar.notify_one();
                return;
            }
            if inner
                .spawned
                .compare_exchange(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let worker = Arc::clone(inner);
        let tag = inner.next_worker.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name(format!("tickflow-pool-{tag}"))
            .spawn(move || worker_loop(&worker));
        match spawned {
            Ok(_) => debug!(worker = tag, "pool worker spawned"),
            Err(err) => {
                inner.spawned.fetch_sub(1, Ordering::AcqRel);
                warn!(error = %err, "failed to spawn pool worker");
            }
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_threads", &self.inner.max_threads)
            .field("spawned", &self.inner.spawned.load(Ordering::Relaxed))
            .field("queued", &self.inner.queue.len())
            .finish()
    }
}

fn worker_loop(inner: &Arc<PoolInner>) {
    loop {
        if let Some(job) = inner.queue.pop() {
            let _ = catch_unwind(AssertUnwindSafe(job));
            continue;
        }
        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }
        let mut guard = inner.mutex.lock();
        if !inner.queue.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }
        inner.idle.fetch_add(1, Ordering::AcqRel);
        let timed_out = inner
            .condvar
            .wait_for(&mut guard, IDLE_TIMEOUT)
            .timed_out();
        inner.idle.fetch_sub(1, Ordering::AcqRel);
        drop(guard);
        if timed_out && inner.queue.is_empty() {
            break;
        }
    }
    inner.spawned.fetch_sub(1, Ordering::AcqRel);
    debug!("pool worker retired");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coroutine::Coroutine;
    use crate::resumable::Resumable;

    fn drive_blocking<T: Send + 'static>(task: &mut Task<T>) -> Result<()> {
        let mut co = Coroutine::new(task.run());
        let mut spins = 0;
        while !co.finished() {
            co.tick(0.001)?;
            spins += 1;
            assert!(spins < 20_000, "worker never completed");
            thread::sleep(Duration::from_micros(200));
        }
        Ok(())
    }

    // =========================================================================
    // Threaded tasks
    // =========================================================================

    #[test]
    fn threaded_publishes_result() {
        let mut task = Task::threaded(|_cancel| Ok(6 * 7));
        drive_blocking(&mut task).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), 42);
    }

    #[test]
    fn threaded_captures_user_error() {
        let mut task: Task<i32> = Task::threaded(|_cancel| Err(Error::user("worker says no")));
        drive_blocking(&mut task).unwrap();
        assert_eq!(task.error().unwrap().context(), Some("worker says no"));
    }

    #[test]
    fn threaded_captures_panic() {
        let mut task: Task<i32> = Task::threaded(|_cancel| panic!("kaboom"));
        drive_blocking(&mut task).unwrap();
        let err = task.error().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Panicked);
        assert_eq!(err.context(), Some("kaboom"));
    }

    #[test]
    fn threaded_drop_requests_cancel() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut task: Task<()> = Task::threaded(move |cancel| {
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            tx.send(()).ok();
            Ok(())
        });
        let mut co = Coroutine::new(task.run());
        co.tick(0.0).unwrap();
        assert!(!co.finished());
        // Dropping the runner raises the flag; the worker notices and exits.
        co.dispose();
        rx.recv_timeout(Duration::from_secs(5))
            .expect("worker observed cancellation");
    }

    // =========================================================================
    // Pooled tasks
    // =========================================================================

    #[test]
    fn pooled_publishes_result() {
        let pool = WorkerPool::new(2);
        let mut task = Task::pooled_on(&pool, || Ok("done".to_owned()));
        drive_blocking(&mut task).unwrap();
        assert_eq!(task.take().unwrap().unwrap(), "done");
        pool.shutdown();
    }

    #[test]
    fn pooled_runs_many_jobs_on_few_threads() {
        let pool = WorkerPool::new(2);
        let mut tasks: Vec<Task<usize>> = (0..8)
            .map(|i| Task::pooled_on(&pool, move || Ok(i)))
            .collect();
        for (i, task) in tasks.iter_mut().enumerate() {
            drive_blocking(task).unwrap();
            assert_eq!(task.take().unwrap().unwrap(), i);
        }
        pool.shutdown();
    }

    #[test]
    fn pooled_abandoned_job_still_runs() {
        let pool = WorkerPool::new(1);
        let (tx, rx) = std::sync::mpsc::channel();
        let mut task: Task<()> = Task::pooled_on(&pool, move || {
            tx.send(()).ok();
            Ok(())
        });
        let mut co = Coroutine::new(task.run());
        co.tick(0.0).unwrap();
        co.dispose();
        // No cancellation path exists; the job runs to completion anyway.
        rx.recv_timeout(Duration::from_secs(5))
            .expect("abandoned job still ran");
        pool.shutdown();
    }

    #[test]
    fn shared_pool_is_reused() {
        let a = WorkerPool::shared();
        let b = WorkerPool::shared();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
