//! Parallel to-do list executor.
//!
//! A [`TaskRunner`] takes a collection of items (or an index range) and a
//! per-item worker, and drains them from a shared FIFO queue with a bounded
//! set of scoped threads. Threads are created per batch and joined before the
//! call returns; no pool outlives a batch.
//!
//! ## Nesting
//!
//! Each runner owns a "batch running" flag. A batch that cannot take the flag
//! (because another batch on the same runner is in flight, typically the one
//! that is calling us from a worker) runs sequentially in the calling thread
//! instead of spawning threads inside threads. Acquisition is a try-lock,
//! never a wait, so nesting cannot deadlock.
//!
//! [`TaskRunner::shared`] is the process-wide runner; tests and embedders
//! that need isolation construct their own with [`TaskRunner::new`].
//!
//! ## Failure and cancellation
//!
//! The first worker error stops the batch: no new items are started, running
//! items finish, threads are joined and the error is returned unchanged.
//! Cancellation is cooperative: the sink is polled before each item, and a
//! batch that stops early because of it returns [`Error::Cancelled`].

use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use tracing::{debug, trace};

/// Environment variable overriding the worker thread count.
pub const THREADS_ENV: &str = "ISOGLOSS_THREADS";

/// Runner configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RunnerConfig {
    /// Worker threads per batch. `None` means available CPU parallelism.
    pub threads: Option<usize>,
}

impl RunnerConfig {
    /// Read the thread count from [`THREADS_ENV`], ignoring unparsable or
    /// zero values.
    pub fn from_env() -> Self {
        let threads = std::env::var(THREADS_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0);
        Self { threads }
    }

    /// Set an explicit thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Effective thread count (at least 1).
    pub fn thread_count(&self) -> usize {
        self.threads
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }
}

/// Bounded, cooperative, nesting-safe parallel executor.
#[derive(Debug)]
pub struct TaskRunner {
    config: RunnerConfig,
    running: AtomicBool,
}

static SHARED: OnceLock<Arc<TaskRunner>> = OnceLock::new();

/// Clears the running flag when the batch ends, whichever way it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TaskRunner {
    /// A runner with its own running flag.
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Shorthand for a runner with exactly `threads` workers.
    pub fn with_threads(threads: usize) -> Self {
        Self::new(RunnerConfig::default().with_threads(threads))
    }

    /// The process-wide runner, configured from the environment on first use.
    ///
    /// All callers sharing it share one running flag, so at most one of its
    /// batches is parallel at any time.
    pub fn shared() -> Arc<TaskRunner> {
        SHARED
            .get_or_init(|| Arc::new(TaskRunner::new(RunnerConfig::from_env())))
            .clone()
    }

    /// Configured worker count.
    pub fn threads(&self) -> usize {
        self.config.thread_count()
    }

    /// Whether a parallel batch currently holds this runner.
    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn try_acquire(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard(&self.running))
    }

    /// Run `worker` once per item.
    ///
    /// Progress goes from 0 to the item count; `set_total` is called first.
    pub fn run_on_items<T, I, F>(
        &self,
        items: I,
        progress: &dyn ProgressSink,
        worker: F,
    ) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Send,
        F: Fn(T) -> Result<()> + Sync,
    {
        let items: Vec<T> = items.into_iter().collect();
        let total = items.len();
        progress.set_total(total);
        if total == 0 {
            return Ok(());
        }

        let max_threads = self.threads().min(total);
        let guard = if max_threads > 1 { self.try_acquire() } else { None };
        match guard {
            Some(_guard) => {
                debug!(items = total, threads = max_threads, "parallel batch");
                run_parallel(items, max_threads, progress, &worker)
            }
            None => {
                debug!(items = total, busy = self.is_busy(), "sequential batch");
                run_sequential(items, progress, &worker)
            }
        }
    }

    /// Run `worker` for every index in `start..end` stepping by `step`.
    pub fn run_on_range<F>(
        &self,
        start: usize,
        end: usize,
        step: usize,
        progress: &dyn ProgressSink,
        worker: F,
    ) -> Result<()>
    where
        F: Fn(usize) -> Result<()> + Sync,
    {
        if step == 0 {
            return Err(Error::invalid("step", "must be > 0"));
        }
        self.run_on_items((start..end).step_by(step), progress, worker)
    }

    /// Evaluate `f` for `0..n` and collect the results in index order.
    pub fn map_range<R, F>(&self, n: usize, progress: &dyn ProgressSink, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(usize) -> Result<R> + Sync,
    {
        let slots: Vec<Mutex<Option<R>>> = (0..n).map(|_| Mutex::new(None)).collect();
        self.run_on_range(0, n, 1, progress, |i| {
            let value = f(i)?;
            *slots[i].lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
            Ok(())
        })?;
        slots
            .into_iter()
            .map(|slot| {
                slot.into_inner()
                    .unwrap_or_else(PoisonError::into_inner)
                    .ok_or_else(|| Error::Other("runner finished with an unfilled slot".into()))
            })
            .collect()
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

fn run_sequential<T, F>(items: Vec<T>, progress: &dyn ProgressSink, worker: &F) -> Result<()>
where
    F: Fn(T) -> Result<()>,
{
    for (done, item) in items.into_iter().enumerate() {
        if progress.is_cancelled() {
            return Err(Error::Cancelled);
        }
        worker(item)?;
        progress.set_current(done + 1);
    }
    Ok(())
}

fn run_parallel<T, F>(
    items: Vec<T>,
    threads: usize,
    progress: &dyn ProgressSink,
    worker: &F,
) -> Result<()>
where
    T: Send,
    F: Fn(T) -> Result<()> + Sync,
{
    let total = items.len();
    let (tx, rx) = crossbeam_channel::unbounded();
    for item in items {
        tx.send(item)
            .map_err(|_| Error::Other("work queue closed while seeding".into()))?;
    }
    // Disconnected + empty is the "queue drained" signal.
    drop(tx);

    let done = AtomicUsize::new(0);
    // Highest count handed to the sink; workers finish out of order.
    let reported = Mutex::new(0usize);
    let stop = AtomicBool::new(false);
    let failure: Mutex<Option<Error>> = Mutex::new(None);

    thread::scope(|s| {
        for worker_id in 0..threads {
            let (rx, done, reported, stop, failure) = (&rx, &done, &reported, &stop, &failure);
            s.spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if progress.is_cancelled() {
                        stop.store(true, Ordering::Release);
                        break;
                    }
                    let Ok(item) = rx.try_recv() else {
                        break;
                    };
                    match worker(item) {
                        Ok(()) => {
                            let n = done.fetch_add(1, Ordering::AcqRel) + 1;
                            let mut last = reported.lock().unwrap_or_else(PoisonError::into_inner);
                            if n > *last {
                                *last = n;
                                progress.set_current(n);
                            }
                        }
                        Err(err) => {
                            trace!(worker_id, error = %err, "worker failed");
                            stop.store(true, Ordering::Release);
                            let mut slot = failure.lock().unwrap_or_else(PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(err);
                            }
                            break;
                        }
                    }
                }
            });
        }
    });

    if let Some(err) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    if done.load(Ordering::Acquire) < total {
        return Err(Error::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelFlag, NoProgress};
    use std::collections::HashSet;

    fn process_all(threads: usize) -> (Vec<u64>, usize) {
        let runner = TaskRunner::with_threads(threads);
        let seen = Mutex::new(Vec::new());
        let progress = CancelFlag::new();
        runner
            .run_on_items(0..500u64, &progress, |x| {
                seen.lock().unwrap().push(x * x);
                Ok(())
            })
            .unwrap();
        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        (seen, progress.current())
    }

    #[test]
    fn test_single_and_multi_thread_agree() {
        let (one, p1) = process_all(1);
        let (eight, p8) = process_all(8);
        assert_eq!(one, eight);
        assert_eq!(one.len(), 500);
        assert_eq!(p1, 500);
        assert_eq!(p8, 500);
    }

    #[test]
    fn test_cancellation_stops_new_items() {
        for threads in [1, 8] {
            let runner = TaskRunner::with_threads(threads);
            let progress = CancelFlag::new();
            let started = AtomicUsize::new(0);
            let result = runner.run_on_items(0..500usize, &progress, |_| {
                let n = started.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 50 {
                    progress.cancel();
                }
                Ok(())
            });
            assert!(result.unwrap_err().is_cancelled());
            // Items already claimed when the flag flipped may finish.
            assert!(started.load(Ordering::SeqCst) < 50 + threads);
            assert!(!runner.is_busy());
        }
    }

    #[test]
    fn test_first_error_propagates_unchanged() {
        let runner = TaskRunner::with_threads(4);
        let result = runner.run_on_range(0, 200, 1, &NoProgress, |i| {
            if i == 42 {
                Err(Error::Other(format!("bad item {i}")))
            } else {
                Ok(())
            }
        });
        match result {
            Err(Error::Other(msg)) => assert_eq!(msg, "bad item 42"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!runner.is_busy(), "flag must be released after failure");
        runner.run_on_range(0, 10, 1, &NoProgress, |_| Ok(())).unwrap();
    }

    #[test]
    fn test_nested_batch_runs_in_calling_thread() {
        let runner = TaskRunner::with_threads(4);
        let mismatches = AtomicUsize::new(0);
        runner
            .run_on_range(0, 8, 1, &NoProgress, |_| {
                let outer = thread::current().id();
                runner.run_on_range(0, 16, 1, &NoProgress, |_| {
                    if thread::current().id() != outer {
                        mismatches.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(())
                })
            })
            .unwrap();
        assert_eq!(mismatches.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_range_step_and_zero_step() {
        let runner = TaskRunner::with_threads(3);
        let seen = Mutex::new(HashSet::new());
        runner
            .run_on_range(2, 20, 5, &NoProgress, |i| {
                seen.lock().unwrap().insert(i);
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.into_inner().unwrap(), HashSet::from([2, 7, 12, 17]));
        assert!(runner.run_on_range(0, 10, 0, &NoProgress, |_| Ok(())).is_err());
    }

    #[test]
    fn test_map_range_keeps_order() {
        let runner = TaskRunner::with_threads(8);
        let out = runner.map_range(100, &NoProgress, |i| Ok(i * 3)).unwrap();
        assert_eq!(out, (0..100).map(|i| i * 3).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_batch() {
        let runner = TaskRunner::with_threads(8);
        let progress = CancelFlag::new();
        runner
            .run_on_items(Vec::<u8>::new(), &progress, |_| Ok(()))
            .unwrap();
        assert_eq!(progress.total(), 0);
    }

    /// Keeps whatever it was told last and counts backward steps.
    #[derive(Default)]
    struct LastValue {
        current: AtomicUsize,
        regressions: AtomicUsize,
    }

    impl ProgressSink for LastValue {
        fn set_current(&self, current: usize) {
            let previous = self.current.swap(current, Ordering::SeqCst);
            if current < previous {
                self.regressions.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn test_progress_never_moves_backwards() {
        let runner = TaskRunner::with_threads(8);
        for _ in 0..50 {
            let sink = LastValue::default();
            runner.run_on_items(0..5000usize, &sink, |_| Ok(())).unwrap();
            assert_eq!(sink.regressions.load(Ordering::SeqCst), 0);
            assert_eq!(sink.current.load(Ordering::SeqCst), 5000);
        }
    }

    #[test]
    fn test_shared_runner_is_a_singleton() {
        assert!(Arc::ptr_eq(&TaskRunner::shared(), &TaskRunner::shared()));
    }
}
