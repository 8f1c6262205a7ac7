//! Progress reporting and cooperative cancellation.
//!
//! Long-running work reports through a [`ProgressSink`]. The sink is also the
//! cancellation channel: workers poll [`ProgressSink::is_cancelled`] between
//! items and stop voluntarily. Nothing is ever killed.
//!
//! A UI would back the sink with a progress dialog; batch jobs and tests use
//! [`NoProgress`] or [`CancelFlag`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Receiver of progress updates and source of cancellation requests.
///
/// Implementations must tolerate calls from any thread.
pub trait ProgressSink: Send + Sync {
    /// Announce the number of steps of the current operation.
    fn set_total(&self, _total: usize) {}

    /// Report the number of completed steps.
    fn set_current(&self, _current: usize) {}

    /// Human-readable description of the current phase.
    fn set_note(&self, _note: &str) {}

    /// Whether the user asked to stop.
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Headless sink: ignores updates and is never cancelled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Headless sink that records the latest state and can be cancelled.
#[derive(Debug, Default)]
pub struct CancelFlag {
    cancelled: AtomicBool,
    total: AtomicUsize,
    current: AtomicUsize,
    note: Mutex<String>,
}

impl CancelFlag {
    /// A fresh, uncancelled flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Last value passed to `set_total`.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    /// Highest value passed to `set_current`.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Last note.
    pub fn note(&self) -> String {
        self.note.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl ProgressSink for CancelFlag {
    fn set_total(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn set_current(&self, current: usize) {
        // Never moves backwards, whoever reports.
        self.current.fetch_max(current, Ordering::SeqCst);
    }

    fn set_note(&self, note: &str) {
        if let Ok(mut n) = self.note.lock() {
            n.clear();
            n.push_str(note);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One phase of a multi-phase operation.
///
/// Maps the phase-local counter onto the parent's overall counter by adding
/// `offset`; `set_total` is swallowed because the parent announced the
/// combined total up front.
pub struct Phase<'a> {
    parent: &'a dyn ProgressSink,
    offset: usize,
}

impl<'a> Phase<'a> {
    /// Wrap `parent`, shifting every reported step by `offset`.
    pub fn new(parent: &'a dyn ProgressSink, offset: usize) -> Self {
        Self { parent, offset }
    }
}

impl ProgressSink for Phase<'_> {
    fn set_current(&self, current: usize) {
        self.parent.set_current(self.offset + current);
    }

    fn set_note(&self, note: &str) {
        self.parent.set_note(note);
    }

    fn is_cancelled(&self) -> bool {
        self.parent.is_cancelled()
    }
}

/// Forwards only cancellation; used for inner batches whose step counts would
/// otherwise clobber the caller's progress bar.
pub struct Silenced<'a>(pub &'a dyn ProgressSink);

impl ProgressSink for Silenced<'_> {
    fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}
