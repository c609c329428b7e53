//! State shared between the pipeline stations.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// A value guarded by a lock that threads can block on until it satisfies a
/// predicate. Every change wakes every waiter, which then rechecks.
///
/// Closing the cell releases all current and future waiters whose predicate
/// does not hold.
#[derive(Debug)]
pub struct Watch<T> {
    inner: Mutex<WatchInner<T>>,
    changed: Condvar,
}

#[derive(Debug)]
struct WatchInner<T> {
    value: T,
    closed: bool,
}

impl<T: Copy> Watch<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(WatchInner {
                value,
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock().value
    }

    pub fn set(&self, value: T) {
        self.inner.lock().value = value;
        self.changed.notify_all();
    }

    /// Replace the value with `f(current)` when that returns `Some`, all
    /// under the lock. Returns the value after the call.
    pub fn update(&self, f: impl FnOnce(T) -> Option<T>) -> T {
        let mut inner = self.inner.lock();
        match f(inner.value) {
            Some(next) => {
                inner.value = next;
                drop(inner);
                self.changed.notify_all();
                next
            }
            None => inner.value,
        }
    }

    /// Block until `pred` holds and return the value, or `None` once the
    /// cell is closed.
    pub fn wait_until(&self, mut pred: impl FnMut(T) -> bool) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if pred(inner.value) {
                return Some(inner.value);
            }
            if inner.closed {
                return None;
            }
            self.changed.wait(&mut inner);
        }
    }

    /// [`Watch::wait_until`] with a deadline; `None` also on timeout.
    pub fn wait_until_timeout(
        &self,
        mut pred: impl FnMut(T) -> bool,
        timeout: Duration,
    ) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if pred(inner.value) {
                return Some(inner.value);
            }
            if inner.closed {
                return None;
            }
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return pred(inner.value).then_some(inner.value);
            }
        }
    }

    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.changed.notify_all();
    }
}

/// Capture station state. The recognizer requests transitions; the capture
/// station moves itself from `Prefetching` to `Recording` and back to `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Spawned, device not yet opened.
    Starting,
    /// Idle, waiting to be told to listen.
    Off,
    /// Listening for speech onset.
    Prefetching,
    /// Streaming an utterance downstream.
    Recording,
    /// Dropping the current utterance.
    Aborting,
    /// Terminal.
    Exiting,
}

/// Everything the three stations share besides their queues.
#[derive(Debug)]
pub struct SharedStatus {
    capture: Watch<CaptureState>,
    extraction_done: Watch<bool>,
    running: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self {
            capture: Watch::new(CaptureState::Starting),
            extraction_done: Watch::new(false),
            running: AtomicBool::new(true),
            failure: Mutex::new(None),
        }
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.get()
    }

    /// Request a capture transition. Returns the state actually in effect.
    ///
    /// * `Prefetching` is only entered from `Off` or `Starting`.
    /// * `Recording` is only entered from `Prefetching`.
    /// * `Aborting` is ignored while idle (`Off`, `Starting`).
    /// * `Exiting` is final and releases every waiter.
    pub fn request(&self, target: CaptureState) -> CaptureState {
        use CaptureState::*;

        let mut from = target;
        let now = self.capture.update(|current| {
            from = current;
            let allowed = match (current, target) {
                (Exiting, _) => false,
                (_, Exiting | Off) => true,
                (Off | Starting, Prefetching) => true,
                (Prefetching, Recording) => true,
                (Off | Starting, Aborting) => false,
                (_, Aborting) => true,
                _ => false,
            };
            allowed.then_some(target)
        });

        if now == target && from != target {
            debug!(from = ?from, to = ?now, "capture state");
        }
        if target == Exiting {
            self.running.store(false, Ordering::SeqCst);
            self.capture.close();
            self.extraction_done.close();
        }
        now
    }

    /// Block until the capture state satisfies `pred`; `None` once exiting
    /// (unless `pred` accepts `Exiting`).
    pub fn wait_for_capture(&self, pred: impl FnMut(CaptureState) -> bool) -> Option<CaptureState> {
        self.capture.wait_until(pred)
    }

    pub fn wait_for_capture_timeout(
        &self,
        pred: impl FnMut(CaptureState) -> bool,
        timeout: Duration,
    ) -> Option<CaptureState> {
        self.capture.wait_until_timeout(pred, timeout)
    }

    pub fn extraction_done(&self) -> bool {
        self.extraction_done.get()
    }

    pub fn set_extraction_done(&self, done: bool) {
        self.extraction_done.set(done);
    }

    /// Block until extraction of the current utterance finished. `false`
    /// when the pipeline exits first.
    pub fn wait_extraction_done(&self) -> bool {
        self.extraction_done.wait_until(|done| done).is_some()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Request `Exiting`.
    pub fn shutdown(&self) {
        self.request(CaptureState::Exiting);
    }

    /// Remember why the pipeline stopped. The first failure wins.
    pub fn record_failure(&self, message: impl Into<String>) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(message.into());
        }
    }

    pub fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self::new()
    }
}
