//! Cooperative cancellation.
//!
//! The engine checks the flag before every file and sleeps on it between
//! periodic cycles; a request wakes that sleep immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Interrupt flag owned by one engine instance.
#[derive(Debug, Default)]
pub struct CancellationFlag {
    requested: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an interrupt. Idempotent.
    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // Taking the lock orders this notify after any in-progress wait check
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wakeup.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Clear the flag before a new run.
    pub fn reset(&self) {
        self.requested.store(false, Ordering::SeqCst);
    }

    /// Block for up to `timeout`, returning early on an interrupt.
    ///
    /// Returns true if an interrupt was requested. A timeout too large to
    /// express as an `Instant` waits for an interrupt only.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_requested() {
            guard = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.wakeup
                        .wait_timeout(guard, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .wakeup
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
        self.is_requested()
    }
}

/// Cloneable handle a caller keeps to interrupt a running engine.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    flag: Arc<CancellationFlag>,
}

impl InterruptHandle {
    pub(crate) fn new(flag: Arc<CancellationFlag>) -> Self {
        InterruptHandle { flag }
    }

    /// Ask the engine to stop at its next checkpoint.
    pub fn request(&self) {
        self.flag.request();
    }

    pub fn is_requested(&self) -> bool {
        self.flag.is_requested()
    }
}
