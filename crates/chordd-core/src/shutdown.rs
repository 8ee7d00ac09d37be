#![forbid(unsafe_code)]

//! Cooperative shutdown signalling for processor loops and device readers.
//!
//! [`ShutdownSource`] is held by whoever orchestrates the process lifetime;
//! [`ShutdownToken`]s are cloned into background threads, which poll
//! [`is_requested`](ShutdownToken::is_requested) between units of work or
//! park in [`wait_timeout`](ShutdownToken::wait_timeout) when they have
//! nothing to do. Requesting shutdown wakes every parked waiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct Shared {
    requested: AtomicBool,
    notify: (Mutex<()>, Condvar),
}

/// The requesting side. Dropping the source does not signal anything;
/// shutdown only happens through an explicit [`request`](Self::request).
pub struct ShutdownSource {
    shared: Arc<Shared>,
}

/// A cloneable observer of one [`ShutdownSource`].
#[derive(Clone)]
pub struct ShutdownToken {
    shared: Arc<Shared>,
}

impl ShutdownSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                requested: AtomicBool::new(false),
                notify: (Mutex::new(()), Condvar::new()),
            }),
        }
    }

    #[must_use]
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Signal shutdown. Idempotent; wakes all pending timed waits.
    pub fn request(&self) {
        self.shared.requested.store(true, Ordering::Release);
        let (lock, cvar) = &self.shared.notify;
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        cvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        self.shared.requested.load(Ordering::Acquire)
    }
}

impl Default for ShutdownSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    #[inline]
    pub fn is_requested(&self) -> bool {
        self.shared.requested.load(Ordering::Acquire)
    }

    /// Park until shutdown is requested or `duration` elapses.
    ///
    /// Returns `true` when shutdown was requested, `false` on timeout.
    /// Spurious condvar wakeups re-enter the wait with the remaining time.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        let (lock, cvar) = &self.shared.notify;
        let mut guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        let start = Instant::now();
        loop {
            if self.is_requested() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            let (next, result) = cvar
                .wait_timeout(guard, duration - elapsed)
                .unwrap_or_else(|e| e.into_inner());
            guard = next;
            if result.timed_out() && !self.is_requested() {
                return false;
            }
        }
    }
}
