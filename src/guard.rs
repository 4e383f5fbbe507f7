//! Reconfiguration barrier (§4.3) — a lightweight read/write lock specialized
//! for one rare writer (the control thread) and two frequent readers (the
//! producer and consumer entries). Neither reader ever blocks: on contention
//! with an in-progress reconfiguration they bail out to their caller's
//! no-op path (return 0 bytes / emit cached silence) instead of spinning.
//!
//! Grounded on the teacher family's plain-atomics-with-explicit-`Ordering`
//! style (`bass-aes67/src/lib.rs`'s `INITIALIZED: AtomicBool`,
//! `bass-rtp`'s `AtomicStats`) — no `Mutex`, no `RwLock`, just two atomics
//! and a documented protocol.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct AccessGuard {
    reconfiguring: AtomicBool,
    users: AtomicUsize,
}

impl AccessGuard {
    pub const fn new() -> Self {
        Self {
            reconfiguring: AtomicBool::new(false),
            users: AtomicUsize::new(0),
        }
    }

    /// Attempts to enter a ring-accessing section. Returns `None` if a
    /// reconfiguration is in progress — the caller's no-op path applies.
    /// Never blocks.
    #[inline]
    pub fn try_enter(&self) -> Option<Section<'_>> {
        if self.reconfiguring.load(Ordering::Acquire) {
            return None;
        }
        self.users.fetch_add(1, Ordering::Acquire);
        if self.reconfiguring.load(Ordering::Acquire) {
            // The section never touched the ring — no work to publish.
            self.users.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        Some(Section { guard: self })
    }

    /// True while a reconfiguration is in progress. Observational only —
    /// never used to gate entry (that's `try_enter`'s job); exposed for
    /// stats/diagnostics.
    pub fn is_reconfiguring(&self) -> bool {
        self.reconfiguring.load(Ordering::Acquire)
    }

    /// Begins the writer protocol: announce intent, then spin-with-yield
    /// until every in-flight reader section has exited. Only the control
    /// thread may call this.
    pub fn begin_reconfigure(&self) -> ReconfigureWriter<'_> {
        self.reconfiguring.store(true, Ordering::Release);
        let mut spins = 0u32;
        while self.users.load(Ordering::Acquire) != 0 {
            spins += 1;
            if spins < 1000 {
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
        ReconfigureWriter { guard: self }
    }
}

impl Default for AccessGuard {
    fn default() -> Self {
        Self::new()
    }
}

/// A successfully-entered reader section. Dropping it publishes the work
/// done inside (release store) so the next reconfiguration observes it.
pub struct Section<'a> {
    guard: &'a AccessGuard,
}

impl Drop for Section<'_> {
    fn drop(&mut self) {
        self.guard.users.fetch_sub(1, Ordering::Release);
    }
}

/// Held by the control thread for the duration of a reconfiguration.
/// Dropping it clears `reconfiguring`, synchronizing with readers' next
/// `try_enter` attempt.
pub struct ReconfigureWriter<'a> {
    guard: &'a AccessGuard,
}

impl Drop for ReconfigureWriter<'_> {
    fn drop(&mut self) {
        self.guard.reconfiguring.store(false, Ordering::Release);
    }
}
