//! Lock-free log ring for the audio hot path.
//!
//! `push_audio` and `fill_buffer` are forbidden from calling into blocking
//! I/O (§9 "Logging on the hot path"). When either wants to report something
//! noteworthy — a converter mode switch, a dropped write, a generation bump
//! observed — it claims a slot with one atomic fetch-add and copies a
//! fixed-length record in. A background thread drains ready slots in order
//! and forwards them to the `log` facade. No allocation, no syscalls, on the
//! producer/consumer side.
//!
//! Grounded on the teacher family's `AtomicStats` idiom (plain atomics with
//! explicit `Ordering`, no `Mutex`) applied to a bounded MPSC queue instead of
//! a handful of counters.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RECORD_BYTES: usize = 96;
const DEFAULT_CAPACITY: usize = 256;

/// Severity tag carried by a log record. Kept tiny and `Copy` so claiming a
/// slot never allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogLevel {
    Info = 0,
    Warn = 1,
    Error = 2,
}

struct Slot {
    /// Sequence number protocol (Vyukov-style bounded MPSC):
    /// - `seq == index`: slot is free for a producer to claim.
    /// - `seq == index + 1`: slot is full, ready for the drain thread.
    seq: AtomicUsize,
    level: AtomicU32,
    len: AtomicU32,
    data: std::cell::UnsafeCell<[u8; RECORD_BYTES]>,
}

unsafe impl Sync for Slot {}

/// Fixed-capacity bounded MPSC log ring. `push` never blocks: a full ring
/// silently drops the record rather than stalling the caller (an audio hot
/// path must never wait on a background thread).
pub struct LogRing {
    slots: Box<[Slot]>,
    mask: usize,
    enqueue_pos: AtomicUsize,
    dequeue_pos: AtomicUsize,
    dropped: AtomicUsize,
}

impl LogRing {
    pub fn new(capacity_hint: usize) -> Self {
        let capacity = capacity_hint.next_power_of_two().max(2);
        let slots: Vec<Slot> = (0..capacity)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                level: AtomicU32::new(LogLevel::Info as u32),
                len: AtomicU32::new(0),
                data: std::cell::UnsafeCell::new([0u8; RECORD_BYTES]),
            })
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            mask: capacity - 1,
            enqueue_pos: AtomicUsize::new(0),
            dequeue_pos: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Push a record. Truncates messages longer than `RECORD_BYTES`. Never
    /// allocates and never blocks; on contention for a claimed-but-not-yet-
    /// committed slot this spins briefly (bounded by the length of the copy
    /// the other producer is performing, never by I/O).
    pub fn push(&self, level: LogLevel, message: &str) {
        let bytes = message.as_bytes();
        let len = bytes.len().min(RECORD_BYTES);

        let mut pos = self.enqueue_pos.load(Ordering::Relaxed);
        loop {
            let slot = &self.slots[pos & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let diff = seq as isize - pos as isize;
            if diff == 0 {
                if self
                    .enqueue_pos
                    .compare_exchange_weak(pos, pos + 1, Ordering::Relaxed, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe {
                        let dst = &mut *slot.data.get();
                        dst[..len].copy_from_slice(&bytes[..len]);
                    }
                    slot.len.store(len as u32, Ordering::Relaxed);
                    slot.level.store(level as u32, Ordering::Relaxed);
                    slot.seq.store(pos + 1, Ordering::Release);
                    return;
                }
            } else if diff < 0 {
                // Ring is full — drop rather than block the audio path.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            } else {
                pos = self.enqueue_pos.load(Ordering::Relaxed);
            }
        }
    }

    /// Drain one ready record, if any. Called only by the background thread.
    fn try_pop(&self) -> Option<(LogLevel, u32, [u8; RECORD_BYTES])> {
        let pos = self.dequeue_pos.load(Ordering::Relaxed);
        let slot = &self.slots[pos & self.mask];
        let seq = slot.seq.load(Ordering::Acquire);
        let diff = seq as isize - (pos as isize + 1);
        if diff == 0 {
            let level = match slot.level.load(Ordering::Relaxed) {
                1 => LogLevel::Warn,
                2 => LogLevel::Error,
                _ => LogLevel::Info,
            };
            let len = slot.len.load(Ordering::Relaxed);
            let data = unsafe { *slot.data.get() };
            self.dequeue_pos.store(pos + 1, Ordering::Relaxed);
            slot.seq.store(pos + self.mask + 2, Ordering::Release);
            Some((level, len, data))
        } else {
            None
        }
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Owns the ring and the background drain thread. Dropping this stops the
/// thread (best-effort join with a short timeout, matching §5's bounded
/// shutdown-wait policy).
pub struct LogDrain {
    ring: Arc<LogRing>,
    running: Arc<std::sync::atomic::AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LogDrain {
    pub fn spawn(tag: &'static str) -> Self {
        Self::with_capacity(tag, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(tag: &'static str, capacity: usize) -> Self {
        let ring = Arc::new(LogRing::new(capacity));
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));

        let drain_ring = ring.clone();
        let drain_running = running.clone();
        let handle = thread::Builder::new()
            .name(format!("{tag}-log-drain"))
            .spawn(move || {
                while drain_running.load(Ordering::Relaxed) {
                    let mut drained_any = false;
                    while let Some((level, len, data)) = drain_ring.try_pop() {
                        drained_any = true;
                        let text = std::str::from_utf8(&data[..len as usize])
                            .unwrap_or("<non-utf8 log record>");
                        match level {
                            LogLevel::Info => log::info!("[{tag}] {text}"),
                            LogLevel::Warn => log::warn!("[{tag}] {text}"),
                            LogLevel::Error => log::error!("[{tag}] {text}"),
                        }
                    }
                    if !drained_any {
                        thread::sleep(Duration::from_millis(5));
                    }
                }
                // Final drain pass so nothing is lost on shutdown.
                while let Some((level, len, data)) = drain_ring.try_pop() {
                    let text = std::str::from_utf8(&data[..len as usize])
                        .unwrap_or("<non-utf8 log record>");
                    match level {
                        LogLevel::Info => log::info!("[{tag}] {text}"),
                        LogLevel::Warn => log::warn!("[{tag}] {text}"),
                        LogLevel::Error => log::error!("[{tag}] {text}"),
                    }
                }
            })
            .expect("spawning log drain thread");

        Self {
            ring,
            running,
            handle: Some(handle),
        }
    }

    pub fn ring(&self) -> Arc<LogRing> {
        self.ring.clone()
    }
}

impl Drop for LogDrain {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
