//! Sync Core (§4.4): the two hot-path entries, `push_audio` (producer side,
//! called from the upstream decoder) and `fill_buffer` (consumer side,
//! called from the downstream transport's pull callback), plus the
//! prefill/warmup/running/draining/stopped state machine (§4.4.4) and the
//! underrun counter (§4.4.5) that sit between them.
//!
//! Shared mutable format state crosses from the control thread to the
//! producer/consumer through a single-writer-quiesced cache, the same
//! generation-counter protocol documented in `format::GenerationCounter`:
//! the control thread only ever mutates `FormatWindow`'s fields while
//! holding an `AccessGuard` writer section (so no reader is mid-section),
//! and bumps the generation counter with `Release` immediately after. A
//! reader's `Acquire` load of that counter therefore happens-after the
//! writer's mutation, making the subsequent plain read of the fields safe
//! without a lock — this is the same happens-before argument the teacher
//! family relies on for `SharedRemoteAddr` (`bass-rtp/src/output_new/stream.rs`).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use crate::convert::{self, predicted_output_bytes};
use crate::format::{ConversionMode, GenerationCounter};
use crate::guard::AccessGuard;
use crate::logring::{LogLevel, LogRing};
use crate::ring::Ring;
use crate::state::PlaybackState;

/// Conversion output never exceeds this many bytes per `push_audio` call
/// without being processed in multiple passes. Sized generously against a
/// worst case of a few hundred milliseconds of DSD512 octal-channel audio,
/// which is far more than any single decoder callback delivers in practice.
const SCRATCH_BYTES: usize = 65_536;

/// DSD per-channel carry never exceeds 3 bytes (one 4-byte group minus one
/// byte); 8 channels covers stereo through typical multichannel SACD.
const MAX_DSD_CARRY_CHANNELS: usize = 8;

/// Fields the producer consults every call. Mutated only by the control
/// thread inside a writer section.
#[derive(Clone, Copy)]
pub(crate) struct ProducerFields {
    pub mode: ConversionMode,
    pub channels: u16,
    pub pcm_bytes_per_sample_in: u16,
    pub is_dsd: bool,
    pub prefill_target: usize,
}

impl Default for ProducerFields {
    fn default() -> Self {
        Self {
            mode: ConversionMode::PcmCopy,
            channels: 2,
            pcm_bytes_per_sample_in: 2,
            is_dsd: false,
            prefill_target: 0,
        }
    }
}

/// Fields the consumer consults every call.
#[derive(Clone, Copy)]
pub(crate) struct ConsumerFields {
    pub bytes_per_buffer: usize,
    pub silence_byte: u8,
    pub is_dsd: bool,
    pub warmup_target: u32,
}

impl Default for ConsumerFields {
    fn default() -> Self {
        Self {
            bytes_per_buffer: 0,
            silence_byte: 0,
            is_dsd: false,
            warmup_target: 0,
        }
    }
}

struct FormatWindow {
    producer: UnsafeCell<ProducerFields>,
    consumer: UnsafeCell<ConsumerFields>,
}

// Safety: mutated only inside `SyncCore::reconfigure`'s writer section
// (no reader section can be concurrently open), and only ever read by the
// producer/consumer after observing the matching generation bump via an
// `Acquire` load — see the module doc comment.
unsafe impl Sync for FormatWindow {}

impl FormatWindow {
    fn new() -> Self {
        Self {
            producer: UnsafeCell::new(ProducerFields::default()),
            consumer: UnsafeCell::new(ConsumerFields::default()),
        }
    }
}

/// Point-in-time counters for diagnostics (session statistics, a
/// supplemented feature — spec.md is silent on what the control plane
/// surfaces besides transport state, so this is populated from the atomics
/// the core already keeps for its own bookkeeping).
#[derive(Debug, Clone, Copy, Default)]
pub struct CoreStats {
    pub state: u8,
    pub underruns: u64,
    pub ring_available: usize,
    pub ring_capacity: usize,
}

/// Owns the ring, the reconfiguration barrier, and every piece of state
/// shared between the producer and consumer sides. Created once per
/// renderer instance; tracks reopen across multiple playback sessions.
pub struct SyncCore {
    ring: Ring,
    guard: AccessGuard,
    producer_generation: GenerationCounter,
    consumer_generation: GenerationCounter,
    window: FormatWindow,

    state: AtomicU8,
    stop_requested: AtomicBool,
    draining: AtomicBool,
    online: AtomicBool,
    prefill_complete: AtomicBool,
    warmup_remaining: AtomicU32,
    silence_remaining: AtomicU32,
    underrun_count: AtomicU64,

    producer_taken: AtomicBool,
    consumer_taken: AtomicBool,

    log: Arc<LogRing>,
}

impl SyncCore {
    pub fn new(ring_capacity_hint: usize, silence_byte: u8, log: Arc<LogRing>) -> Self {
        Self {
            ring: Ring::new(ring_capacity_hint, silence_byte),
            guard: AccessGuard::new(),
            producer_generation: GenerationCounter::new(),
            consumer_generation: GenerationCounter::new(),
            window: FormatWindow::new(),
            state: AtomicU8::new(PlaybackState::Idle as u8),
            stop_requested: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            online: AtomicBool::new(false),
            prefill_complete: AtomicBool::new(false),
            warmup_remaining: AtomicU32::new(0),
            silence_remaining: AtomicU32::new(0),
            underrun_count: AtomicU64::new(0),
            producer_taken: AtomicBool::new(false),
            consumer_taken: AtomicBool::new(false),
            log,
        }
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    /// §4.4.5: "drained (exchange to 0) and reported at `stop_playback()`."
    /// Returns the tally accumulated since the last call and resets it.
    pub fn take_underrun_count(&self) -> u64 {
        self.underrun_count.swap(0, Ordering::Relaxed)
    }

    pub fn stats(&self) -> CoreStats {
        CoreStats {
            state: self.state.load(Ordering::Acquire),
            underruns: self.underrun_count.load(Ordering::Relaxed),
            ring_available: self.ring.available(),
            ring_capacity: self.ring.capacity(),
        }
    }

    /// Requests the consumer wind down. `silence_buffers` is how many
    /// buffers of cached silence `fill_buffer` should emit before settling
    /// into `Stopped` (§4.5/§4.6 "silence buffers before a transition").
    pub fn request_drain(&self, silence_buffers: u32) {
        self.silence_remaining.store(silence_buffers, Ordering::Release);
        self.draining.store(true, Ordering::Release);
        self.state.store(PlaybackState::Draining as u8, Ordering::Release);
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.state.store(PlaybackState::Stopped as u8, Ordering::Release);
    }

    /// Clears stop/drain flags and re-arms prefill/warmup ahead of a new
    /// track. Called by the orchestrator immediately after `reconfigure`.
    pub(crate) fn arm_track(&self, warmup_target: u32) {
        self.stop_requested.store(false, Ordering::Release);
        self.draining.store(false, Ordering::Release);
        self.silence_remaining.store(0, Ordering::Release);
        self.prefill_complete.store(false, Ordering::Release);
        self.warmup_remaining.store(warmup_target, Ordering::Release);
        self.state.store(PlaybackState::Prefilling as u8, Ordering::Release);
    }

    /// Performs the reconfiguration write under the `AccessGuard` barrier
    /// (§4.3/§4.5): mutate the cached fields and, if given, resize/clear the
    /// ring, then bump both generation counters before releasing the
    /// barrier.
    ///
    /// Takes `&self`, not `&mut self`: the control thread calling this holds
    /// only a shared `Arc<SyncCore>` once the producer and consumer threads
    /// have taken their handles, so there is no `&mut SyncCore` to be had.
    /// Safety is provided by the `AccessGuard` writer section instead — see
    /// `FormatWindow`'s and `Ring::resize`'s doc comments.
    pub(crate) fn reconfigure(
        &self,
        producer: ProducerFields,
        consumer: ConsumerFields,
        new_ring_capacity: Option<usize>,
    ) {
        let writer = self.guard.begin_reconfigure();
        unsafe {
            *self.window.producer.get() = producer;
            *self.window.consumer.get() = consumer;
        }
        if let Some(capacity) = new_ring_capacity {
            self.ring.resize(capacity, consumer.silence_byte);
        } else {
            self.ring.clear();
        }
        self.producer_generation.bump();
        self.consumer_generation.bump();
        drop(writer);
        self.log.push(LogLevel::Info, "reconfigured sync core");
    }

    /// Hands out the single producer-side handle. Panics if called twice —
    /// the producer role is owned by exactly one upstream decoder thread
    /// for the lifetime of the core.
    pub fn producer(&self) -> ProducerHandle<'_> {
        if self.producer_taken.swap(true, Ordering::AcqRel) {
            panic!("SyncCore::producer() called more than once");
        }
        ProducerHandle {
            core: self,
            cached_generation: 0,
            cached: ProducerFields::default(),
            scratch: vec![0u8; SCRATCH_BYTES].into_boxed_slice(),
            pcm_carry: Vec::with_capacity(32),
            dsd_carry: [[0u8; 3]; MAX_DSD_CARRY_CHANNELS],
            dsd_carry_len: 0,
            produced_since_prefill: 0,
        }
    }

    /// Hands out the single consumer-side handle. Panics if called twice —
    /// the consumer role is owned by exactly one downstream transport pull
    /// callback for the lifetime of the core.
    ///
    /// Attempts to elevate the calling thread's scheduling priority (§5/§9
    /// "Priority policy") since this handle is taken from the thread that
    /// will go on to call `fill_buffer` on the transport's cycle clock. A
    /// denial is logged once, never retried, and never fatal — the consumer
    /// runs at default priority instead.
    pub fn consumer(&self) -> ConsumerHandle<'_> {
        if self.consumer_taken.swap(true, Ordering::AcqRel) {
            panic!("SyncCore::consumer() called more than once");
        }
        if let Err(reason) = crate::priority::elevate_current_thread() {
            self.log.push(
                LogLevel::Warn,
                &format!("could not obtain real-time scheduling priority: {reason}"),
            );
        }
        ConsumerHandle {
            core: self,
            cached_generation: 0,
            cached: ConsumerFields::default(),
        }
    }
}

/// Producer-side handle (§4.4.1). Not `Clone`, not `Sync` — exactly one
/// upstream decoder thread owns this.
pub struct ProducerHandle<'a> {
    core: &'a SyncCore,
    cached_generation: u32,
    cached: ProducerFields,
    /// Conversion output staging, used only when the ring's contiguous
    /// write region is too small to convert directly into.
    scratch: Box<[u8]>,
    /// PCM carry: leftover interleaved bytes that didn't form a whole frame
    /// last call.
    pcm_carry: Vec<u8>,
    /// DSD carry: leftover bytes per channel plane (at most 3, since a group
    /// is 4 bytes) that didn't form a whole group last call.
    dsd_carry: [[u8; 3]; MAX_DSD_CARRY_CHANNELS],
    dsd_carry_len: usize,
    produced_since_prefill: usize,
}

impl ProducerHandle<'_> {
    fn refresh_cache_if_stale(&mut self) {
        let generation = self.core.producer_generation.load();
        if generation != self.cached_generation {
            self.cached = unsafe { *self.core.window.producer.get() };
            self.cached_generation = generation;
            // A format change invalidates any carried partial frame from the
            // previous format, and restarts prefill accounting for the new
            // track (§8: "first push after `open` never flips
            // `prefill_complete` unless the one push alone reaches prefill
            // target" — that only holds if the tally starts at zero here).
            self.pcm_carry.clear();
            self.dsd_carry_len = 0;
            self.produced_since_prefill = 0;
        }
    }

    /// §4.4.1. Converts `n_samples` worth of `src` through the cached
    /// conversion mode and writes the result into the ring. Returns the
    /// number of output bytes actually written (which may be less than the
    /// converter produced, if the ring had no room — flow control, not an
    /// error).
    ///
    /// Bars progress (returns 0) while stopped, draining, or the downstream
    /// transport is offline, and while a reconfiguration is in progress.
    pub fn push_audio(&mut self, src: &[u8], n_samples: usize) -> usize {
        if self.core.stop_requested.load(Ordering::Acquire)
            || self.core.draining.load(Ordering::Acquire)
            || !self.core.online.load(Ordering::Acquire)
        {
            return 0;
        }
        let section = match self.core.guard.try_enter() {
            Some(s) => s,
            None => return 0,
        };

        self.refresh_cache_if_stale();

        let written = if self.cached.is_dsd {
            self.push_dsd(src, n_samples)
        } else {
            self.push_pcm(src, n_samples)
        };

        if !self.core.prefill_complete.load(Ordering::Acquire) {
            self.produced_since_prefill += written;
            if self.produced_since_prefill >= self.cached.prefill_target {
                self.core.prefill_complete.store(true, Ordering::Release);
            }
        }

        drop(section);
        written
    }

    fn write_to_ring(&mut self, mode: ConversionMode, input: &[u8], channels: u16, frame_in: u16) -> usize {
        let predicted = predicted_output_bytes(mode, input.len(), channels, frame_in);
        if predicted == 0 {
            return 0;
        }
        let mut region = self.core.ring.write_region();
        if region.len() >= predicted {
            let written = unsafe { convert::convert(mode, region.as_mut_slice(), input, channels, frame_in as usize) };
            self.core.ring.commit_write(written);
            written
        } else {
            let cap = predicted.min(self.scratch.len());
            let written = convert::convert(mode, &mut self.scratch[..cap], input, channels, frame_in as usize);
            self.core.ring.push(&self.scratch[..written], written)
        }
    }

    fn push_pcm(&mut self, src: &[u8], n_samples: usize) -> usize {
        let channels = self.cached.channels;
        let bytes_in = self.cached.pcm_bytes_per_sample_in;
        let (frame_in, frame_out) = convert::frame_sizes(self.cached.mode, channels, bytes_in);
        if frame_in == 0 {
            return 0;
        }
        // `n_samples` is frames (per-channel sample count); bound `src` to
        // exactly the bytes it implies rather than trusting its full length,
        // in case the caller over-allocated the slice.
        let n_in_bytes = (n_samples * frame_in).min(src.len());
        let src = &src[..n_in_bytes];

        if self.pcm_carry.is_empty() {
            let frames = src.len() / frame_in;
            let consumed = frames * frame_in;
            let written = self.write_to_ring(self.cached.mode, &src[..consumed], channels, bytes_in);
            self.pcm_carry.extend_from_slice(&src[consumed..]);
            let _ = frame_out;
            written
        } else {
            let budget = self.scratch.len().min(self.pcm_carry.len() + src.len());
            if self.pcm_carry.len() + src.len() > self.scratch.len() {
                self.core.log.push(LogLevel::Warn, "pcm carry combine exceeds scratch capacity, truncating");
            }
            let mut combined = Vec::with_capacity(budget);
            combined.extend_from_slice(&self.pcm_carry);
            let room = budget.saturating_sub(self.pcm_carry.len());
            combined.extend_from_slice(&src[..room.min(src.len())]);

            let frames = combined.len() / frame_in;
            let consumed = frames * frame_in;
            let written = self.write_to_ring(self.cached.mode, &combined[..consumed], channels, bytes_in);

            // `combined[consumed..]` is the entire unconsumed remainder of
            // `carry ++ src[..room]`; only the part of `src` that didn't fit
            // into `combined` (the scratch-overflow case) is still missing.
            self.pcm_carry.clear();
            self.pcm_carry.extend_from_slice(&combined[consumed..]);
            if room < src.len() {
                self.pcm_carry.extend_from_slice(&src[room..]);
            }
            written
        }
    }

    fn push_dsd(&mut self, src: &[u8], n_samples: usize) -> usize {
        let channels = (self.cached.channels as usize).max(1);
        // `n_samples` for DSD is the total bit count across channels divided
        // by 8 per §6's ingress contract (`total_bytes = n_samples *
        // channels / 8`); clamp to the slice actually supplied.
        let n_in_bytes = (n_samples * channels / 8).min(src.len());
        let src = &src[..n_in_bytes];
        if channels > MAX_DSD_CARRY_CHANNELS {
            // Outside the carry table's span: fall back to whole-group
            // rounding with no cross-call carry, same as the PCM fast path
            // would if carry were disabled.
            return self.write_to_ring(self.cached.mode, src, self.cached.channels, 4);
        }
        let plane_len = src.len() / channels;

        if self.dsd_carry_len == 0 {
            let written = self.write_to_ring(self.cached.mode, src, self.cached.channels, 4);
            let tail = plane_len % 4;
            if tail > 0 {
                for c in 0..channels {
                    let start = c * plane_len + plane_len - tail;
                    self.dsd_carry[c][..tail].copy_from_slice(&src[start..start + tail]);
                }
                self.dsd_carry_len = tail;
            }
            written
        } else {
            let carry_len = self.dsd_carry_len;
            let combined_plane_len = carry_len + plane_len;
            let combined_total = combined_plane_len * channels;

            if combined_total > self.scratch.len() {
                // Pathologically small per-call input relative to channel
                // count; drop the carry rather than grow unboundedly.
                self.core.log.push(LogLevel::Warn, "dsd carry overflow, dropping remainder");
                self.dsd_carry_len = 0;
                return self.write_to_ring(self.cached.mode, src, self.cached.channels, 4);
            }

            let mut combine_buf = vec![0u8; combined_total];
            for c in 0..channels {
                let dst_off = c * combined_plane_len;
                combine_buf[dst_off..dst_off + carry_len].copy_from_slice(&self.dsd_carry[c][..carry_len]);
                combine_buf[dst_off + carry_len..dst_off + combined_plane_len]
                    .copy_from_slice(&src[c * plane_len..(c + 1) * plane_len]);
            }

            let written = self.write_to_ring(self.cached.mode, &combine_buf, self.cached.channels, 4);

            let tail = combined_plane_len % 4;
            self.dsd_carry_len = tail;
            if tail > 0 {
                for c in 0..channels {
                    let start = c * combined_plane_len + combined_plane_len - tail;
                    self.dsd_carry[c][..tail].copy_from_slice(&combine_buf[start..start + tail]);
                }
            }
            written
        }
    }
}

/// Consumer-side handle (§4.4.2). Not `Clone`, not `Sync` — exactly one
/// downstream transport pull callback owns this.
pub struct ConsumerHandle<'a> {
    core: &'a SyncCore,
    cached_generation: u32,
    cached: ConsumerFields,
}

impl ConsumerHandle<'_> {
    fn refresh_cache_if_stale(&mut self) {
        let generation = self.core.consumer_generation.load();
        if generation != self.cached_generation {
            self.cached = unsafe { *self.core.window.consumer.get() };
            self.cached_generation = generation;
        }
    }

    /// §4.4.2. Fills `dst` completely, always — a short pull-callback
    /// buffer is a protocol violation that doesn't happen in practice, but
    /// `fill_buffer` still fills from the ring when it can and pads the
    /// remainder with cached silence otherwise, rather than ever returning
    /// a partial buffer. Returns the number of bytes that came from real
    /// audio (the rest is the configured silence byte).
    pub fn fill_buffer(&mut self, dst: &mut [u8]) -> usize {
        self.refresh_cache_if_stale();

        // §4.4.2 step 1's cached `bytes_per_buffer` is the size negotiation
        // fixed for this format; the transport is expected to pull exactly
        // that every cycle. A mismatch doesn't stop delivery (the ring logic
        // below already fills whatever `dst.len()` it's given) but it means
        // the transport and the negotiated sink format have drifted apart,
        // which is worth a log line since it never happens in practice.
        if self.cached.bytes_per_buffer != 0 && dst.len() != self.cached.bytes_per_buffer {
            self.core.log.push(
                LogLevel::Warn,
                "fill_buffer called with a size that doesn't match the negotiated bytes_per_buffer",
            );
        }

        if self.core.stop_requested.load(Ordering::Acquire) {
            dst.fill(self.cached.silence_byte);
            return 0;
        }

        if self.core.draining.load(Ordering::Acquire) {
            let remaining = self.core.silence_remaining.load(Ordering::Acquire);
            if remaining == 0 {
                self.core.state.store(PlaybackState::Stopped as u8, Ordering::Release);
                dst.fill(self.cached.silence_byte);
                return 0;
            }
            self.core.silence_remaining.store(remaining - 1, Ordering::Release);
            dst.fill(self.cached.silence_byte);
            return 0;
        }

        if !self.core.prefill_complete.load(Ordering::Acquire) {
            dst.fill(self.cached.silence_byte);
            return 0;
        }

        let warmup_remaining = self.core.warmup_remaining.load(Ordering::Acquire);
        if warmup_remaining > 0 {
            self.core.warmup_remaining.store(warmup_remaining - 1, Ordering::Release);
            if warmup_remaining == 1 {
                self.core.state.store(PlaybackState::Running as u8, Ordering::Release);
            } else {
                self.core.state.store(PlaybackState::Warmup as u8, Ordering::Release);
            }
            dst.fill(self.cached.silence_byte);
            return 0;
        }

        let section = match self.core.guard.try_enter() {
            Some(s) => s,
            None => {
                dst.fill(self.cached.silence_byte);
                return 0;
            }
        };

        let available = self.core.ring.available();
        let read = if available >= dst.len() {
            self.core.ring.pop(dst, dst.len())
        } else {
            self.core.underrun_count.fetch_add(1, Ordering::Relaxed);
            let read = self.core.ring.pop(dst, available);
            dst[read..].fill(self.cached.silence_byte);
            read
        };

        drop(section);
        read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logring::LogRing;

    fn pcm_core(bytes_per_buffer: usize, prefill_target: usize) -> SyncCore {
        let core = SyncCore::new(4096, 0, Arc::new(LogRing::new(64)));
        let producer = ProducerFields {
            mode: ConversionMode::PcmCopy,
            channels: 2,
            pcm_bytes_per_sample_in: 2,
            is_dsd: false,
            prefill_target,
        };
        let consumer = ConsumerFields {
            bytes_per_buffer,
            silence_byte: 0,
            is_dsd: false,
            warmup_target: 2,
        };
        let mut core = core;
        core.reconfigure(producer, consumer, None);
        core.arm_track(2);
        core.set_online(true);
        core
    }

    #[test]
    fn push_then_fill_roundtrips_bytes() {
        let core = pcm_core(8, 4);
        let mut producer = core.producer();
        let mut consumer = core.consumer();

        let src = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let written = producer.push_audio(&src, 2); // 2 stereo frames
        assert_eq!(written, 8);

        // Still prefilling (target 4, only satisfied once >= 4 bytes
        // written, which already happened) — next call enters warmup.
        let mut dst = [0xFFu8; 8];
        let read = consumer.fill_buffer(&mut dst);
        // Either prefill just completed (still 0, silence) or warmup
        // consumes a silence buffer; either way this call never reads real
        // ring bytes yet since warmup_target is 2.
        assert_eq!(read, 0);
    }

    #[test]
    fn fill_buffer_emits_real_audio_once_warmup_drains() {
        let core = pcm_core(8, 1);
        let mut producer = core.producer();
        let mut consumer = core.consumer();

        producer.push_audio(&[1, 2, 3, 4, 5, 6, 7, 8], 2);

        let mut dst = [0xFFu8; 8];
        consumer.fill_buffer(&mut dst); // warmup slot 1 of 2
        consumer.fill_buffer(&mut dst); // warmup slot 2 of 2, -> Running
        assert_eq!(core.state(), PlaybackState::Running);

        let read = consumer.fill_buffer(&mut dst);
        assert_eq!(read, 8);
        assert_eq!(dst, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn underrun_increments_when_ring_is_short() {
        let core = pcm_core(8, 1);
        let mut producer = core.producer();
        let mut consumer = core.consumer();

        // One buffer's worth of real audio, enough to clear prefill and
        // satisfy exactly the first post-warmup read.
        producer.push_audio(&[1, 2, 3, 4, 5, 6, 7, 8], 2);

        let mut dst = [0xFFu8; 8];
        consumer.fill_buffer(&mut dst); // warmup slot 1 of 2
        consumer.fill_buffer(&mut dst); // warmup slot 2 of 2, -> Running
        consumer.fill_buffer(&mut dst); // drains the one real buffer, no underrun yet
        assert_eq!(core.underrun_count(), 0);

        let read = consumer.fill_buffer(&mut dst); // ring now empty
        assert_eq!(read, 0);
        assert_eq!(dst, [0u8; 8]);
        assert_eq!(core.underrun_count(), 1);
    }

    #[test]
    fn push_audio_bars_progress_while_offline() {
        let core = pcm_core(8, 4);
        core.set_online(false);
        let mut producer = core.producer();
        let written = producer.push_audio(&[1, 2, 3, 4], 1);
        assert_eq!(written, 0);
    }

    #[test]
    fn misaligned_pcm_push_then_another_push_preserves_byte_order() {
        // Each push leaves a partial-frame carry that must combine with the
        // next call's bytes exactly once, never duplicated into the stream.
        let core = pcm_core(8, 1000);
        let mut producer = core.producer();

        // 6 bytes: one whole 4-byte frame plus a 2-byte carry ([5, 6]).
        producer.push_audio(&[1, 2, 3, 4, 5, 6], 2);
        assert_eq!(core.ring.available(), 4);

        // Combines the 2-byte carry with 5 more bytes: another whole frame
        // plus a 3-byte carry ([9, 10, 11]).
        producer.push_audio(&[7, 8, 9, 10, 11], 2);
        assert_eq!(core.ring.available(), 8);

        // Completes the next frame exactly; carry empties out.
        producer.push_audio(&[12], 1);
        assert_eq!(core.ring.available(), 12);

        let mut dst = [0u8; 12];
        core.ring.pop(&mut dst, 12);
        assert_eq!(dst, [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn reconfigure_resets_prefill_tally_so_stale_bytes_dont_carry_over() {
        // A producer handle that already satisfied a low prefill target on
        // one track must not carry that tally into the next track's higher
        // target — §8: "first push after `open` never flips
        // `prefill_complete` unless the one push alone reaches prefill
        // target."
        let core = pcm_core(8, 4);
        let mut producer = core.producer();
        producer.push_audio(&[1, 2, 3, 4, 5, 6, 7, 8], 2); // satisfies target 4
        assert!(core.prefill_complete.load(Ordering::Acquire));

        let producer_fields = ProducerFields {
            mode: ConversionMode::PcmCopy,
            channels: 2,
            pcm_bytes_per_sample_in: 2,
            is_dsd: false,
            prefill_target: 100,
        };
        let consumer_fields = ConsumerFields {
            bytes_per_buffer: 8,
            silence_byte: 0,
            is_dsd: false,
            warmup_target: 2,
        };
        core.reconfigure(producer_fields, consumer_fields, None);
        core.arm_track(2);
        assert!(!core.prefill_complete.load(Ordering::Acquire));

        // A single small push toward the new, much higher target must not
        // flip prefill_complete on the strength of the old track's tally.
        producer.push_audio(&[1, 2, 3, 4], 1);
        assert!(!core.prefill_complete.load(Ordering::Acquire));
    }

    #[test]
    fn drain_then_stop_emits_silence_and_settles() {
        let core = pcm_core(8, 1);
        let mut consumer = core.consumer();
        core.request_drain(1);
        assert_eq!(core.state(), PlaybackState::Draining);

        let mut dst = [0xFFu8; 8];
        let read = consumer.fill_buffer(&mut dst);
        assert_eq!(read, 0);
        assert_eq!(dst, [0u8; 8]);

        consumer.fill_buffer(&mut dst);
        assert_eq!(core.state(), PlaybackState::Stopped);
    }

    #[test]
    fn dsd_carry_preserves_bytes_across_misaligned_calls() {
        let core = SyncCore::new(4096, 0, Arc::new(LogRing::new(64)));
        let producer_fields = ProducerFields {
            mode: ConversionMode::DsdPassthrough,
            channels: 2,
            pcm_bytes_per_sample_in: 0,
            is_dsd: true,
            prefill_target: 0,
        };
        let consumer_fields = ConsumerFields {
            bytes_per_buffer: 8,
            silence_byte: 0,
            is_dsd: true,
            warmup_target: 0,
        };
        let mut core = core;
        core.reconfigure(producer_fields, consumer_fields, None);
        core.arm_track(0);
        core.set_online(true);

        let mut producer = core.producer();
        // Two channels, plane length 6 bytes each (one whole 4-byte group +
        // 2-byte remainder per plane).
        // n_samples = total_bytes * 8 / channels = 12 * 8 / 2 = 48.
        let first = [1u8, 2, 3, 4, 5, 6, 11, 12, 13, 14, 15, 16];
        let written_first = producer.push_audio(&first, 48);
        assert_eq!(written_first, 8); // one group per channel, interleaved

        // Second call supplies the matching 2-byte completion of the
        // previous remainder plus a fresh whole group, per plane.
        let second = [7u8, 8, 21, 22, 23, 24, 17, 18, 31, 32, 33, 34];
        let written_second = producer.push_audio(&second, 48);
        // Combining the 2-byte-per-channel carry with this call's two
        // 6-byte planes yields two whole groups (8 bytes/plane -> 2 groups).
        assert_eq!(written_second, 16);

        let mut consumer = core.consumer();
        let mut out = [0u8; 16];
        consumer.fill_buffer(&mut out[..8]);
        consumer.fill_buffer(&mut out[8..]);
        // Channel 0 bytes 1..8 interleaved with channel 1 bytes in groups of 4.
        assert_eq!(&out[0..4], &[1, 2, 3, 4]);
        assert_eq!(&out[4..8], &[11, 12, 13, 14]);
        assert_eq!(&out[8..12], &[5, 6, 7, 8]);
        assert_eq!(&out[12..16], &[15, 16, 17, 18]);
    }
}
