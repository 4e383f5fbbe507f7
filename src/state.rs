//! Consumer state machine (§4.4.4) and the pure calculators behind it:
//! MTU-scaled warmup targets (§4.4.3) and prefill targets (§4.4.6).
//!
//! The enum below carries no payload for `Warmup`/`Draining` — their
//! "remaining" counters are atomics living alongside it on `SyncCore`
//! (`warmup_remaining`, `silence_remaining`), matching how every stat in the
//! teacher family (`AtomicStats`, `SharedRemoteAddr`) is a flat struct of
//! independently-ordered atomics rather than a single tagged value, which a
//! mutable-in-place state machine like this one needs.

use crate::format::Format;
use crate::config::{PrefillPolicy, WarmupPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackState {
    Idle = 0,
    Prefilling = 1,
    Warmup = 2,
    Running = 3,
    Draining = 4,
    Stopped = 5,
}

impl PlaybackState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => PlaybackState::Idle,
            1 => PlaybackState::Prefilling,
            2 => PlaybackState::Warmup,
            3 => PlaybackState::Running,
            4 => PlaybackState::Draining,
            _ => PlaybackState::Stopped,
        }
    }
}

/// §4.4.6: `prefill_target = clamp(calculated_from_bytes_per_second, max =
/// ring.capacity / 4)`.
pub fn prefill_target_bytes(format: &Format, ring_capacity: usize, policy: &PrefillPolicy) -> usize {
    let bytes_per_second = format.bytes_per_second();
    let ms = if format.is_dsd {
        policy.dsd_ms
    } else if format.rate_hz <= policy.low_rate_threshold_hz {
        policy.low_rate_pcm_ms
    } else {
        policy.normal_pcm_ms
    };
    let calculated = ((bytes_per_second * ms as u64) / 1000) as usize;
    calculated.min(ring_capacity / 4)
}

/// §4.4.3: target warmup buffer count for a DSD stream. `effective_mtu` is
/// the transport's negotiated MTU; overhead is subtracted before computing
/// the per-cycle byte budget.
pub fn dsd_warmup_target_buffers(
    format: &Format,
    effective_mtu: u32,
    policy: &WarmupPolicy,
) -> u32 {
    debug_assert!(format.is_dsd);
    let target_ms = 50 * format.dsd_rate_multiplier();
    let bytes_per_second = format.bytes_per_second();
    let cycle_bytes = (effective_mtu as i64 - policy.mtu_overhead_bytes as i64).max(1) as u64;
    let cycle_us = (cycle_bytes * 1_000_000) / bytes_per_second.max(1);
    let target_buffers = (target_ms as u64 * 1000).div_ceil(cycle_us.max(1));
    (target_buffers as u32).clamp(policy.min_buffers, policy.max_buffers)
}

/// PCM warmup target is a constant from configuration — no MTU scaling.
pub fn pcm_warmup_target_buffers(policy: &WarmupPolicy) -> u32 {
    policy.pcm_buffer_count.clamp(policy.min_buffers, policy.max_buffers)
}
