//! Centralized tunables (§4.4.6, §4.5, §4.6, §9). The spec repeatedly calls
//! these out as "not normative" / "external calibration constants" / "empirical,
//! treat as tunables" — gathering them here (rather than inlining magic
//! numbers at each call site, as several single-purpose teacher constants
//! do) keeps the orchestrator and consumer state machine directly testable
//! against the literal §8 scenarios.

use std::time::Duration;

/// §4.4.6 prefill target policy. `prefill_target` never exceeds
/// `ring.capacity() / 4` regardless of which bucket applies.
#[derive(Debug, Clone, Copy)]
pub struct PrefillPolicy {
    pub low_rate_pcm_ms: u32,
    pub normal_pcm_ms: u32,
    pub dsd_ms: u32,
    /// PCM sample rate below which the "low bit-rate" bucket applies.
    pub low_rate_threshold_hz: u32,
}

impl Default for PrefillPolicy {
    fn default() -> Self {
        Self {
            low_rate_pcm_ms: 8,
            normal_pcm_ms: 20,
            dsd_ms: 40,
            low_rate_threshold_hz: 48_000,
        }
    }
}

/// §4.4.3 MTU-scaled warmup policy.
#[derive(Debug, Clone, Copy)]
pub struct WarmupPolicy {
    /// Overhead subtracted from the effective MTU before the cycle-time
    /// computation, per §4.4.3.
    pub mtu_overhead_bytes: u32,
    /// Target buffer count clamp.
    pub min_buffers: u32,
    pub max_buffers: u32,
    /// Constant PCM warmup buffer count (no MTU scaling for PCM).
    pub pcm_buffer_count: u32,
}

impl Default for WarmupPolicy {
    fn default() -> Self {
        Self {
            mtu_overhead_bytes: 24,
            min_buffers: 50,
            max_buffers: 3000,
            pcm_buffer_count: 50,
        }
    }
}

/// §4.5 retry table: attempts × delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts,
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// §4.5/§6 retry tables for the orchestrator's network-ish steps.
#[derive(Debug, Clone, Copy)]
pub struct RetryTables {
    pub connect: RetryPolicy,
    pub set_sink: RetryPolicy,
    pub start_playback: RetryPolicy,
}

impl Default for RetryTables {
    fn default() -> Self {
        Self {
            connect: RetryPolicy::new(3, 200),
            set_sink: RetryPolicy::new(10, 50),
            start_playback: RetryPolicy::new(50, 10),
        }
    }
}

/// §4.5 reset-delay table: "shorter for PCM-rate, longer for DSD-rate and
/// DSD↔PCM". Treated as tunables, not invariants, per §9's open questions.
#[derive(Debug, Clone, Copy)]
pub struct ResetDelays {
    pub pcm_rate_change: Duration,
    pub dsd_rate_change: Duration,
    pub dsd_pcm_crossover: Duration,
}

impl Default for ResetDelays {
    fn default() -> Self {
        Self {
            pcm_rate_change: Duration::from_millis(100),
            dsd_rate_change: Duration::from_millis(400),
            dsd_pcm_crossover: Duration::from_millis(400),
        }
    }
}

/// §4.5/§4.6 silence-buffer counts used before a transition or by a
/// control-plane operation.
#[derive(Debug, Clone, Copy)]
pub struct SilenceCounts {
    pub pre_transition_dsd: u32,
    pub pre_transition_dsd_wait: Duration,
    pub pause_pcm: u32,
    pub pause_dsd: u32,
    pub pause_wait: Duration,
    pub stop_drain_pcm: u32,
    pub stop_drain_dsd: u32,
    pub stop_drain_wait: Duration,
}

impl Default for SilenceCounts {
    fn default() -> Self {
        Self {
            pre_transition_dsd: 30,
            pre_transition_dsd_wait: Duration::from_millis(100),
            pause_pcm: 10,
            pause_dsd: 30,
            pause_wait: Duration::from_millis(80),
            stop_drain_pcm: 20,
            stop_drain_dsd: 50,
            stop_drain_wait: Duration::from_millis(150),
        }
    }
}

/// Bundle of every tunable, built once at startup and shared (read-only)
/// across the orchestrator, sync core, and control-plane bridge.
#[derive(Debug, Clone, Copy, Default)]
pub struct Tunables {
    pub prefill: PrefillPolicy,
    pub warmup: WarmupPolicy,
    pub retries: RetryTables,
    pub reset_delays: ResetDelays,
    pub silence: SilenceCounts,
}

/// §5's bounded timeouts: "every sleep-until-event has a bounded timeout."
pub const ONLINE_WAIT_TIMEOUT: Duration = Duration::from_secs(5);
pub const CALLBACK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Ring sizing policy: `bytes_per_second * policy_seconds`, rounded up to
/// the next power of two (§3 Lifecycle).
pub const RING_POLICY_SECONDS: f64 = 1.0;

/// §6: minimum buffer size the downstream transport will ever be asked to
/// fill.
pub const MIN_BYTES_PER_BUFFER: usize = 64;
