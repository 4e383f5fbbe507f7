//! Transition Orchestrator (§4.5): `open(format)` classifies the transition
//! against the currently playing format and dispatches to one of four paths
//! — first open, a same-format quick resume, a lighter reopen, or a full
//! close/reopen rebuild — each built from the same collaborator contracts
//! (`Discovery`, `SinkInquiry`, `DownstreamTransport`) and the same retry/
//! delay tunables (`config::Tunables`).
//!
//! Runs entirely on the control thread. Every step that talks to an external
//! collaborator goes through `retry`, bounded by the relevant entry in
//! `RetryTables` (§4.5/§6).

use std::sync::Arc;
use std::thread;

use crate::config::{Tunables, RING_POLICY_SECONDS, MIN_BYTES_PER_BUFFER};
use crate::error::{CoreError, CoreResult};
use crate::format::{ConversionMode, Format, SinkFormat, TrackBoundary};
use crate::logring::{LogLevel, LogRing};
use crate::state::{dsd_warmup_target_buffers, pcm_warmup_target_buffers, prefill_target_bytes};
use crate::sync_core::{ConsumerFields, ProducerFields, SyncCore};
use crate::transport::{DiscoveredTarget, Discovery, DownstreamTransport, SinkInquiry};

/// Idle/PCM silence byte (§3). DSD's conventional idle pattern is `0x69`.
const PCM_SILENCE_BYTE: u8 = 0x00;
const DSD_SILENCE_BYTE: u8 = 0x69;

fn retry<T>(policy: crate::config::RetryPolicy, mut f: impl FnMut() -> CoreResult<T>) -> CoreResult<T> {
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                last_err = Some(e);
                if attempt + 1 < attempts {
                    thread::sleep(policy.delay);
                }
            }
        }
    }
    Err(last_err.unwrap_or(CoreError::Timeout("retry exhausted")))
}

/// Owns the per-transition state the Sync Core itself does not track:
/// the currently negotiated `Format`/`SinkFormat` pair and the last
/// successfully discovered target (needed by `Reopen`, which reconnects
/// without repeating discovery).
pub struct Orchestrator<D, S, T> {
    core: Arc<SyncCore>,
    tunables: Tunables,
    current_format: Option<Format>,
    sink_format: Option<SinkFormat>,
    last_target: Option<DiscoveredTarget>,
    discovery: D,
    sink: S,
    transport: T,
    log: Arc<LogRing>,
}

impl<D: Discovery, S: SinkInquiry, T: DownstreamTransport> Orchestrator<D, S, T> {
    pub fn new(core: Arc<SyncCore>, tunables: Tunables, discovery: D, sink: S, transport: T, log: Arc<LogRing>) -> Self {
        Self {
            core,
            tunables,
            current_format: None,
            sink_format: None,
            last_target: None,
            discovery,
            sink,
            transport,
            log,
        }
    }

    pub fn current_format(&self) -> Option<Format> {
        self.current_format
    }

    pub fn sink_format(&self) -> Option<SinkFormat> {
        self.sink_format
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Shared handle to the Sync Core, used by the control-plane bridge to
    /// drive drain/stop requests and read playback state without duplicating
    /// orchestrator bookkeeping.
    pub fn core(&self) -> &Arc<SyncCore> {
        &self.core
    }

    /// §4.5 `open(format)`: classifies `(current_format, format)` and
    /// dispatches to the matching transition path. On success, `format`
    /// becomes the new `current_format`.
    pub fn open(&mut self, format: Format) -> CoreResult<()> {
        match TrackBoundary::classify(self.current_format.as_ref(), &format) {
            None => self.first_open(format),
            Some(TrackBoundary::SameFormat) => self.same_format_resume(format),
            Some(TrackBoundary::BitDepthOnly) => self.reopen(format),
            // PcmRateChange / DsdRateChange / DsdToPcm / PcmToDsd: the spec
            // distinguishes "same-family" rate changes (-> Reopen) from
            // "across-family" ones (-> FullRebuild), a distinction
            // `TrackBoundary` does not model (see DESIGN.md). We resolve the
            // open question conservatively: every rate-family change is a
            // full rebuild.
            Some(_boundary) => self.full_rebuild(format),
        }
    }

    /// Idle -> Prefilling via full rebuild (§4.5 "Both unset -> First open").
    fn first_open(&mut self, format: Format) -> CoreResult<()> {
        let target = retry(self.tunables.retries.connect, || self.discovery.discover())?;
        retry(self.tunables.retries.connect, || self.transport.connect(&target))?;
        self.last_target = Some(target.clone());
        self.negotiate_and_build(format, target.mtu)?;
        retry(self.tunables.retries.start_playback, || self.transport.start_playback())?;
        self.core.set_online(true);
        self.log.push(LogLevel::Info, "first open complete");
        Ok(())
    }

    /// Lighter than `full_rebuild`: same session, re-negotiate sink, no
    /// fresh discovery (§4.5 "Reopen").
    fn reopen(&mut self, format: Format) -> CoreResult<()> {
        self.core.set_online(false);
        self.core.request_stop();
        let _ = self.transport.stop();
        let _ = self.transport.disconnect();

        let target = self
            .last_target
            .clone()
            .ok_or_else(|| CoreError::Config("reopen requested with no prior connection".to_string()))?;
        retry(self.tunables.retries.connect, || self.transport.connect(&target))?;
        self.negotiate_and_build(format, target.mtu)?;
        retry(self.tunables.retries.start_playback, || self.transport.start_playback())?;
        self.core.set_online(true);
        self.log.push(LogLevel::Info, "reopen complete");
        Ok(())
    }

    /// Stop, disconnect (after a DSD silence grace period), close, sleep a
    /// policy delay scaled to the transition kind, then resume as a first
    /// open (§4.5 "FullRebuild").
    fn full_rebuild(&mut self, format: Format) -> CoreResult<()> {
        let boundary = TrackBoundary::classify(self.current_format.as_ref(), &format);

        if self.current_format.map(|f| f.is_dsd).unwrap_or(false) {
            // §4.5 silence-before-transition policy: give the sink a grace
            // period before the clock domain changes underneath it.
            self.core.request_drain(self.tunables.silence.pre_transition_dsd);
            thread::sleep(self.tunables.silence.pre_transition_dsd_wait);
        }

        self.core.set_online(false);
        self.core.request_stop();
        let _ = self.transport.stop();
        let _ = self.transport.disconnect();

        let delay = match boundary {
            Some(TrackBoundary::PcmRateChange) => self.tunables.reset_delays.pcm_rate_change,
            Some(TrackBoundary::DsdRateChange) => self.tunables.reset_delays.dsd_rate_change,
            Some(TrackBoundary::DsdToPcm) | Some(TrackBoundary::PcmToDsd) => {
                self.tunables.reset_delays.dsd_pcm_crossover
            }
            _ => self.tunables.reset_delays.pcm_rate_change,
        };
        thread::sleep(delay);

        let target = retry(self.tunables.retries.connect, || self.discovery.discover())?;
        retry(self.tunables.retries.connect, || self.transport.connect(&target))?;
        self.last_target = Some(target.clone());
        self.negotiate_and_build(format, target.mtu)?;
        retry(self.tunables.retries.start_playback, || self.transport.start_playback())?;
        self.core.set_online(true);
        self.log.push(LogLevel::Info, "full rebuild complete");
        Ok(())
    }

    /// Send drain-silence, wait briefly, clear the ring, re-arm prefill/
    /// warmup, resume playback — no sink re-negotiation (§4.5 "SameFormat").
    fn same_format_resume(&mut self, format: Format) -> CoreResult<()> {
        let sink_format = self
            .sink_format
            .ok_or_else(|| CoreError::Config("same-format resume with no prior sink negotiation".to_string()))?;
        let mtu = self.last_target.as_ref().map(|t| t.mtu).unwrap_or(1500);

        let silence_buffers = if format.is_dsd {
            self.tunables.silence.pre_transition_dsd
        } else {
            self.tunables.silence.stop_drain_pcm
        };
        self.core.request_drain(silence_buffers);
        thread::sleep(self.tunables.silence.pre_transition_dsd_wait);

        let (producer, consumer, warmup_target) = self.compute_window(&format, &sink_format, mtu);
        // SameFormat keeps the existing ring capacity — it's sized off the
        // same bytes-per-second the unchanged format already implies.
        self.core.reconfigure(producer, consumer, None);
        self.core.arm_track(warmup_target);
        self.current_format = Some(format);
        self.log.push(LogLevel::Info, "same-format resume complete");
        Ok(())
    }

    fn negotiate_and_build(&mut self, format: Format, mtu: u32) -> CoreResult<()> {
        let sink_format = retry(self.tunables.retries.set_sink, || self.sink.negotiate(&format))?;
        let (producer, consumer, warmup_target) = self.compute_window(&format, &sink_format, mtu);
        let bytes_per_second = format.bytes_per_second().max(1);
        let ring_capacity = ((bytes_per_second as f64 * RING_POLICY_SECONDS) as usize)
            .max(2)
            .next_power_of_two();
        self.core.reconfigure(producer, consumer, Some(ring_capacity));
        self.core.arm_track(warmup_target);
        self.current_format = Some(format);
        self.sink_format = Some(sink_format);
        Ok(())
    }

    fn compute_window(
        &self,
        format: &Format,
        sink_format: &SinkFormat,
        mtu: u32,
    ) -> (ProducerFields, ConsumerFields, u32) {
        let mode = ConversionMode::select(format, sink_format);
        let bytes_per_second = format.bytes_per_second().max(1);
        let ring_capacity = ((bytes_per_second as f64 * RING_POLICY_SECONDS) as usize)
            .max(2)
            .next_power_of_two();
        let bytes_per_buffer = self.transport.bytes_per_buffer().max(MIN_BYTES_PER_BUFFER);
        let prefill_target = prefill_target_bytes(format, ring_capacity, &self.tunables.prefill);
        let warmup_target = if format.is_dsd {
            dsd_warmup_target_buffers(format, mtu, &self.tunables.warmup)
        } else {
            pcm_warmup_target_buffers(&self.tunables.warmup)
        };
        let pcm_bytes_per_sample_in = if format.is_dsd { 0 } else { format.bit_depth / 8 };
        let silence_byte = if format.is_dsd { DSD_SILENCE_BYTE } else { PCM_SILENCE_BYTE };

        let producer = ProducerFields {
            mode,
            channels: format.channels,
            pcm_bytes_per_sample_in,
            is_dsd: format.is_dsd,
            prefill_target,
        };
        let consumer = ConsumerFields {
            bytes_per_buffer,
            silence_byte,
            is_dsd: format.is_dsd,
            warmup_target,
        };
        (producer, consumer, warmup_target)
    }
}
