//! Control-Plane Bridge (§4.6): the thin adapter between an external control
//! surface (UPnP AVTransport/RenderingControl, in the original system — the
//! eventing and SCPD themselves are out of scope per §1) and the
//! Transition Orchestrator / Sync Core underneath.
//!
//! Resolving a URI to a concrete `Format` is the upstream decoder's job
//! (out of scope, §1), so this bridge splits `set_uri` into two calls the
//! real wiring makes back-to-back: `set_uri` records the pending URI/
//! metadata pair the way §6 specifies, and `open_track` — called once the
//! decoder binding has resolved that URI to a `Format` — drives the
//! orchestrator's `open`. A control surface that already knows the format
//! up front (e.g. a test harness) can call both immediately.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::Tunables;
use crate::error::ControlOutcome;
use crate::format::Format;
use crate::logring::{LogLevel, LogRing};
use crate::orchestrator::Orchestrator;
use crate::state::PlaybackState;
use crate::transport::{Discovery, DownstreamTransport, SinkInquiry};

/// §6 outward event: `TransportState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    PausedPlayback,
    Transitioning,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportState::Stopped => "STOPPED",
            TransportState::Playing => "PLAYING",
            TransportState::PausedPlayback => "PAUSED_PLAYBACK",
            TransportState::Transitioning => "TRANSITIONING",
        };
        f.write_str(s)
    }
}

/// Formats a duration the way §6's `CurrentTrackDuration` event wants it:
/// `HH:MM:SS`.
pub fn format_duration_hhmmss(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// A resolved playable track: URI, opaque metadata, and the format the
/// decoder determined for it. §1 and §6 leave metadata's shape to the
/// control-plane integration (UPnP `DIDL-Lite`, typically) — it is carried
/// through unexamined here.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub uri: String,
    pub metadata: String,
    pub format: Format,
}

/// Supplemented feature (SPEC_FULL.md): a depth-1 gapless queue. `set_next_uri`
/// only stores a pending URI/metadata pair; `open_next_track` (called once the
/// decoder resolves it) promotes it to `next_track`, consumed by `stop`'s
/// drain-completion per the track-boundary-signaling contract in §1's
/// non-goals ("gapless metadata handling beyond signaling a track boundary").
pub struct ControlPlaneBridge<D, S, T> {
    orchestrator: Orchestrator<D, S, T>,
    tunables: Tunables,
    log: Arc<LogRing>,

    pending_uri: Option<(String, String)>,
    pending_next_uri: Option<(String, String)>,
    current_track: Option<TrackInfo>,
    next_track: Option<TrackInfo>,
    gapless_enabled: bool,

    paused: bool,
    volume: u8,
    mute: bool,
    volume_db: i32,
}

impl<D: Discovery, S: SinkInquiry, T: DownstreamTransport> ControlPlaneBridge<D, S, T> {
    pub fn new(orchestrator: Orchestrator<D, S, T>, tunables: Tunables, log: Arc<LogRing>, gapless_enabled: bool) -> Self {
        Self {
            orchestrator,
            tunables,
            log,
            pending_uri: None,
            pending_next_uri: None,
            current_track: None,
            next_track: None,
            gapless_enabled,
            paused: false,
            volume: 100,
            mute: false,
            volume_db: 0,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator<D, S, T> {
        &self.orchestrator
    }

    // -- §6 control-plane surface ------------------------------------------------

    /// Clears any pending next-URI and records `uri`/`metadata` as pending
    /// for the next `open_track` call.
    pub fn set_uri(&mut self, uri: &str, metadata: &str) {
        self.pending_next_uri = None;
        self.pending_uri = Some((uri.to_string(), metadata.to_string()));
    }

    /// Stores a pending gapless-queue entry (depth 1). Rejected outright if
    /// gapless playback was disabled (`--no-gapless`).
    pub fn set_next_uri(&mut self, uri: &str, metadata: &str) -> ControlOutcome {
        if !self.gapless_enabled {
            return ControlOutcome::Rejected;
        }
        self.pending_next_uri = Some((uri.to_string(), metadata.to_string()));
        ControlOutcome::Accepted
    }

    /// Called by the decoder binding once `set_uri`'s pending URI has been
    /// resolved to a `Format`. Drives the orchestrator's `open` and, on
    /// success, becomes `current_track`.
    pub fn open_track(&mut self, format: Format) -> ControlOutcome {
        let Some((uri, metadata)) = self.pending_uri.take() else {
            return ControlOutcome::Rejected;
        };
        let result = self.orchestrator.open(format);
        if result.is_ok() {
            self.current_track = Some(TrackInfo { uri, metadata, format });
            self.paused = false;
        } else {
            self.log.push(LogLevel::Warn, "open_track failed");
        }
        ControlOutcome::from_result(&result)
    }

    /// Symmetric promotion for `set_next_uri`'s pending entry.
    pub fn open_next_track(&mut self, format: Format) -> ControlOutcome {
        let Some((uri, metadata)) = self.pending_next_uri.take() else {
            return ControlOutcome::Rejected;
        };
        self.next_track = Some(TrackInfo { uri, metadata, format });
        ControlOutcome::Accepted
    }

    /// §4.6 `play`: on `Stopped`, re-open the current track's format; if
    /// paused, `resume_playback` instead.
    pub fn play(&mut self) -> ControlOutcome {
        if self.paused {
            return self.resume();
        }
        let Some(track) = self.current_track.clone() else {
            return ControlOutcome::Rejected;
        };
        let result = self.orchestrator.open(track.format);
        ControlOutcome::from_result(&result)
    }

    /// §4.6 `pause`: request silence buffers (PCM 10 / DSD 30), wait up to
    /// 80 ms, stop the transport, mark paused.
    pub fn pause(&mut self) -> ControlOutcome {
        let is_dsd = self.orchestrator.current_format().map(|f| f.is_dsd).unwrap_or(false);
        let buffers = if is_dsd {
            self.tunables.silence.pause_dsd
        } else {
            self.tunables.silence.pause_pcm
        };
        self.orchestrator.core().request_drain(buffers);
        thread::sleep(self.tunables.silence.pause_wait);
        let _ = self.orchestrator.transport_mut().stop();
        self.paused = true;
        ControlOutcome::Accepted
    }

    /// §4.6 `resume`: clear ring, reset prefill, re-open (bounded wait until
    /// online is folded into the orchestrator's retry tables).
    pub fn resume(&mut self) -> ControlOutcome {
        if !self.paused {
            return ControlOutcome::Rejected;
        }
        let Some(track) = self.current_track.clone() else {
            return ControlOutcome::Rejected;
        };
        let result = self.orchestrator.open(track.format);
        if result.is_ok() {
            self.paused = false;
        }
        ControlOutcome::from_result(&result)
    }

    /// §4.6 `stop(immediate)`: non-immediate requests drain silence (20 PCM
    /// / 50 DSD) and waits up to 150 ms before stopping; immediate skips
    /// straight to `request_stop`. Promotes a pending gapless `next_track`
    /// into `current_track` afterward, per the depth-1 queue design. Reports
    /// and resets the session's underrun tally, per §4.4.5 ("reported at
    /// `stop_playback()`").
    pub fn stop(&mut self, immediate: bool) -> ControlOutcome {
        if immediate {
            self.orchestrator.core().request_stop();
        } else {
            let is_dsd = self.orchestrator.current_format().map(|f| f.is_dsd).unwrap_or(false);
            let buffers = if is_dsd {
                self.tunables.silence.stop_drain_dsd
            } else {
                self.tunables.silence.stop_drain_pcm
            };
            self.orchestrator.core().request_drain(buffers);
            thread::sleep(self.tunables.silence.stop_drain_wait);
        }
        let _ = self.orchestrator.transport_mut().stop();
        let _ = self.orchestrator.transport_mut().disconnect();
        self.orchestrator.core().set_online(false);
        self.paused = false;
        self.log_session_summary();

        if self.gapless_enabled {
            if let Some(next) = self.next_track.take() {
                self.current_track = Some(next);
            }
        }
        ControlOutcome::Accepted
    }

    /// Seeking repositions the upstream decoder, not the ring — the Sync
    /// Core has no notion of a sample position (§1's non-goals exclude
    /// gapless/seek metadata beyond track-boundary signaling). This call
    /// only validates that a seek is currently meaningful and reports it;
    /// the decoder binding is expected to resume `push_audio` from the new
    /// position afterward.
    pub fn seek(&mut self, target: Duration) -> ControlOutcome {
        if !matches!(
            self.orchestrator.core().state(),
            PlaybackState::Running | PlaybackState::Warmup | PlaybackState::Prefilling
        ) {
            return ControlOutcome::Rejected;
        }
        self.log
            .push(LogLevel::Info, &format!("seek requested to {}", format_duration_hhmmss(target)));
        ControlOutcome::Accepted
    }

    // -- Outward events (§6) ------------------------------------------------

    pub fn transport_state(&self) -> TransportState {
        if self.paused {
            return TransportState::PausedPlayback;
        }
        match self.orchestrator.core().state() {
            PlaybackState::Idle | PlaybackState::Stopped => TransportState::Stopped,
            PlaybackState::Prefilling | PlaybackState::Warmup | PlaybackState::Draining => {
                TransportState::Transitioning
            }
            PlaybackState::Running => TransportState::Playing,
        }
    }

    pub fn current_track_uri(&self) -> Option<&str> {
        self.current_track.as_ref().map(|t| t.uri.as_str())
    }

    /// Comma-joined subset of `Play, Stop, Pause, Seek, Next, Previous`.
    pub fn current_transport_actions(&self) -> String {
        let mut actions: Vec<&str> = Vec::new();
        match self.transport_state() {
            TransportState::Stopped => actions.push("Play"),
            TransportState::Playing => {
                actions.push("Pause");
                actions.push("Stop");
                actions.push("Seek");
            }
            TransportState::PausedPlayback => {
                actions.push("Play");
                actions.push("Stop");
            }
            TransportState::Transitioning => actions.push("Stop"),
        }
        if self.next_track.is_some() {
            actions.push("Next");
        }
        actions.join(",")
    }

    pub fn set_volume(&mut self, volume: u8) -> ControlOutcome {
        if volume > 100 {
            return ControlOutcome::Rejected;
        }
        self.volume = volume;
        ControlOutcome::Accepted
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.mute = mute;
    }

    pub fn mute(&self) -> bool {
        self.mute
    }

    /// 1/256-dB units, range [-3600, 0] per §6.
    pub fn set_volume_db(&mut self, db: i32) -> ControlOutcome {
        if !(-3600..=0).contains(&db) {
            return ControlOutcome::Rejected;
        }
        self.volume_db = db;
        ControlOutcome::Accepted
    }

    pub fn volume_db(&self) -> i32 {
        self.volume_db
    }

    /// §7: "silent underruns are counted and reported in a single log line
    /// at session end." §4.4.5 specifies the counter is drained (exchanged
    /// to 0) at the same moment it is reported, so a second call at the next
    /// `stop` reports only underruns accumulated since this one. `stop`
    /// calls this automatically; exposed for a control surface that tears
    /// the session down without going through `stop` (e.g. process exit).
    pub fn log_session_summary(&self) {
        let underruns = self.orchestrator.core().take_underrun_count();
        self.log
            .push(LogLevel::Info, &format!("Session had {underruns} underrun(s)"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::DsdPolarity;
    use crate::sync_core::SyncCore;
    use crate::transport::test_support::{FakeDiscovery, FakeSink, FakeTransport};
    use crate::transport::SinkCapabilities;

    fn pcm_format() -> Format {
        Format {
            rate_hz: 44_100,
            channels: 2,
            bit_depth: 16,
            is_dsd: false,
            dsd_polarity: DsdPolarity::Lsb,
        }
    }

    fn make_bridge(gapless: bool) -> ControlPlaneBridge<FakeDiscovery, FakeSink, FakeTransport> {
        let core = Arc::new(SyncCore::new(4096, 0, Arc::new(LogRing::new(64))));
        let orch = Orchestrator::new(
            core,
            Tunables::default(),
            FakeDiscovery { mtu: 1500 },
            FakeSink {
                capabilities: SinkCapabilities {
                    pcm16: true,
                    pcm24: true,
                    pcm32: true,
                    dsd: true,
                    dsd_lsb: true,
                    dsd_msb: true,
                    little_endian: true,
                    big_endian: false,
                },
            },
            FakeTransport::new(180, 1500),
            Arc::new(LogRing::new(64)),
        );
        ControlPlaneBridge::new(orch, Tunables::default(), Arc::new(LogRing::new(64)), gapless)
    }

    #[test]
    fn set_uri_then_open_track_starts_playback() {
        let mut bridge = make_bridge(true);
        bridge.set_uri("http://example/track.flac", "<DIDL/>");
        let outcome = bridge.open_track(pcm_format());
        assert!(outcome.is_accepted());
        assert_eq!(bridge.transport_state(), TransportState::Transitioning);
        assert_eq!(bridge.current_track_uri(), Some("http://example/track.flac"));
    }

    #[test]
    fn open_track_without_pending_uri_is_rejected() {
        let mut bridge = make_bridge(true);
        let outcome = bridge.open_track(pcm_format());
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn pause_then_resume_round_trips_through_orchestrator() {
        let mut bridge = make_bridge(true);
        bridge.set_uri("uri", "meta");
        bridge.open_track(pcm_format());

        assert!(bridge.pause().is_accepted());
        assert_eq!(bridge.transport_state(), TransportState::PausedPlayback);

        assert!(bridge.resume().is_accepted());
        assert_ne!(bridge.transport_state(), TransportState::PausedPlayback);
    }

    #[test]
    fn stop_then_play_reopens_same_track() {
        let mut bridge = make_bridge(true);
        bridge.set_uri("uri", "meta");
        bridge.open_track(pcm_format());
        assert!(bridge.stop(false).is_accepted());
        assert_eq!(bridge.transport_state(), TransportState::Stopped);

        assert!(bridge.play().is_accepted());
        assert_ne!(bridge.transport_state(), TransportState::Stopped);
    }

    #[test]
    fn set_next_uri_rejected_when_gapless_disabled() {
        let mut bridge = make_bridge(false);
        let outcome = bridge.set_next_uri("next", "meta");
        assert!(!outcome.is_accepted());
    }

    #[test]
    fn gapless_next_track_promoted_on_stop() {
        let mut bridge = make_bridge(true);
        bridge.set_uri("first", "meta");
        bridge.open_track(pcm_format());
        assert!(bridge.set_next_uri("second", "meta").is_accepted());
        assert!(bridge.open_next_track(pcm_format()).is_accepted());

        bridge.stop(false);
        assert_eq!(bridge.current_track_uri(), Some("second"));
    }

    #[test]
    fn volume_rejects_out_of_range() {
        let mut bridge = make_bridge(true);
        assert!(bridge.set_volume(100).is_accepted());
        assert!(!bridge.set_volume(101).is_accepted());
        assert!(bridge.set_volume_db(-3600).is_accepted());
        assert!(!bridge.set_volume_db(-3601).is_accepted());
    }

    #[test]
    fn duration_formats_as_hh_mm_ss() {
        assert_eq!(format_duration_hhmmss(Duration::from_secs(3725)), "01:02:05");
    }
}
