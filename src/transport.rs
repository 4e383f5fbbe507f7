//! External-collaborator interface contracts (§1, §6).
//!
//! The upstream decoder, the downstream transport library, device discovery,
//! and the control plane are out of scope as concrete implementations — only
//! their interface contracts are specified. Each is a narrow trait here so
//! the orchestrator and control-plane bridge can be built and tested against
//! this crate alone; a real renderer supplies concrete types (a BASS/ALSA
//! decoder binding, a UPnP/Diretta transport, SSDP discovery) that implement
//! them.

use crate::error::CoreResult;
use crate::format::{DsdPolarity, Endianness, Format, SinkFormat};

/// Result of device discovery / MTU measurement (§1, §6): "returns a peer
/// address and MTU."
#[derive(Debug, Clone)]
pub struct DiscoveredTarget {
    pub peer: String,
    pub mtu: u32,
}

/// Device discovery collaborator. A real implementation performs SSDP/mDNS
/// lookup and a path-MTU probe; this crate only depends on the contract.
pub trait Discovery {
    fn discover(&mut self) -> CoreResult<DiscoveredTarget>;
}

/// Sink capability inquiry (§3 `SinkFormat`, §6): booleans for every format
/// the downstream transport may accept.
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkCapabilities {
    pub pcm16: bool,
    pub pcm24: bool,
    pub pcm32: bool,
    pub dsd: bool,
    pub dsd_lsb: bool,
    pub dsd_msb: bool,
    pub little_endian: bool,
    pub big_endian: bool,
}

/// Tries `source`'s format against `capabilities` in descending quality
/// order and returns the first accepted `SinkFormat`, per §6: "tries format
/// preferences in descending quality order and records the first accepted."
/// A concrete `SinkInquiry` implementation may call this directly from its
/// `negotiate`, or substitute device-specific preference logic.
pub fn select_sink_format(capabilities: &SinkCapabilities, source: &Format) -> Option<SinkFormat> {
    let endianness = if capabilities.little_endian {
        Endianness::Little
    } else if capabilities.big_endian {
        Endianness::Big
    } else {
        return None;
    };

    if source.is_dsd {
        if !capabilities.dsd {
            return None;
        }
        let dsd_polarity = if capabilities.dsd_msb {
            DsdPolarity::Msb
        } else if capabilities.dsd_lsb {
            DsdPolarity::Lsb
        } else {
            return None;
        };
        return Some(SinkFormat {
            bit_depth: 1,
            endianness,
            dsd_polarity,
        });
    }

    // Descending quality: prefer the source's native depth, then fall back
    // through progressively lossier accepted depths.
    let preference_order: [u16; 3] = match source.bit_depth {
        32 => [32, 24, 16],
        24 => [24, 32, 16],
        _ => [16, 24, 32],
    };
    for bit_depth in preference_order {
        let accepted = match bit_depth {
            16 => capabilities.pcm16,
            24 => capabilities.pcm24,
            32 => capabilities.pcm32,
            _ => false,
        };
        if accepted {
            return Some(SinkFormat {
                bit_depth,
                endianness,
                dsd_polarity: source.dsd_polarity,
            });
        }
    }
    None
}

/// Sink capability inquiry collaborator.
pub trait SinkInquiry {
    fn capabilities(&mut self) -> SinkCapabilities;

    /// Negotiates a sink format for `source`. The default implementation
    /// applies `select_sink_format`'s descending-quality preference order;
    /// override it if a concrete transport needs device-specific rules.
    fn negotiate(&mut self, source: &Format) -> CoreResult<SinkFormat> {
        let capabilities = self.capabilities();
        select_sink_format(&capabilities, source)
            .ok_or(crate::error::CoreError::SinkRejected)
    }
}

/// The downstream transport library's session contract (§1, §6): it pulls
/// fixed-size buffers on a cycle-time clock and exposes connect/disconnect/
/// playback-control and an `is_online` flag the producer gates on (§9's open
/// question: "online" semantics are opaque and transport-specific, but the
/// acquire-load placement on `SyncCore::is_online` must be preserved).
pub trait DownstreamTransport {
    /// Bytes the pull callback will request per cycle, once connected and a
    /// sink format has been negotiated (§6: "`bytes_per_buffer` is derived
    /// from sink negotiation").
    fn bytes_per_buffer(&self) -> usize;

    /// Effective MTU for the current connection, used by the MTU-scaled
    /// DSD warmup calculation (§4.4.3).
    fn effective_mtu(&self) -> u32;

    fn connect(&mut self, target: &DiscoveredTarget) -> CoreResult<()>;
    fn disconnect(&mut self) -> CoreResult<()>;
    fn is_online(&self) -> bool;
    fn start_playback(&mut self) -> CoreResult<()>;
    fn stop(&mut self) -> CoreResult<()>;
}

#[cfg(test)]
pub mod test_support {
    //! Minimal in-memory implementations of the collaborator traits, used by
    //! orchestrator and control-plane bridge unit tests. Not part of the
    //! public API.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    pub struct FakeDiscovery {
        pub mtu: u32,
    }

    impl Discovery for FakeDiscovery {
        fn discover(&mut self) -> CoreResult<DiscoveredTarget> {
            Ok(DiscoveredTarget {
                peer: "192.0.2.1:0".to_string(),
                mtu: self.mtu,
            })
        }
    }

    pub struct FakeSink {
        pub capabilities: SinkCapabilities,
    }

    impl SinkInquiry for FakeSink {
        fn capabilities(&mut self) -> SinkCapabilities {
            self.capabilities
        }
    }

    pub struct FakeTransport {
        pub bytes_per_buffer: usize,
        pub mtu: u32,
        pub online: AtomicBool,
        pub connect_failures_remaining: u32,
    }

    impl FakeTransport {
        pub fn new(bytes_per_buffer: usize, mtu: u32) -> Self {
            Self {
                bytes_per_buffer,
                mtu,
                online: AtomicBool::new(false),
                connect_failures_remaining: 0,
            }
        }
    }

    impl DownstreamTransport for FakeTransport {
        fn bytes_per_buffer(&self) -> usize {
            self.bytes_per_buffer
        }

        fn effective_mtu(&self) -> u32 {
            self.mtu
        }

        fn connect(&mut self, _target: &DiscoveredTarget) -> CoreResult<()> {
            if self.connect_failures_remaining > 0 {
                self.connect_failures_remaining -= 1;
                return Err(crate::error::CoreError::ConnectFailed {
                    attempts: 1,
                    reason: "fake failure".to_string(),
                });
            }
            self.online.store(true, Ordering::Release);
            Ok(())
        }

        fn disconnect(&mut self) -> CoreResult<()> {
            self.online.store(false, Ordering::Release);
            Ok(())
        }

        fn is_online(&self) -> bool {
            self.online.load(Ordering::Acquire)
        }

        fn start_playback(&mut self) -> CoreResult<()> {
            Ok(())
        }

        fn stop(&mut self) -> CoreResult<()> {
            self.online.store(false, Ordering::Release);
            Ok(())
        }
    }

    #[test]
    fn sink_format_prefers_native_pcm_depth() {
        let source = Format {
            rate_hz: 44_100,
            channels: 2,
            bit_depth: 24,
            is_dsd: false,
            dsd_polarity: DsdPolarity::Lsb,
        };
        let capabilities = SinkCapabilities {
            pcm16: true,
            pcm24: true,
            pcm32: true,
            little_endian: true,
            ..Default::default()
        };
        let sink = select_sink_format(&capabilities, &source).unwrap();
        assert_eq!(sink.bit_depth, 24);
    }

    #[test]
    fn sink_format_falls_back_when_native_depth_unsupported() {
        let source = Format {
            rate_hz: 44_100,
            channels: 2,
            bit_depth: 32,
            is_dsd: false,
            dsd_polarity: DsdPolarity::Lsb,
        };
        let capabilities = SinkCapabilities {
            pcm16: true,
            pcm24: true,
            pcm32: false,
            little_endian: true,
            ..Default::default()
        };
        let sink = select_sink_format(&capabilities, &source).unwrap();
        assert_eq!(sink.bit_depth, 24);
    }

    #[test]
    fn sink_rejects_dsd_when_not_supported() {
        let source = Format {
            rate_hz: 2_822_400,
            channels: 2,
            bit_depth: 1,
            is_dsd: true,
            dsd_polarity: DsdPolarity::Lsb,
        };
        let capabilities = SinkCapabilities {
            dsd: false,
            little_endian: true,
            ..Default::default()
        };
        assert!(select_sink_format(&capabilities, &source).is_none());
    }
}
