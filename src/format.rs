//! Data model shared by the producer, consumer, and orchestrator (§3).

use std::sync::atomic::{AtomicU32, Ordering};

/// DSD bit polarity — the two common DSD file-container conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsdPolarity {
    /// DSF-style.
    Lsb,
    /// DFF-style.
    Msb,
}

/// Sink byte order for PCM/DSD transport framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Little,
    Big,
}

/// Source format as delivered by the upstream decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    /// Sample rate in Hz for PCM, bit-rate in Hz for DSD (e.g. 2,822,400).
    pub rate_hz: u32,
    pub channels: u16,
    /// Bit depth for PCM; ignored for DSD (always 1 bit/sample).
    pub bit_depth: u16,
    pub is_dsd: bool,
    /// Only meaningful when `is_dsd`.
    pub dsd_polarity: DsdPolarity,
}

impl Format {
    pub fn bytes_per_second(&self) -> u64 {
        if self.is_dsd {
            // DSD is 1 bit/sample; rate_hz is already a per-channel bit-rate.
            (self.rate_hz as u64 * self.channels as u64) / 8
        } else {
            self.rate_hz as u64 * self.channels as u64 * (self.bit_depth as u64 / 8)
        }
    }

    /// DSD64 = 1, DSD128 = 2, DSD256 = 4, DSD512 = 8 (multiplier of 2.8224 MHz,
    /// or the 48 kHz family's 3.072 MHz — the multiplier is family-relative).
    pub fn dsd_rate_multiplier(&self) -> u32 {
        debug_assert!(self.is_dsd);
        (self.rate_hz / 2_822_400).max((self.rate_hz / 3_072_000).max(1))
    }
}

/// Result of negotiating with the downstream transport (sink capability
/// inquiry).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkFormat {
    /// Accepted bit depth: 16/24/32 for PCM, 1 for DSD.
    pub bit_depth: u16,
    pub endianness: Endianness,
    pub dsd_polarity: DsdPolarity,
}

/// Dispatch tag selecting a conversion kernel. Selected once per track open;
/// invoked branch-free on the hot path (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionMode {
    PcmCopy,
    PcmPack24,
    PcmUpsample16To32,
    DsdPassthrough,
    DsdBitReverse,
    DsdByteSwap,
    DsdBitReverseAndSwap,
}

impl ConversionMode {
    /// Selects the mode deterministically from (source polarity, sink
    /// polarity, sink endianness) for DSD, or from (source bit depth, sink
    /// bit depth) for PCM.
    pub fn select(source: &Format, sink: &SinkFormat) -> ConversionMode {
        if source.is_dsd {
            let bit_reverse = source.dsd_polarity != sink.dsd_polarity;
            let byte_swap = sink.endianness == Endianness::Little;
            match (bit_reverse, byte_swap) {
                (false, false) => ConversionMode::DsdPassthrough,
                (true, false) => ConversionMode::DsdBitReverse,
                (false, true) => ConversionMode::DsdByteSwap,
                (true, true) => ConversionMode::DsdBitReverseAndSwap,
            }
        } else if source.bit_depth == 16 && sink.bit_depth == 32 {
            ConversionMode::PcmUpsample16To32
        } else if source.bit_depth == 32 && sink.bit_depth == 24 {
            ConversionMode::PcmPack24
        } else {
            ConversionMode::PcmCopy
        }
    }

    pub fn is_dsd(self) -> bool {
        matches!(
            self,
            ConversionMode::DsdPassthrough
                | ConversionMode::DsdBitReverse
                | ConversionMode::DsdByteSwap
                | ConversionMode::DsdBitReverseAndSwap
        )
    }
}

/// Monotonic counter on the producer-facing format (and, separately, one on
/// the consumer-facing state). Wraparound-safe comparisons use `!=`, never
/// `<`. Writer side stores with `Release`; reader side loads with `Acquire`
/// — grounded directly on the teacher's `SharedRemoteAddr::generation`
/// (`bass-rtp/src/output_new/stream.rs`), same field name and ordering, here
/// applied to format reconfiguration instead of RTP remote-address changes.
#[derive(Default)]
pub struct GenerationCounter {
    value: AtomicU32,
}

impl GenerationCounter {
    pub const fn new() -> Self {
        Self {
            value: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn load(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Called from inside the `AccessGuard` writer section only.
    #[inline]
    pub fn bump(&self) -> u32 {
        self.value.fetch_add(1, Ordering::Release).wrapping_add(1)
    }
}

/// Classification of a format transition, used by the orchestrator to decide
/// how expensive the reconfiguration must be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackBoundary {
    SameFormat,
    PcmRateChange,
    DsdRateChange,
    DsdToPcm,
    PcmToDsd,
    BitDepthOnly,
}

impl TrackBoundary {
    /// Classifies `old -> new`. `old = None` means first open.
    pub fn classify(old: Option<&Format>, new: &Format) -> Option<TrackBoundary> {
        let old = old?;
        if old.is_dsd && !new.is_dsd {
            return Some(TrackBoundary::DsdToPcm);
        }
        if !old.is_dsd && new.is_dsd {
            return Some(TrackBoundary::PcmToDsd);
        }
        if old.is_dsd && new.is_dsd {
            if old.rate_hz != new.rate_hz {
                return Some(TrackBoundary::DsdRateChange);
            }
        } else if old.rate_hz != new.rate_hz {
            return Some(TrackBoundary::PcmRateChange);
        }
        if old.channels == new.channels && old.bit_depth != new.bit_depth {
            return Some(TrackBoundary::BitDepthOnly);
        }
        if old.channels != new.channels {
            // A channel-count change is treated the same as a rate-family
            // change since the ring, mix geometry, and sink negotiation are
            // all affected identically.
            return Some(if new.is_dsd {
                TrackBoundary::DsdRateChange
            } else {
                TrackBoundary::PcmRateChange
            });
        }
        Some(TrackBoundary::SameFormat)
    }
}
