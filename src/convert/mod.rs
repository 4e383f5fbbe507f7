//! Conversion kernel dispatch (§4.2). Every kernel shares the contract
//! `convert(dst, src, channels) -> bytes_written`; the mode implied by the
//! cached `ConversionMode` is looked up once and called directly — no
//! conditionals on conversion policy live inside a kernel's inner loop.

pub mod dsd;
pub mod pcm;

use crate::format::ConversionMode;

/// Dispatches to the kernel selected by `mode`. `frame_bytes_in` is only
/// used by `PcmCopy`, where the frame size depends on the negotiated bit
/// depth rather than being fixed by the mode itself.
#[inline]
pub fn convert(
    mode: ConversionMode,
    dst: &mut [u8],
    src: &[u8],
    channels: u16,
    pcm_frame_bytes_in: usize,
) -> usize {
    match mode {
        ConversionMode::PcmCopy => pcm::pcm_copy(dst, src, pcm_frame_bytes_in),
        ConversionMode::PcmPack24 => pcm::pcm_pack24(dst, src, channels),
        ConversionMode::PcmUpsample16To32 => pcm::pcm_upsample16_to_32(dst, src, channels),
        ConversionMode::DsdPassthrough => dsd::dsd_passthrough(dst, src, channels),
        ConversionMode::DsdBitReverse => dsd::dsd_bit_reverse(dst, src, channels),
        ConversionMode::DsdByteSwap => dsd::dsd_byte_swap(dst, src, channels),
        ConversionMode::DsdBitReverseAndSwap => dsd::dsd_bit_reverse_and_swap(dst, src, channels),
    }
}

/// Input/output frame sizes in bytes for `mode`. For DSD modes the "frame"
/// is one 4-byte-per-channel group, counted across all planes; for PCM
/// modes it is one interleaved sample across all channels.
pub fn frame_sizes(mode: ConversionMode, channels: u16, pcm_bytes_per_sample_in: u16) -> (usize, usize) {
    let ch = channels as usize;
    match mode {
        ConversionMode::PcmCopy => {
            let f = ch * pcm_bytes_per_sample_in as usize;
            (f, f)
        }
        ConversionMode::PcmPack24 => (ch * 4, ch * 3),
        ConversionMode::PcmUpsample16To32 => (ch * 2, ch * 4),
        ConversionMode::DsdPassthrough
        | ConversionMode::DsdBitReverse
        | ConversionMode::DsdByteSwap
        | ConversionMode::DsdBitReverseAndSwap => (ch * 4, ch * 4),
    }
}

/// Predicts the exact output byte count `convert` will report for
/// `input_bytes` of input, without running the kernel. Used to decide,
/// before conversion, whether the ring's contiguous write region is large
/// enough to convert directly into (avoiding a staging copy) — §4.4.1 step 5.
pub fn predicted_output_bytes(
    mode: ConversionMode,
    input_bytes: usize,
    channels: u16,
    pcm_bytes_per_sample_in: u16,
) -> usize {
    let (frame_in, frame_out) = frame_sizes(mode, channels, pcm_bytes_per_sample_in);
    if frame_in == 0 {
        return 0;
    }
    if mode.is_dsd() {
        let ch = channels.max(1) as usize;
        let plane_len = input_bytes / ch;
        let groups = plane_len / 4;
        groups * 4 * ch
    } else {
        (input_bytes / frame_in) * frame_out
    }
}

/// Worst-case output bytes per input byte for `mode`, used to size staging
/// buffers once at track-open time (§5's "hot-path allocation policy: none").
pub fn max_expansion_ratio(mode: ConversionMode) -> f64 {
    match mode {
        ConversionMode::PcmUpsample16To32 => 2.0,
        ConversionMode::PcmPack24 => 0.75,
        ConversionMode::PcmCopy => 1.0,
        ConversionMode::DsdPassthrough
        | ConversionMode::DsdBitReverse
        | ConversionMode::DsdByteSwap
        | ConversionMode::DsdBitReverseAndSwap => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::ConversionMode;

    #[test]
    fn dispatch_routes_to_matching_kernel() {
        let src = [1u8, 2, 3, 4];
        let mut dst = [0u8; 4];
        let n = convert(ConversionMode::PcmCopy, &mut dst, &src, 1, 4);
        assert_eq!(n, 4);
        assert_eq!(dst, src);
    }
}
