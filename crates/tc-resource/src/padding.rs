//! Plaintext padding (`Padding::pad`/`unpad`), used by V6/V7/V8/V10.
//!
//! A padded plaintext's last byte holds the number of zero bytes that
//! were appended ahead of it; decrypt trims `paddingLength + 1` bytes off
//! the end. [`padded_size`] always reserves room for that marker byte
//! before rounding to a step/padme tier, so it lands strictly past
//! `clear_size` even when `clear_size` itself already sits on a tier
//! boundary (e.g. `padded_size(40, Fixed(5)) == 45`, not `40`). That
//! makes it the exact length [`pad`] writes, and `encrypted_size` callers
//! can pre-size a buffer from it with no slack.
//!
//! The marker is a single byte, so it can only represent up to 255 bytes
//! of zero padding. `Auto` (padme) targets grow roughly with `clearSize`,
//! so this holds for small and moderate buffers but is not guaranteed for
//! very large ones; callers padding multi-megabyte buffers should prefer
//! `Fixed` with a small step.

use crate::error::ResourceError;

/// Floor for `Auto` (padme) targets only; `Fixed` steps are never clamped
/// (`padded_size(0, Fixed(5)) == 5`, below this floor).
pub const MINIMAL_PADDING: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingStep {
    /// `padme`-rounded, minimizing worst-case overhead as a fraction of size.
    Auto,
    /// Round up to the next multiple of `k` (`k >= 2`).
    Fixed(u32),
}

/// `floor(log2(l))` via leading-zero count; `l` must be non-zero.
fn floor_log2(l: u64) -> u64 {
    63 - l.leading_zeros() as u64
}

/// The padme algorithm: rounds `l` up so that only the top `O(log log l)`
/// bits of significance are preserved, bounding relative padding overhead
/// to `O(1/l)` while leaking only the approximate magnitude of `l`.
fn padme(l: u64) -> u64 {
    if l < 2 {
        return l;
    }
    let e = floor_log2(l);
    let s = if e == 0 { 0 } else { floor_log2(e) + 1 };
    let last_bits = e.saturating_sub(s);
    let bit_mask = (1u64 << last_bits) - 1;
    (l + bit_mask) & !bit_mask
}

/// The exact buffer size [`pad`] writes for a plaintext of `clear_size`
/// bytes: `clear_size + 1` (room for the marker byte) rounded up to the
/// next `step` (or padme tier for `Auto`). Always strictly greater than
/// `clear_size`.
pub fn padded_size(clear_size: u64, step: PaddingStep) -> u64 {
    let n = clear_size.saturating_add(1);
    match step {
        PaddingStep::Auto => padme(n).max(MINIMAL_PADDING),
        PaddingStep::Fixed(k) => {
            let k = (k as u64).max(2);
            ((n + k - 1) / k) * k
        }
    }
}

/// Pad `plaintext` with zero bytes up to `padded_size`, then append the
/// marker byte (truncated to `u8`, see module docs).
pub fn pad(plaintext: &[u8], step: PaddingStep) -> Vec<u8> {
    let clear_size = plaintext.len() as u64;
    let target = padded_size(clear_size, step);
    let pad_len = target - clear_size - 1;

    let mut out = Vec::with_capacity(target as usize);
    out.extend_from_slice(plaintext);
    out.resize((clear_size + pad_len) as usize, 0u8);
    out.push((pad_len % 256) as u8);
    out
}

/// Strip the trailing marker byte and the zero padding it describes.
pub fn unpad(padded: &[u8]) -> Result<Vec<u8>, ResourceError> {
    let marker = *padded.last().ok_or_else(|| ResourceError::InvalidFormat("padded buffer is empty".into()))?;
    let pad_len = marker as usize;
    if pad_len + 1 > padded.len() {
        return Err(ResourceError::InvalidFormat("padding length exceeds buffer size".into()));
    }
    Ok(padded[..padded.len() - pad_len - 1].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padme_matches_known_vectors() {
        assert_eq!(padme(10), 10);
        assert_eq!(padme(11), 12);
        assert_eq!(padme(42), 44);
        assert_eq!(padme(250), 256);
    }

    #[test]
    fn small_clear_sizes_clamp_to_minimal_padding() {
        for clear_size in [0u64, 1, 8, 9] {
            assert_eq!(padded_size(clear_size, PaddingStep::Auto), MINIMAL_PADDING);
        }
    }

    #[test]
    fn pad_then_unpad_roundtrips_under_auto() {
        for clear_size in [0usize, 1, 7, 40, 999, 4000] {
            let plaintext = vec![0xab; clear_size];
            let padded = pad(&plaintext, PaddingStep::Auto);
            assert!(padded.len() as u64 >= clear_size as u64 + 1);
            assert_eq!(unpad(&padded).unwrap(), plaintext);
        }
    }

    #[test]
    fn pad_then_unpad_roundtrips_under_fixed_step() {
        let step = PaddingStep::Fixed(16);
        for clear_size in [0usize, 1, 15, 16, 17, 100] {
            let plaintext = vec![0x42; clear_size];
            let padded = pad(&plaintext, step);
            assert_eq!(padded.len() % 16, 0);
            assert_eq!(unpad(&padded).unwrap(), plaintext);
        }
    }

    #[test]
    fn fixed_step_is_not_clamped_to_minimal_padding() {
        // Unlike Auto, Fixed steps may report targets below MINIMAL_PADDING.
        assert_eq!(padded_size(0, PaddingStep::Fixed(2)), 2);
        assert_eq!(padded_size(0, PaddingStep::Fixed(5)), 5);
    }

    #[test]
    fn fixed_step_five_matches_reference_vectors() {
        let cases: [(u64, u64); 10] = [
            (0, 5),
            (2, 5),
            (4, 5),
            (5, 10),
            (9, 10),
            (10, 15),
            (14, 15),
            (40, 45),
            (42, 45),
            (45, 50),
        ];
        for (clear_size, expected) in cases {
            assert_eq!(padded_size(clear_size, PaddingStep::Fixed(5)), expected, "clear_size={clear_size}");
        }
    }

    #[test]
    fn padded_size_always_leaves_room_for_the_marker_byte() {
        for clear_size in [0u64, 4, 5, 9, 10, 40, 250, 256] {
            assert!(padded_size(clear_size, PaddingStep::Auto) > clear_size);
            assert!(padded_size(clear_size, PaddingStep::Fixed(5)) > clear_size);
        }
    }

    #[test]
    fn pad_output_length_matches_padded_size_exactly() {
        for clear_size in [0usize, 5, 9, 10, 40, 45] {
            let plaintext = vec![0x11; clear_size];
            assert_eq!(pad(&plaintext, PaddingStep::Fixed(5)).len() as u64, padded_size(clear_size as u64, PaddingStep::Fixed(5)));
        }
    }

    #[test]
    fn unpad_rejects_a_padding_length_longer_than_the_buffer() {
        let bogus = vec![0u8, 1u8, 255u8];
        assert!(unpad(&bogus).is_err());
    }
}
