//! Per-row alignment, shifting, mirroring and polarity transform.

use crate::bits::byte_reverse;

/// Read `src` at logical index `i`, or at its mirror index `len - 1 - i` when
/// `reverse` is set. Lets the shift helpers walk a row back-to-front without
/// allocating a reversed copy first.
fn at(src: &[u8], reverse: bool, i: usize) -> u8 {
    if reverse { src[src.len() - 1 - i] } else { src[i] }
}

/// Shift `src` right by `shift` bits (0..=7), writing `src.len() + 1` bytes
/// into `dst`. Carry flows from earlier bytes into later ones. Reads `src`
/// back-to-front when `reverse` is set, in place of a reversed copy.
fn shift_right_into(src: &[u8], reverse: bool, shift: u32, dst: &mut [u8]) -> bool {
    debug_assert!(shift <= 7);
    let mut nonzero = false;
    let mut carry = 0u8;
    for i in 0..src.len() {
        let b = at(src, reverse, i);
        let out = carry | (b >> shift);
        if out != 0 {
            nonzero = true;
        }
        dst[i] = out;
        carry = if shift == 0 { 0 } else { b << (8 - shift) };
    }
    if carry != 0 {
        nonzero = true;
    }
    dst[src.len()] = carry;
    nonzero
}

/// Shift `src` left by `shift` bits (0..=7), writing exactly `src.len()`
/// bytes into `dst`. Carry flows from later bytes into earlier ones. Reads
/// `src` back-to-front when `reverse` is set, in place of a reversed copy.
fn shift_left_into(src: &[u8], reverse: bool, shift: u32, dst: &mut [u8]) -> bool {
    debug_assert!(shift <= 7);
    let len = src.len();
    let mut nonzero = false;
    for i in 0..len {
        let hi = at(src, reverse, i) << shift;
        let lo = if shift == 0 {
            0
        } else if i + 1 < len {
            at(src, reverse, i + 1) >> (8 - shift)
        } else {
            0
        };
        let out = hi | lo;
        if out != 0 {
            nonzero = true;
        }
        dst[i] = out;
    }
    nonzero
}

/// Largest `bytes_per_line` the sequencer ever passes (the option field is
/// `u8`-typed); bounds the fixed shift buffer below so the `shift != 0` path
/// never needs a heap allocation.
const MAX_SHIFT_BUF: usize = 256;

/// Transform one input row into an output row of exactly `bytes_per_line` bytes.
///
/// `left_padding_bytes` leading bytes and `right_padding_bytes` trailing
/// bytes of `output` are left as `xor_mask` (background), placing the data
/// in between. `shift` is a sub-byte bit offset applied to the data before
/// placement; it may be negative only when `mirror` is `false`. `mirror`
/// selects whether the row is placed as-authored (true) or compensated for
/// the print head's physical bit/byte reversal (false, the common case).
///
/// Returns `true` if any source pixel survived into the output (ignoring
/// padding), `false` for a row that is pure background.
pub fn transform_row(
    input: &[u8],
    input_len: usize,
    output: &mut [u8],
    bytes_per_line: usize,
    left_padding_bytes: usize,
    right_padding_bytes: usize,
    shift: i32,
    mirror: bool,
    xor_mask: u8,
) -> bool {
    assert_eq!(output.len(), bytes_per_line);
    assert!(!mirror || shift >= 0, "mirror rows cannot use a negative shift");
    for b in output.iter_mut() {
        *b = xor_mask;
    }

    if input_len == 0 {
        return false;
    }

    let extra = usize::from(shift > 0);
    assert!(
        left_padding_bytes + input_len + right_padding_bytes + extra <= bytes_per_line,
        "row does not fit: {left_padding_bytes} + {input_len} + {right_padding_bytes} + {extra} > {bytes_per_line}"
    );

    let width = bytes_per_line - left_padding_bytes - right_padding_bytes;
    let src = &input[..input_len];
    let out = &mut output[left_padding_bytes..];

    if shift == 0 {
        let mut nonzero = false;
        if mirror {
            for (i, &v) in src.iter().enumerate() {
                if v != 0 {
                    nonzero = true;
                }
                out[i] = v ^ xor_mask;
            }
        } else {
            for (i, &v) in src.iter().rev().enumerate() {
                let r = byte_reverse(v);
                if r != 0 {
                    nonzero = true;
                }
                out[i] = r ^ xor_mask;
            }
        }
        return nonzero;
    }

    assert!(
        input_len + extra <= MAX_SHIFT_BUF,
        "row too wide for the fixed shift buffer: {input_len} + {extra} > {MAX_SHIFT_BUF}"
    );
    let mut buf = [0u8; MAX_SHIFT_BUF];
    let shifted = &mut buf[..input_len + extra];
    let nonzero = if mirror {
        shift_right_into(src, false, shift as u32, shifted)
    } else if shift > 0 {
        shift_right_into(src, true, shift as u32, shifted)
    } else {
        shift_left_into(src, true, (-shift) as u32, shifted)
    };

    let region = &mut out[..width.min(shifted.len())];
    let mut any = false;
    for (i, b) in region.iter_mut().enumerate() {
        let v = shifted[i];
        let v = if mirror { v } else { byte_reverse(v) };
        if v != 0 {
            any = true;
        }
        *b = v ^ xor_mask;
    }
    nonzero && any
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirror_identity_with_no_shift_or_padding() {
        let input = [0x80u8, 0x40, 0x20];
        let mut out = [0u8; 3];
        let nonzero = transform_row(&input, 3, &mut out, 3, 0, 0, 0, true, 0);
        assert!(nonzero);
        assert_eq!(out, input);
    }

    #[test]
    fn non_mirror_reverses_byte_and_row_order() {
        let input = [0x80u8, 0x40, 0x20];
        let mut out = [0u8; 3];
        transform_row(&input, 3, &mut out, 3, 0, 0, 0, false, 0);
        // reversed byte order, each byte bit-reversed
        assert_eq!(out, [byte_reverse(0x20), byte_reverse(0x40), byte_reverse(0x80)]);
    }

    #[test]
    fn zero_width_row_is_pure_background() {
        let mut out = [0xAAu8; 4];
        let nonzero = transform_row(&[], 0, &mut out, 4, 0, 0, 0, true, 0xAA);
        assert!(!nonzero);
        assert_eq!(out, [0xAA; 4]);
    }

    #[test]
    fn right_padding_stays_background() {
        let input = [0xFFu8];
        let mut out = [0u8; 3];
        transform_row(&input, 1, &mut out, 3, 0, 2, 0, true, 0);
        assert_eq!(out, [0xFF, 0x00, 0x00]);
    }

    #[test]
    fn left_padding_stays_background_and_offsets_the_data() {
        let input = [0xFFu8];
        let mut out = [0u8; 3];
        transform_row(&input, 1, &mut out, 3, 2, 0, 0, true, 0);
        assert_eq!(out, [0x00, 0x00, 0xFF]);
    }

    #[test]
    fn negative_print_inverts_bits_but_not_padding_side() {
        let input = [0xFFu8; 2];
        let mut out = [0u8; 2];
        let nonzero = transform_row(&input, 2, &mut out, 2, 0, 0, 0, true, 0xFF);
        // all-ink input under negative print becomes all-zero output: still "nonzero"
        // in the sense that pixels differ from background (0xFF).
        assert!(nonzero);
        assert_eq!(out, [0x00, 0x00]);
    }

    #[test]
    fn shift_right_moves_bits_into_an_extra_byte() {
        let input = [0b1000_0000u8];
        let mut out = [0u8; 2];
        transform_row(&input, 1, &mut out, 2, 0, 0, 1, true, 0);
        assert_eq!(out, [0b0100_0000, 0]);
    }

    #[test]
    fn shift_combines_with_a_left_offset() {
        // left_padding_bytes=1, shift=4: the data's first byte straddles the
        // boundary between the padding byte and the first data byte.
        let input = [0xFFu8];
        let mut out = [0u8; 3];
        transform_row(&input, 1, &mut out, 3, 1, 0, 4, true, 0);
        assert_eq!(out, [0x00, 0x0F, 0xF0]);
    }

    #[test]
    fn double_mirror_with_zero_shift_restores_pixels() {
        let input = [0x12u8, 0x34, 0xAB];
        let mut once = [0u8; 3];
        transform_row(&input, 3, &mut once, 3, 0, 0, 0, true, 0);
        let mut twice = [0u8; 3];
        transform_row(&once, 3, &mut twice, 3, 0, 0, 0, true, 0);
        assert_eq!(twice, input);
    }
}
