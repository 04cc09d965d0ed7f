// src/bitstream/insert.rs

//! Non-byte-aligned bit splicing.

#[inline]
fn high_mask(bits: usize) -> u8 {
    if bits == 0 { 0 } else { 0xffu8 << (8 - bits) }
}

/// Eight source bits starting at bit index `bit`, MSB first. Bits past the
/// end of `src` read as zero.
#[inline]
fn fetch_byte(src: &[u8], bit: usize) -> u8 {
    let i = bit >> 3;
    let shift = bit & 7;
    let hi = src.get(i).copied().unwrap_or(0);
    if shift == 0 {
        return hi;
    }
    let lo = src.get(i + 1).copied().unwrap_or(0);
    (hi << shift) | (lo >> (8 - shift))
}

/// Copies `bit_count` bits of `src`, starting at bit `src_offset`, into
/// `dest` starting at bit `dest_offset`.
///
/// The first `dest_offset` bits of `dest` are preserved. Bits after the copied
/// range, up to the end of the last byte touched, are cleared; bytes past
/// that are left alone.
///
/// # Panics
///
/// Panics if `dest` is shorter than `bits_to_bytes(dest_offset + bit_count)`.
pub fn insert_bits(
    dest: &mut [u8],
    src: &[u8],
    bit_count: usize,
    dest_offset: usize,
    src_offset: usize,
) {
    if bit_count == 0 {
        return;
    }

    let mut dpos = dest_offset >> 3;
    let dshift = dest_offset & 7;
    let mut sbit = src_offset;
    let mut remaining = bit_count;

    // Partial leading byte.
    let n = remaining.min(8 - dshift);
    let region = high_mask(dshift + n) & !high_mask(dshift);
    let incoming = fetch_byte(src, sbit) >> dshift;
    dest[dpos] = (dest[dpos] & high_mask(dshift)) | (incoming & region);
    sbit += n;
    remaining -= n;
    dpos += 1;

    while remaining > 0 {
        let n = remaining.min(8);
        dest[dpos] = fetch_byte(src, sbit) & high_mask(n);
        sbit += n;
        remaining -= n;
        dpos += 1;
    }
}
