//! Fixed-width and variable-length integer encoding
//!
//! - Fixed-width integers are little-endian.
//! - Varints are LEB128: 7 payload bits per byte, high bit set on every byte
//!   except the last.
//! - Length-prefixed slices are `varint32(len) ++ bytes`.
//!
//! Decoders return `None` on truncated or overlong input and hand back the
//! unconsumed remainder of the slice on success.

use bytes::{Buf, BufMut};

/// Longest possible varint32 encoding
pub const MAX_VARINT32_LEN: usize = 5;

/// Longest possible varint64 encoding
pub const MAX_VARINT64_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;

// =============================================================================
// Fixed-width
// =============================================================================

pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    dst.put_u32_le(value);
}

pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    dst.put_u64_le(value);
}

/// Write `value` into the first 8 bytes of `dst`
pub fn encode_fixed64(dst: &mut [u8], value: u64) {
    let mut buf = &mut dst[..8];
    buf.put_u64_le(value);
}

/// Write `value` into the first 4 bytes of `dst`
pub fn encode_fixed32(dst: &mut [u8], value: u32) {
    let mut buf = &mut dst[..4];
    buf.put_u32_le(value);
}

/// Read a u32 from the first 4 bytes of `src`
pub fn decode_fixed32(src: &[u8]) -> u32 {
    let mut buf = &src[..4];
    buf.get_u32_le()
}

/// Read a u64 from the first 8 bytes of `src`
pub fn decode_fixed64(src: &[u8]) -> u64 {
    let mut buf = &src[..8];
    buf.get_u64_le()
}

// =============================================================================
// Varint
// =============================================================================

/// Encode `value` into `dst`, returning the number of bytes written.
///
/// `dst` must hold at least `MAX_VARINT32_LEN` bytes or `varint_length(value)`.
pub fn encode_varint32(dst: &mut [u8], value: u32) -> usize {
    encode_varint64(dst, value as u64)
}

/// Encode `value` into `dst`, returning the number of bytes written.
pub fn encode_varint64(dst: &mut [u8], mut value: u64) -> usize {
    let mut i = 0;
    while value >= CONTINUATION as u64 {
        dst[i] = (value as u8) | CONTINUATION;
        value >>= 7;
        i += 1;
    }
    dst[i] = value as u8;
    i + 1
}

pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; MAX_VARINT32_LEN];
    let n = encode_varint32(&mut buf, value);
    dst.extend_from_slice(&buf[..n]);
}

pub fn put_varint64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; MAX_VARINT64_LEN];
    let n = encode_varint64(&mut buf, value);
    dst.extend_from_slice(&buf[..n]);
}

/// Number of bytes the varint encoding of `value` occupies
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= CONTINUATION as u64 {
        value >>= 7;
        len += 1;
    }
    len
}

pub fn get_varint32(src: &[u8]) -> Option<(u32, &[u8])> {
    let (value, rest) = decode_varint(src, MAX_VARINT32_LEN)?;
    let value = u32::try_from(value).ok()?;
    Some((value, rest))
}

pub fn get_varint64(src: &[u8]) -> Option<(u64, &[u8])> {
    decode_varint(src, MAX_VARINT64_LEN)
}

fn decode_varint(src: &[u8], max_len: usize) -> Option<(u64, &[u8])> {
    let mut result: u64 = 0;
    for (i, &byte) in src.iter().take(max_len).enumerate() {
        let shift = 7 * i as u32;
        result |= ((byte & !CONTINUATION) as u64) << shift;
        if byte & CONTINUATION == 0 {
            return Some((result, &src[i + 1..]));
        }
    }
    None
}

// =============================================================================
// Length-prefixed slices
// =============================================================================

pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, value: &[u8]) {
    put_varint32(dst, value.len() as u32);
    dst.extend_from_slice(value);
}

/// Split a length-prefixed slice off the front of `src`
pub fn get_length_prefixed_slice(src: &[u8]) -> Option<(&[u8], &[u8])> {
    let (len, rest) = get_varint32(src)?;
    let len = len as usize;
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}
