//! CRC32C helpers
//!
//! Stored checksums are masked: the raw value is rotated and offset before it
//! is written, and unmasked before comparison.

const MASK_DELTA: u32 = 0xa282_ead8;

/// CRC32C of `data`
pub fn value(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// CRC32C of `init_crc`'s input followed by `data`
pub fn extend(init_crc: u32, data: &[u8]) -> u32 {
    crc32c::crc32c_append(init_crc, data)
}

/// Masked representation of `crc`, the form written to disk
pub fn mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask`]
pub fn unmask(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}
