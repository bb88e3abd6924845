//! Additive checksum used by band command frames
//!
//! The checksum is the two's complement of the 8-bit wrapping sum of every
//! preceding byte, XORed with `0x3A`. Inbound frames carry the same trailing
//! byte, but the dispatcher does not check it on receive.

/// XOR mask applied after negating the byte sum
const CHECKSUM_MASK: u8 = 0x3A;

/// Compute the checksum over `bytes`
pub fn compute(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg() ^ CHECKSUM_MASK
}

/// Check that the last byte of `frame` is the checksum of the bytes before it
///
/// Only used by tooling and tests; received frames are accepted unverified.
pub fn verify(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((&checksum, body)) if !body.is_empty() => compute(body) == checksum,
        _ => false,
    }
}
