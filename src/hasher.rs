//! The hash function baked into the mcdb file format.
//!
//! Files must be reproducible bit-for-bit across implementations, so the hash
//! is part of the format contract rather than a pluggable strategy: djb2 with
//! xor folding, evaluated in wrapping 32-bit arithmetic. It is deliberately
//! fast, not collision-resistant; the tables absorb collisions.

use crate::{SLOT_BITS, SLOTS};

/// Initial state of the hash accumulator.
pub const HASH_INIT: u32 = 5381;

/// Hashes `key` with the format's djb2-xor function.
///
/// `h = ((h << 5) + h) ^ b` for each key byte `b`, all wrapping `u32`.
#[inline]
pub fn hash(key: &[u8]) -> u32 {
    key.iter().fold(HASH_INIT, |h, &b| {
        h.wrapping_shl(5).wrapping_add(h) ^ u32::from(b)
    })
}

/// Directory slot for a hash: the low [`SLOT_BITS`] bits.
#[inline]
pub(crate) fn slot_index(hash: u32) -> usize {
    (hash as usize) & (SLOTS - 1)
}

/// Starting probe index within a table of `tlen` entries.
///
/// The low bits picked the slot, so the probe start comes from the bits
/// above them.
#[inline]
pub(crate) fn probe_start(hash: u32, tlen: u64) -> u64 {
    u64::from(hash >> SLOT_BITS) % tlen
}
