//! Source-identity hash stamped onto the rename context.
//!
//! Rolling multiply-xor over UTF-16 code units, scanned back to front. Not
//! cryptographic; collisions are acceptable since it only tags a snapshot.

const SEED: u32 = 0x94a3_fa21;

/// Hash `source` the same way regardless of platform.
pub fn source_hash(source: &str) -> u32 {
    let units: Vec<u16> = source.encode_utf16().collect();
    units
        .iter()
        .rev()
        .fold(SEED, |acc, &unit| acc.wrapping_mul(33) ^ u32::from(unit))
}
