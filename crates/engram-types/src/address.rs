//! Fixed-width address codec for sparse distributed memory.
//!
//! Addresses and values are 1024-bit vectors stored as 16 unsigned 64-bit
//! chunks. At this width, independently drawn random addresses are pairwise
//! near-orthogonal, which is what makes SDM addressing work: a write lands on
//! a neighborhood of nearby addresses rather than one exact cell, and a read
//! matches against the nearest stored addresses. Hamming distance is the
//! proximity metric. The neighborhood read/write and aggregation logic live
//! server-side; this module only provides the representation and the metric.

use crate::error::{EngramError, EngramResult};
use serde::{Deserialize, Serialize};

/// Number of 64-bit chunks in an address or value.
pub const SDM_CHUNKS: usize = 16;

/// Total width in bits.
pub const SDM_BITS: u32 = (SDM_CHUNKS as u32) * 64;

/// A fixed-width 1024-bit vector used as an SDM address or payload.
///
/// Immutable once constructed; the chunk count is enforced by the array type,
/// so a vector with the wrong width cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SdmVector {
    chunks: [u64; SDM_CHUNKS],
}

/// An SDM addressing key.
pub type SdmAddress = SdmVector;
/// An SDM payload.
pub type SdmValue = SdmVector;

impl SdmVector {
    /// The all-zero vector.
    pub fn zero() -> Self {
        Self {
            chunks: [0; SDM_CHUNKS],
        }
    }

    /// Draw a uniformly random vector: 16 independent uniform `u64`s.
    pub fn random() -> Self {
        let mut chunks = [0u64; SDM_CHUNKS];
        for chunk in chunks.iter_mut() {
            *chunk = rand::random::<u64>();
        }
        Self { chunks }
    }

    /// Construct from exactly [`SDM_CHUNKS`] chunks.
    ///
    /// Any other count is a [`EngramError::Validation`] failure.
    pub fn from_chunks(chunks: Vec<u64>) -> EngramResult<Self> {
        let fixed: [u64; SDM_CHUNKS] = chunks.try_into().map_err(|v: Vec<u64>| {
            EngramError::Validation(format!(
                "SDM vector requires exactly {} chunks, got {}",
                SDM_CHUNKS,
                v.len()
            ))
        })?;
        Ok(Self { chunks: fixed })
    }

    /// The underlying chunks.
    pub fn chunks(&self) -> &[u64; SDM_CHUNKS] {
        &self.chunks
    }

    /// Read bit `i` (0-based, chunk-major, LSB-first within a chunk).
    pub fn bit(&self, i: u32) -> bool {
        debug_assert!(i < SDM_BITS);
        (self.chunks[(i / 64) as usize] >> (i % 64)) & 1 == 1
    }

    /// A copy with bit `i` flipped.
    pub fn with_bit_flipped(&self, i: u32) -> Self {
        debug_assert!(i < SDM_BITS);
        let mut chunks = self.chunks;
        chunks[(i / 64) as usize] ^= 1u64 << (i % 64);
        Self { chunks }
    }

    /// Hamming distance to another vector: the number of differing bits.
    ///
    /// Each chunk pair is XORed and population-counted as two 32-bit halves.
    /// Result range is `0..=1024`.
    pub fn hamming_distance(&self, other: &SdmVector) -> u32 {
        let mut distance = 0u32;
        for (a, b) in self.chunks.iter().zip(other.chunks.iter()) {
            let diff = a ^ b;
            let low = (diff & 0xFFFF_FFFF) as u32;
            let high = (diff >> 32) as u32;
            distance += low.count_ones() + high.count_ones();
        }
        distance
    }
}

impl Default for SdmVector {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for SdmVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for chunk in &self.chunks {
            write!(f, "{chunk:016x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        for _ in 0..32 {
            let x = SdmVector::random();
            assert_eq!(x.hamming_distance(&x), 0);
        }
    }

    #[test]
    fn test_distance_is_symmetric() {
        for _ in 0..32 {
            let x = SdmVector::random();
            let y = SdmVector::random();
            assert_eq!(x.hamming_distance(&y), y.hamming_distance(&x));
        }
    }

    #[test]
    fn test_distance_in_range() {
        for _ in 0..32 {
            let x = SdmVector::random();
            let y = SdmVector::random();
            assert!(x.hamming_distance(&y) <= SDM_BITS);
        }
        let zero = SdmVector::zero();
        let ones = SdmVector::from_chunks(vec![u64::MAX; SDM_CHUNKS]).unwrap();
        assert_eq!(zero.hamming_distance(&ones), SDM_BITS);
    }

    #[test]
    fn test_single_bit_flip_changes_distance_by_one() {
        let y = SdmVector::random();
        for bit in [0u32, 31, 32, 63, 64, 511, 1023] {
            let x = SdmVector::random();
            let before = x.hamming_distance(&y);
            let after = x.with_bit_flipped(bit).hamming_distance(&y);
            assert_eq!(
                before.abs_diff(after),
                1,
                "flipping bit {bit} must move the distance by exactly 1"
            );
        }
    }

    #[test]
    fn test_zero_vs_one_chunk_distance_one() {
        let a = SdmVector::zero();
        let mut chunks = vec![0u64; SDM_CHUNKS];
        chunks[0] = 1;
        let b = SdmVector::from_chunks(chunks).unwrap();
        assert_eq!(a.hamming_distance(&b), 1);
    }

    #[test]
    fn test_wrong_chunk_count_is_validation_error() {
        for count in [0usize, 1, 15, 17, 32] {
            let err = SdmVector::from_chunks(vec![0u64; count]).unwrap_err();
            assert!(
                matches!(err, EngramError::Validation(_)),
                "count {count} must fail validation"
            );
        }
    }

    #[test]
    fn test_bit_accessor_matches_flip() {
        let x = SdmVector::zero();
        let flipped = x.with_bit_flipped(70);
        assert!(!x.bit(70));
        assert!(flipped.bit(70));
        assert!(!flipped.bit(71));
    }

    #[test]
    fn test_serde_roundtrip_json_and_msgpack() {
        let x = SdmVector::random();
        let json = serde_json::to_string(&x).unwrap();
        let back: SdmVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, x);

        let bytes = rmp_serde::to_vec(&x).unwrap();
        let back: SdmVector = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(back, x);
    }

    #[test]
    fn test_display_is_hex_of_all_chunks() {
        let zero = SdmVector::zero();
        assert_eq!(zero.to_string().len(), SDM_CHUNKS * 16);
        assert!(zero.to_string().chars().all(|c| c == '0'));
    }
}
