//! Hamming norm and distance.
//!
//! Popcounts go through a 16-entry nibble table rather than
//! `count_ones`, so every path (full hash, word views, legacy hex lines)
//! shares one definition of the metric.

use crate::core::hash::{Hash256, HashError, Word, WordView, HASH256_NUM_SLOTS};

/// Population count of every 4-bit value.
pub const NIBBLE_POPCOUNT: [u8; 16] = [0, 1, 1, 2, 1, 2, 2, 3, 1, 2, 2, 3, 2, 3, 3, 4];

fn popcount_word(word: u64, bits: usize) -> u32 {
    (0..bits)
        .step_by(4)
        .map(|shift| u32::from(NIBBLE_POPCOUNT[((word >> shift) & 0xf) as usize]))
        .sum()
}

fn xor_popcount_word(a: u64, b: u64, bits: usize) -> u32 {
    (0..bits)
        .step_by(4)
        .map(|shift| {
            let na = (a >> shift) & 0xf;
            let nb = (b >> shift) & 0xf;
            u32::from(NIBBLE_POPCOUNT[(na ^ nb) as usize])
        })
        .sum()
}

/// Number of set bits.
pub fn hamming_norm(hash: &Hash256) -> u32 {
    hash.slots()
        .iter()
        .map(|&slot| popcount_word(u64::from(slot), 16))
        .sum()
}

pub fn hamming_distance(a: &Hash256, b: &Hash256) -> u32 {
    a.slots()
        .iter()
        .zip(b.slots())
        .map(|(&x, &y)| xor_popcount_word(u64::from(x), u64::from(y), 16))
        .sum()
}

/// `hamming_distance(a, b) <= max`, stopping as soon as the running total
/// exceeds `max`.
pub fn hamming_distance_le(a: &Hash256, b: &Hash256, max: u32) -> bool {
    let mut total = 0;
    for i in 0..HASH256_NUM_SLOTS {
        total += xor_popcount_word(u64::from(a.slots()[i]), u64::from(b.slots()[i]), 16);
        if total > max {
            return false;
        }
    }
    true
}

/// Popcount of each 16-bit slot, slot 0 first.
pub fn slot_norms(hash: &Hash256) -> [u32; HASH256_NUM_SLOTS] {
    let slots = *hash.slots();
    slots.map(|slot| popcount_word(u64::from(slot), 16))
}

impl<W: Word> WordView<W> {
    pub fn hamming_norm(&self) -> u32 {
        self.words()
            .iter()
            .map(|w| popcount_word(w.to_u64(), W::BITS))
            .sum()
    }

    pub fn hamming_distance(&self, other: &WordView<W>) -> u32 {
        self.words()
            .iter()
            .zip(other.words())
            .map(|(a, b)| xor_popcount_word(a.to_u64(), b.to_u64(), W::BITS))
            .sum()
    }
}

fn parse_nibbles(text: &str) -> Result<Vec<u8>, HashError> {
    text.chars()
        .map(|c| {
            c.to_digit(16).map(|d| d as u8).ok_or_else(|| HashError::InvalidFormat {
                input: text.to_string(),
                reason: format!("non-hex character {:?}", c),
            })
        })
        .collect()
}

fn nibble_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| u32::from(NIBBLE_POPCOUNT[(x ^ y) as usize]))
        .sum()
}

/// Distance between two hex strings of any equal length. Unequal lengths
/// are `LengthMismatch`.
pub fn hamming_distance_hex_strict(a: &str, b: &str) -> Result<u32, HashError> {
    let left = parse_nibbles(a.trim())?;
    let right = parse_nibbles(b.trim())?;
    if left.len() != right.len() {
        return Err(HashError::LengthMismatch {
            left: left.len(),
            right: right.len(),
        });
    }
    Ok(nibble_distance(&left, &right))
}

/// Distance over the first `min(len(a), len(b))` nibbles only. Trailing
/// nibbles of the longer input are ignored.
pub fn hamming_distance_hex_truncating(a: &str, b: &str) -> Result<u32, HashError> {
    let left = parse_nibbles(a.trim())?;
    let right = parse_nibbles(b.trim())?;
    if left.len() != right.len() {
        log::debug!(
            "truncating hex comparison to {} nibbles ({} vs {})",
            left.len().min(right.len()),
            left.len(),
            right.len()
        );
    }
    Ok(nibble_distance(&left, &right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::HASH256_NUM_BITS;
    use proptest::prelude::*;

    const A: &str = "f8f8f0cce0f4e84d0e370a22028f67f0b36e2ed596623e1d33e6339c4e9c9b22";
    const B: &str = "f8f80f31e0f417b00e37f5cd028f980fb36ed02a9662c1e233e6cc634e9c64dd";

    fn hash(s: &str) -> Hash256 {
        Hash256::from_hex_string(s).unwrap()
    }

    #[test]
    fn test_table_matches_count_ones() {
        for (n, &count) in NIBBLE_POPCOUNT.iter().enumerate() {
            assert_eq!(u32::from(count), (n as u32).count_ones());
        }
        assert_eq!(NIBBLE_POPCOUNT[0], 0);
        assert_eq!(NIBBLE_POPCOUNT[0xf], 4);
    }

    #[test]
    fn test_norm_grows_one_per_set_bit() {
        let mut hash = Hash256::zeroes();
        assert_eq!(hamming_norm(&hash), 0);
        for i in 0..HASH256_NUM_BITS {
            hash.set_bit(i).unwrap();
            assert_eq!(hamming_norm(&hash), i as u32 + 1);
        }
        assert_eq!(hash, Hash256::ones());
    }

    #[test]
    fn test_distance_identity_and_symmetry() {
        let (a, b) = (hash(A), hash(B));
        assert_eq!(hamming_distance(&a, &a), 0);
        assert_eq!(hamming_distance(&a, &b), hamming_distance(&b, &a));
        assert_eq!(hamming_distance(&a, &b), hamming_norm(&(a ^ b)));
    }

    #[test]
    fn test_distance_to_complement_is_256() {
        let a = hash(A);
        assert_eq!(hamming_distance(&a, &!a), 256);
    }

    #[test]
    fn test_distance_le_agrees_at_boundary() {
        let (a, b) = (hash(A), hash(B));
        let d = hamming_distance(&a, &b);
        assert!(hamming_distance_le(&a, &b, d));
        assert!(!hamming_distance_le(&a, &b, d - 1));
    }

    #[test]
    fn test_slot_norms_sum_to_norm() {
        let a = hash(A);
        let norms = slot_norms(&a);
        assert_eq!(norms.iter().sum::<u32>(), hamming_norm(&a));
        assert_eq!(norms[0], 0x9b22u16.count_ones());
    }

    #[test]
    fn test_strict_hex_rejects_length_mismatch() {
        assert_eq!(
            hamming_distance_hex_strict("ff", "fff"),
            Err(HashError::LengthMismatch { left: 2, right: 3 })
        );
        assert_eq!(hamming_distance_hex_strict("f0", "0f"), Ok(8));
        assert!(hamming_distance_hex_strict("zz", "00").is_err());
    }

    #[test]
    fn test_truncating_hex_stops_at_shorter() {
        assert_eq!(hamming_distance_hex_truncating("f0", "f0ffff"), Ok(0));
        assert_eq!(hamming_distance_hex_truncating("f1", "f0"), Ok(1));
        assert_eq!(
            hamming_distance_hex_truncating(A, B).unwrap(),
            hamming_distance(&hash(A), &hash(B))
        );
    }

    proptest! {
        #[test]
        fn prop_word_views_agree(
            x in proptest::array::uniform16(any::<u16>()),
            y in proptest::array::uniform16(any::<u16>()),
        ) {
            let (a, b) = (Hash256::from_slots(x), Hash256::from_slots(y));
            let d = hamming_distance(&a, &b);
            prop_assert_eq!(d, hamming_distance(&b, &a));
            prop_assert_eq!(d, a.words16().hamming_distance(&b.words16()));
            prop_assert_eq!(d, a.words32().hamming_distance(&b.words32()));
            prop_assert_eq!(d, a.words64().hamming_distance(&b.words64()));
            prop_assert_eq!(hamming_norm(&a), a.words64().hamming_norm());
            let popcount: u32 = x.iter().map(|s| s.count_ones()).sum();
            prop_assert_eq!(hamming_norm(&a), popcount);
        }
    }
}
