//! 256-bit perceptual hashes.
//!
//! A hash is stored as 16 slots of 16 bits. Bit `k` lives in slot `k / 16`
//! at offset `k % 16`. The hex form renders slot 15 first, so the first hex
//! character is the top nibble of the highest slot.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor, Not};
use std::str::FromStr;
use thiserror::Error;

pub const HASH256_NUM_BITS: usize = 256;
pub const HASH256_NUM_SLOTS: usize = 16;
pub const HASH256_HEX_LENGTH: usize = 64;

const SLOT_BITS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("Malformed hash \"{input}\": {reason}")]
    InvalidFormat { input: String, reason: String },

    #[error("Bit index {index} out of range 0..{}", HASH256_NUM_BITS)]
    IndexOutOfRange { index: usize },

    #[error("Length mismatch: {left} vs {right} nibbles")]
    LengthMismatch { left: usize, right: usize },
}

impl HashError {
    fn invalid(input: &str, reason: impl Into<String>) -> Self {
        HashError::InvalidFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256 {
    slots: [u16; HASH256_NUM_SLOTS],
}

impl Hash256 {
    /// All 256 bits cleared.
    pub fn zeroes() -> Self {
        Self::default()
    }

    /// All 256 bits set.
    pub fn ones() -> Self {
        Self {
            slots: [u16::MAX; HASH256_NUM_SLOTS],
        }
    }

    pub fn from_slots(slots: [u16; HASH256_NUM_SLOTS]) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[u16; HASH256_NUM_SLOTS] {
        &self.slots
    }

    pub fn get_bit(&self, index: usize) -> Result<bool, HashError> {
        check_index(index)?;
        Ok(self.bit(index))
    }

    /// Sets bit `index` to 1. Setting an already-set bit is a no-op.
    pub fn set_bit(&mut self, index: usize) -> Result<(), HashError> {
        check_index(index)?;
        self.slots[index / SLOT_BITS] |= 1 << (index % SLOT_BITS);
        Ok(())
    }

    pub fn clear_bit(&mut self, index: usize) -> Result<(), HashError> {
        check_index(index)?;
        self.slots[index / SLOT_BITS] &= !(1 << (index % SLOT_BITS));
        Ok(())
    }

    pub fn flip_bit(&mut self, index: usize) -> Result<(), HashError> {
        check_index(index)?;
        self.toggle(index);
        Ok(())
    }

    // Callers guarantee index < 256.
    pub(crate) fn bit(&self, index: usize) -> bool {
        (self.slots[index / SLOT_BITS] >> (index % SLOT_BITS)) & 1 == 1
    }

    pub(crate) fn toggle(&mut self, index: usize) {
        self.slots[index / SLOT_BITS] ^= 1 << (index % SLOT_BITS);
    }

    pub fn to_hex_string(&self) -> String {
        self.slots
            .iter()
            .rev()
            .map(|slot| format!("{:04x}", slot))
            .collect()
    }

    /// Parses 64 hex characters, case-insensitively.
    pub fn from_hex_string(s: &str) -> Result<Self, HashError> {
        if s.len() != HASH256_HEX_LENGTH {
            return Err(HashError::invalid(
                s,
                format!(
                    "expected {} hex characters, found {}",
                    HASH256_HEX_LENGTH,
                    s.chars().count()
                ),
            ));
        }
        if let Some(bad) = s.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(HashError::invalid(
                s,
                format!("non-hex character {:?}", bad),
            ));
        }

        let mut slots = [0u16; HASH256_NUM_SLOTS];
        for (k, chunk) in s.as_bytes().chunks(4).enumerate() {
            let text = std::str::from_utf8(chunk)
                .map_err(|e| HashError::invalid(s, e.to_string()))?;
            slots[HASH256_NUM_SLOTS - 1 - k] =
                u16::from_str_radix(text, 16).map_err(|e| HashError::invalid(s, e.to_string()))?;
        }
        Ok(Self { slots })
    }

    pub fn words16(&self) -> WordView<u16> {
        WordView::of(self)
    }

    pub fn words32(&self) -> WordView<u32> {
        WordView::of(self)
    }

    pub fn words64(&self) -> WordView<u64> {
        WordView::of(self)
    }

    pub fn to_16bit_strings(&self) -> Vec<String> {
        self.words16().to_hex_strings()
    }

    pub fn to_32bit_strings(&self) -> Vec<String> {
        self.words32().to_hex_strings()
    }

    pub fn to_64bit_strings(&self) -> Vec<String> {
        self.words64().to_hex_strings()
    }

    /// 16 rows of 16 space-separated bits, highest slot first and most
    /// significant bit first within each row.
    pub fn bit_matrix(&self) -> Vec<String> {
        self.slots
            .iter()
            .rev()
            .map(|slot| {
                (0..SLOT_BITS)
                    .rev()
                    .map(|j| if (slot >> j) & 1 == 1 { "1" } else { "0" })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    fn zip_with(&self, other: &Self, f: impl Fn(u16, u16) -> u16) -> Self {
        let mut slots = [0u16; HASH256_NUM_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            *slot = f(self.slots[i], other.slots[i]);
        }
        Self { slots }
    }
}

fn check_index(index: usize) -> Result<(), HashError> {
    if index >= HASH256_NUM_BITS {
        return Err(HashError::IndexOutOfRange { index });
    }
    Ok(())
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for slot in self.slots.iter().rev() {
            write!(f, "{:04x}", slot)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex_string(s)
    }
}

impl BitXor for Hash256 {
    type Output = Hash256;

    fn bitxor(self, rhs: Self) -> Self::Output {
        self.zip_with(&rhs, |a, b| a ^ b)
    }
}

impl BitAnd for Hash256 {
    type Output = Hash256;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.zip_with(&rhs, |a, b| a & b)
    }
}

impl BitOr for Hash256 {
    type Output = Hash256;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.zip_with(&rhs, |a, b| a | b)
    }
}

impl Not for Hash256 {
    type Output = Hash256;

    fn not(self) -> Self::Output {
        Self {
            slots: self.slots.map(|slot| !slot),
        }
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Hash256::from_hex_string(&text).map_err(serde::de::Error::custom)
    }
}

/// Unsigned word widths a hash can be chunked into.
pub trait Word: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    const BITS: usize;

    /// Builds a word from consecutive 16-bit slots, lowest slot first.
    fn from_slots(slots: &[u16]) -> Self;

    fn to_u64(self) -> u64;
}

macro_rules! impl_word {
    ($($t:ty),*) => {
        $(
            impl Word for $t {
                const BITS: usize = <$t>::BITS as usize;

                fn from_slots(slots: &[u16]) -> Self {
                    slots
                        .iter()
                        .rev()
                        .fold(0u64, |acc, &slot| (acc << SLOT_BITS) | u64::from(slot)) as $t
                }

                fn to_u64(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_word!(u16, u32, u64);

/// Read-only decomposition of a hash into `256 / W::BITS` words, word 0
/// holding the lowest bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordView<W: Word> {
    words: Vec<W>,
}

impl<W: Word> WordView<W> {
    pub fn of(hash: &Hash256) -> Self {
        let per_word = W::BITS / SLOT_BITS;
        let words = hash.slots.chunks(per_word).map(W::from_slots).collect();
        Self { words }
    }

    pub fn words(&self) -> &[W] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn to_hex_strings(&self) -> Vec<String> {
        let width = W::BITS / 4;
        self.words
            .iter()
            .map(|w| format!("{:0width$x}", w.to_u64(), width = width))
            .collect()
    }

    pub fn to_decimal_strings(&self) -> Vec<String> {
        self.words.iter().map(|w| w.to_u64().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KNOWN: &str = "f8f8f0cce0f4e84d0e370a22028f67f0b36e2ed596623e1d33e6339c4e9c9b22";

    #[test]
    fn test_known_vector_round_trips() {
        let hash = Hash256::from_hex_string(KNOWN).unwrap();
        assert_eq!(hash.to_hex_string(), KNOWN);
        assert_eq!(hash.to_string(), KNOWN);
        assert_eq!(hash.slots()[15], 0xf8f8);
        assert_eq!(hash.slots()[0], 0x9b22);
    }

    #[test]
    fn test_upper_case_input_normalizes() {
        let upper = Hash256::from_hex_string(&KNOWN.to_uppercase()).unwrap();
        let lower = Hash256::from_hex_string(KNOWN).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.to_hex_string(), KNOWN);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let too_long = format!("{}0", KNOWN);
        for bad in [&KNOWN[..63], "", too_long.as_str()] {
            let err = Hash256::from_hex_string(bad).unwrap_err();
            assert!(matches!(err, HashError::InvalidFormat { .. }), "{bad}");
        }
    }

    #[test]
    fn test_rejects_non_hex() {
        let bad = format!("g{}", &KNOWN[1..]);
        assert!(matches!(
            Hash256::from_hex_string(&bad),
            Err(HashError::InvalidFormat { .. })
        ));
        let with_prefix = format!("0x{}", &KNOWN[2..]);
        assert!(with_prefix.parse::<Hash256>().is_err());
    }

    #[test]
    fn test_rejects_multibyte_chars_of_right_byte_length() {
        // 62 ASCII chars plus one two-byte char is 64 bytes.
        let bad = format!("{}é", &KNOWN[..62]);
        assert_eq!(bad.len(), 64);
        assert!(Hash256::from_hex_string(&bad).is_err());
    }

    #[test]
    fn test_set_bit_layout() {
        let mut hash = Hash256::zeroes();
        hash.set_bit(0).unwrap();
        assert!(hash.to_hex_string().ends_with("0001"));

        let mut hash = Hash256::zeroes();
        hash.set_bit(255).unwrap();
        assert!(hash.to_hex_string().starts_with("8000"));

        let mut hash = Hash256::zeroes();
        hash.set_bit(17).unwrap();
        assert_eq!(hash.slots()[1], 0b10);
    }

    #[test]
    fn test_set_bit_is_idempotent() {
        let mut once = Hash256::zeroes();
        once.set_bit(42).unwrap();
        let mut twice = once;
        twice.set_bit(42).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_bit_index_out_of_range() {
        let mut hash = Hash256::zeroes();
        assert_eq!(
            hash.set_bit(256),
            Err(HashError::IndexOutOfRange { index: 256 })
        );
        assert!(hash.get_bit(1000).is_err());
        assert!(hash.clear_bit(256).is_err());
        assert!(hash.flip_bit(usize::MAX).is_err());
        assert_eq!(hash, Hash256::zeroes());
    }

    #[test]
    fn test_clear_and_flip() {
        let mut hash = Hash256::ones();
        hash.clear_bit(3).unwrap();
        assert!(!hash.get_bit(3).unwrap());
        hash.flip_bit(3).unwrap();
        hash.flip_bit(4).unwrap();
        assert!(hash.get_bit(3).unwrap());
        assert!(!hash.get_bit(4).unwrap());
    }

    #[test]
    fn test_word_string_lengths() {
        let hash = Hash256::from_hex_string(KNOWN).unwrap();
        let s16 = hash.to_16bit_strings();
        let s32 = hash.to_32bit_strings();
        let s64 = hash.to_64bit_strings();
        assert_eq!(s16.len(), 16);
        assert_eq!(s32.len(), 8);
        assert_eq!(s64.len(), 4);
        assert!(s16.iter().all(|s| s.len() == 4));
        assert!(s32.iter().all(|s| s.len() == 8));
        assert!(s64.iter().all(|s| s.len() == 16));
    }

    #[test]
    fn test_word_views_are_ascending() {
        let hash = Hash256::from_hex_string(KNOWN).unwrap();
        assert_eq!(hash.to_16bit_strings()[0], "9b22");
        assert_eq!(hash.to_32bit_strings()[0], "4e9c9b22");
        assert_eq!(hash.to_64bit_strings()[3], "f8f8f0cce0f4e84d");

        let reversed: String = hash.to_64bit_strings().into_iter().rev().collect();
        assert_eq!(reversed, KNOWN);
    }

    #[test]
    fn test_decimal_strings() {
        let mut hash = Hash256::zeroes();
        hash.set_bit(64).unwrap();
        hash.set_bit(65).unwrap();
        assert_eq!(hash.words64().to_decimal_strings(), vec!["0", "3", "0", "0"]);
    }

    #[test]
    fn test_bitwise_ops() {
        let a = Hash256::from_hex_string(KNOWN).unwrap();
        assert_eq!(a ^ a, Hash256::zeroes());
        assert_eq!(a & !a, Hash256::zeroes());
        assert_eq!(a | !a, Hash256::ones());
    }

    #[test]
    fn test_bit_matrix_shape() {
        let mut hash = Hash256::zeroes();
        hash.set_bit(255).unwrap();
        let rows = hash.bit_matrix();
        assert_eq!(rows.len(), 16);
        assert!(rows[0].starts_with("1 0"));
        assert_eq!(rows[15], vec!["0"; 16].join(" "));
    }

    #[test]
    fn test_serde_as_hex() {
        let hash = Hash256::from_hex_string(KNOWN).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", KNOWN));
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
        assert!(serde_json::from_str::<Hash256>("\"abc\"").is_err());
    }

    proptest! {
        #[test]
        fn prop_hex_round_trip(slots in proptest::array::uniform16(any::<u16>())) {
            let hash = Hash256::from_slots(slots);
            let text = hash.to_hex_string();
            prop_assert_eq!(text.len(), HASH256_HEX_LENGTH);
            prop_assert_eq!(Hash256::from_hex_string(&text).unwrap(), hash);
        }
    }
}
