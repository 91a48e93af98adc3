//! Multi-index hashing over the sixteen 16-bit slots of a hash.
//!
//! Two hashes within distance `d` must agree to within `d / 16` bits on at
//! least one slot. A query therefore looks up every slot value within that
//! radius of the needle's slot, collects the entries filed under any of
//! them, and checks each candidate's full distance. Enumerating slot
//! neighbours grows quickly with the radius, so the index refuses
//! thresholds above [`MIH_MAX_DISTANCE`]; use a linear scan there.

use crate::core::distance::hamming_distance_le;
use crate::core::hash::{Hash256, HASH256_NUM_SLOTS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

const SLOT_BITS: u32 = 16;

/// Largest per-slot radius the index enumerates.
pub const MIH_MAX_SLOT_RADIUS: u32 = 3;
/// Largest whole-hash threshold with `threshold / 16 <= MIH_MAX_SLOT_RADIUS`.
pub const MIH_MAX_DISTANCE: u32 = (MIH_MAX_SLOT_RADIUS + 1) * SLOT_BITS - 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("Distance {threshold} is above the index limit of {max}; use a linear scan")]
    ThresholdTooLarge { threshold: u32, max: u32 },
}

/// How a matcher finds candidate pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Multi-index lookup, falling back to a scan above [`MIH_MAX_DISTANCE`].
    #[default]
    Index,
    /// Compare against every entry.
    LinearScan,
}

impl SearchStrategy {
    /// Whether a search at `threshold` will actually go through the index.
    pub fn uses_index(self, threshold: u32) -> bool {
        self == SearchStrategy::Index && threshold <= MIH_MAX_DISTANCE
    }
}

/// Hashes filed by slot value. Each entry carries an owner, so several
/// entries (e.g. the rotations of one image) can answer for one position.
#[derive(Debug, Clone)]
pub struct MihIndex {
    hashes: Vec<Hash256>,
    owners: Vec<usize>,
    slots: Vec<HashMap<u16, Vec<usize>>>,
}

impl Default for MihIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MihIndex {
    pub fn new() -> Self {
        Self {
            hashes: Vec::new(),
            owners: Vec::new(),
            slots: vec![HashMap::new(); HASH256_NUM_SLOTS],
        }
    }

    /// Indexes `hashes`, each owned by its position.
    pub fn from_hashes(hashes: &[Hash256]) -> Self {
        let mut index = Self::new();
        for (i, hash) in hashes.iter().enumerate() {
            index.insert(*hash, i);
        }
        index
    }

    pub fn insert(&mut self, hash: Hash256, owner: usize) {
        let entry = self.hashes.len();
        for (slot, &value) in self.slots.iter_mut().zip(hash.slots()) {
            slot.entry(value).or_default().push(entry);
        }
        self.hashes.push(hash);
        self.owners.push(owner);
    }

    /// Number of entries, not owners.
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Owners with an entry that may lie within `threshold` of `needle`,
    /// ascending. A superset of the true matches; callers verify.
    pub fn candidates(&self, needle: &Hash256, threshold: u32) -> Result<Vec<usize>, IndexError> {
        let radius = slot_radius(threshold)?;
        let owners: BTreeSet<usize> = self
            .candidate_entries(needle, radius)
            .into_iter()
            .map(|entry| self.owners[entry])
            .collect();
        Ok(owners.into_iter().collect())
    }

    /// Owners with an entry within `threshold` of `needle`, ascending.
    pub fn query(&self, needle: &Hash256, threshold: u32) -> Result<Vec<usize>, IndexError> {
        let radius = slot_radius(threshold)?;
        let owners: BTreeSet<usize> = self
            .candidate_entries(needle, radius)
            .into_iter()
            .filter(|&entry| hamming_distance_le(needle, &self.hashes[entry], threshold))
            .map(|entry| self.owners[entry])
            .collect();
        Ok(owners.into_iter().collect())
    }

    /// Same answer as [`MihIndex::query`] by comparing every entry. Works
    /// at any threshold.
    pub fn linear_query(&self, needle: &Hash256, threshold: u32) -> Vec<usize> {
        let owners: BTreeSet<usize> = self
            .hashes
            .iter()
            .zip(&self.owners)
            .filter(|(hash, _)| hamming_distance_le(needle, hash, threshold))
            .map(|(_, &owner)| owner)
            .collect();
        owners.into_iter().collect()
    }

    fn candidate_entries(&self, needle: &Hash256, radius: u32) -> BTreeSet<usize> {
        let mut entries = BTreeSet::new();
        for (slot, &value) in self.slots.iter().zip(needle.slots()) {
            for neighbour in slot_neighbours(value, radius) {
                if let Some(found) = slot.get(&neighbour) {
                    entries.extend(found.iter().copied());
                }
            }
        }
        entries
    }
}

fn slot_radius(threshold: u32) -> Result<u32, IndexError> {
    if threshold > MIH_MAX_DISTANCE {
        return Err(IndexError::ThresholdTooLarge {
            threshold,
            max: MIH_MAX_DISTANCE,
        });
    }
    Ok(threshold / SLOT_BITS)
}

/// Every 16-bit value within `radius` bit flips of `value`, itself first.
fn slot_neighbours(value: u16, radius: u32) -> Vec<u16> {
    let mut out = vec![value];
    extend_neighbours(value, 0, radius, &mut out);
    out
}

fn extend_neighbours(value: u16, from: u32, radius: u32, out: &mut Vec<u16>) {
    if radius == 0 {
        return;
    }
    for bit in from..SLOT_BITS {
        let flipped = value ^ (1 << bit);
        out.push(flipped);
        extend_neighbours(flipped, bit + 1, radius - 1, out);
    }
}
