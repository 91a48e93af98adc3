// Line renderers behind `pdqcull hashes <verb>`.

use crate::core::dihedral::{dihedral_variants, Dihedral};
use crate::core::distance::{hamming_distance, hamming_norm, slot_norms};
use crate::core::hash::Hash256;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Verb {
    /// Hash and its Hamming norm
    Norms,
    /// Hash and the popcount of each 16-bit slot
    Slotnorms,
    /// Distance from each hash to the one before it
    Deltas,
    /// XOR of each adjacent pair
    Axors,
    /// XOR of each hash with the first
    Fxors,
    /// Distance matrix, one row per left-hand hash
    Matrix,
    /// Distance matrix as DKVP lines
    Cij,
    /// Distance between same-position hashes of two lists
    Pairwise,
    /// 16x16 bit dump
    Bits,
    /// 16-bit slots in hex
    Words,
    /// The eight rotation/flip variants
    Dihedral,
}

pub fn norms(hashes: &[Hash256]) -> Vec<String> {
    hashes
        .iter()
        .map(|h| format!("{} {}", h, hamming_norm(h)))
        .collect()
}

pub fn slot_norm_lines(hashes: &[Hash256]) -> Vec<String> {
    hashes
        .iter()
        .map(|h| {
            let counts: String = slot_norms(h).iter().map(|n| format!(" {:2}", n)).collect();
            format!("{}{}", h, counts)
        })
        .collect()
}

pub fn deltas(hashes: &[Hash256]) -> Vec<String> {
    hashes
        .iter()
        .enumerate()
        .map(|(i, h)| match i {
            0 => h.to_string(),
            _ => format!("{} {}", h, hamming_distance(h, &hashes[i - 1])),
        })
        .collect()
}

pub fn adjacent_xors(hashes: &[Hash256]) -> Vec<String> {
    hashes
        .windows(2)
        .map(|pair| (pair[0] ^ pair[1]).to_string())
        .collect()
}

pub fn xors_from_first(hashes: &[Hash256]) -> Vec<String> {
    match hashes.split_first() {
        Some((first, rest)) => rest.iter().map(|h| (*first ^ *h).to_string()).collect(),
        None => Vec::new(),
    }
}

pub fn matrix(left: &[Hash256], right: &[Hash256]) -> Vec<String> {
    left.iter()
        .map(|a| {
            right
                .iter()
                .map(|b| format!(" {:3}", hamming_distance(a, b)))
                .collect()
        })
        .collect()
}

pub fn cij(left: &[Hash256], right: &[Hash256]) -> Vec<String> {
    let mut lines = Vec::with_capacity(left.len() * right.len());
    for (i, a) in left.iter().enumerate() {
        for (j, b) in right.iter().enumerate() {
            lines.push(format!(
                "ci={},cj={},i={},j={},d={}",
                a,
                b,
                i,
                j,
                hamming_distance(a, b)
            ));
        }
    }
    lines
}

/// Stops at the end of the shorter list.
pub fn pairwise(left: &[Hash256], right: &[Hash256]) -> Vec<String> {
    left.iter()
        .zip(right)
        .map(|(a, b)| format!("{:3}", hamming_distance(a, b)))
        .collect()
}

/// Bit matrix per hash, each followed by a blank line.
pub fn bits(hashes: &[Hash256]) -> Vec<String> {
    let mut lines = Vec::with_capacity(hashes.len() * 17);
    for h in hashes {
        lines.extend(h.bit_matrix());
        lines.push(String::new());
    }
    lines
}

pub fn words(hashes: &[Hash256]) -> Vec<String> {
    hashes
        .iter()
        .map(|h| {
            let mut slots = h.to_16bit_strings();
            slots.reverse();
            slots.join(" ")
        })
        .collect()
}

pub fn dihedral(hashes: &[Hash256]) -> Vec<String> {
    let mut lines = Vec::with_capacity(hashes.len() * 8);
    for h in hashes {
        for (variant, transform) in dihedral_variants(h).iter().zip(Dihedral::ALL) {
            lines.push(format!("{:<10} {} {}", transform.name(), variant, hamming_norm(variant)));
        }
    }
    lines
}

impl Verb {
    /// `matrix`, `cij` and `pairwise` compare a left and a right list.
    pub fn takes_two_lists(self) -> bool {
        matches!(self, Verb::Matrix | Verb::Cij | Verb::Pairwise)
    }
}

/// Renders a single-list verb; `None` for the two-list verbs, which go
/// through [`matrix`], [`cij`] or [`pairwise`] with both sides.
pub fn render(verb: Verb, hashes: &[Hash256]) -> Option<Vec<String>> {
    let lines = match verb {
        Verb::Norms => norms(hashes),
        Verb::Slotnorms => slot_norm_lines(hashes),
        Verb::Deltas => deltas(hashes),
        Verb::Axors => adjacent_xors(hashes),
        Verb::Fxors => xors_from_first(hashes),
        Verb::Bits => bits(hashes),
        Verb::Words => words(hashes),
        Verb::Dihedral => dihedral(hashes),
        Verb::Matrix | Verb::Cij | Verb::Pairwise => return None,
    };
    Some(lines)
}
