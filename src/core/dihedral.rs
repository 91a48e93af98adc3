//! The eight rotation/flip variants of a hash.
//!
//! A hash is read as a 16x16 grid, bit `16 * row + col`. Rotating or
//! flipping the source image transposes that grid and/or negates DCT
//! coefficients in a checkerboard-like pattern; in the hash domain a
//! negation becomes a bit toggle. Every transform is therefore "toggle the
//! bits in some parity classes, then optionally transpose".

use crate::core::hash::Hash256;
use serde::{Deserialize, Serialize};
use std::fmt;

const GRID: usize = 16;

// Parity classes of (row, col), indexed by (row & 1) << 1 | (col & 1).
const NONE: u8 = 0b0000;
const COL_EVEN: u8 = 0b0101;
const ROW_EVEN: u8 = 0b0011;
const SUM_ODD: u8 = 0b0110;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dihedral {
    Original,
    Rotate90,
    Rotate180,
    Rotate270,
    FlipX,
    FlipY,
    FlipPlus1,
    FlipMinus1,
}

impl Dihedral {
    pub const ALL: [Dihedral; 8] = [
        Dihedral::Original,
        Dihedral::Rotate90,
        Dihedral::Rotate180,
        Dihedral::Rotate270,
        Dihedral::FlipX,
        Dihedral::FlipY,
        Dihedral::FlipPlus1,
        Dihedral::FlipMinus1,
    ];

    /// (transpose, toggle mask in source coordinates)
    fn parts(self) -> (bool, u8) {
        match self {
            Dihedral::Original => (false, NONE),
            Dihedral::Rotate90 => (true, COL_EVEN),
            Dihedral::Rotate180 => (false, SUM_ODD),
            Dihedral::Rotate270 => (true, ROW_EVEN),
            Dihedral::FlipX => (false, ROW_EVEN),
            Dihedral::FlipY => (false, COL_EVEN),
            Dihedral::FlipPlus1 => (true, NONE),
            Dihedral::FlipMinus1 => (true, SUM_ODD),
        }
    }

    fn from_parts(transpose: bool, mask: u8) -> Dihedral {
        Dihedral::ALL
            .into_iter()
            .find(|t| t.parts() == (transpose, mask))
            .unwrap_or_else(|| unreachable!("dihedral group is closed"))
    }

    pub fn apply(self, hash: &Hash256) -> Hash256 {
        let (transpose, mask) = self.parts();
        let mut out = Hash256::zeroes();
        for row in 0..GRID {
            for col in 0..GRID {
                let mut bit = hash.bit(row * GRID + col);
                if mask & (1 << parity_class(row, col)) != 0 {
                    bit = !bit;
                }
                if bit {
                    let (r, c) = if transpose { (col, row) } else { (row, col) };
                    out.toggle(r * GRID + c);
                }
            }
        }
        out
    }

    pub fn inverse(self) -> Dihedral {
        match self {
            Dihedral::Rotate90 => Dihedral::Rotate270,
            Dihedral::Rotate270 => Dihedral::Rotate90,
            other => other,
        }
    }

    /// The transform equal to applying `self` first and then `next`.
    pub fn then(self, next: Dihedral) -> Dihedral {
        let (t1, m1) = self.parts();
        let (t2, m2) = next.parts();
        // Pull `next`'s mask back through `self`'s transpose.
        let pulled = if t1 { transpose_mask(m2) } else { m2 };
        Dihedral::from_parts(t1 ^ t2, m1 ^ pulled)
    }

    pub fn name(self) -> &'static str {
        match self {
            Dihedral::Original => "original",
            Dihedral::Rotate90 => "rotate90",
            Dihedral::Rotate180 => "rotate180",
            Dihedral::Rotate270 => "rotate270",
            Dihedral::FlipX => "flipx",
            Dihedral::FlipY => "flipy",
            Dihedral::FlipPlus1 => "flipplus1",
            Dihedral::FlipMinus1 => "flipminus1",
        }
    }
}

impl fmt::Display for Dihedral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn parity_class(row: usize, col: usize) -> u8 {
    (((row & 1) << 1) | (col & 1)) as u8
}

// Transposing swaps the (even, odd) and (odd, even) classes.
fn transpose_mask(mask: u8) -> u8 {
    let eo = (mask >> 1) & 1;
    let oe = (mask >> 2) & 1;
    (mask & 0b1001) | (oe << 1) | (eo << 2)
}

/// All eight variants of `hash`, in `Dihedral::ALL` order.
pub fn dihedral_variants(hash: &Hash256) -> [Hash256; 8] {
    Dihedral::ALL.map(|t| t.apply(hash))
}
