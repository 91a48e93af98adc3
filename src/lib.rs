//! 256-bit PDQ perceptual hashes: hex codec, Hamming distance, the eight
//! rotation/flip variants, and threshold clustering for near-duplicate
//! culling.

pub mod config;
pub mod core;
pub mod io;

pub use crate::config::{ConfigError, Settings};
pub use crate::core::{Dihedral, Hash256, LabeledHash, Matcher};
