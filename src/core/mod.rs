pub mod dihedral;
pub mod distance;
pub mod duplicate;
pub mod hash;
pub mod index;

pub use dihedral::{dihedral_variants, Dihedral};
pub use distance::{hamming_distance, hamming_norm};
pub use duplicate::{
    Cluster, ClusterReport, DistanceEntry, GreedyCluster, LabeledHash, MatchError, Matcher, RadialCluster,
};
pub use hash::{Hash256, HashError, WordView};
pub use index::{IndexError, MihIndex, SearchStrategy};
