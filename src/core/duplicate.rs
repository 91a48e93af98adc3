// Near-duplicate detection over labeled hashes.
//
// - Pairwise threshold matching, optionally orientation-invariant
// - Snowball clustering: connected components of the match graph
// - Radial clustering: every hash's neighbourhood, duplicates allowed
// - Greedy clustering: each hash joins the first earlier center in range
// - Query-vs-reference matching

use crate::core::dihedral::{dihedral_variants, Dihedral};
use crate::core::distance::{hamming_distance, hamming_distance_le};
use crate::core::hash::Hash256;
use crate::core::index::{IndexError, MihIndex, SearchStrategy};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("Duplicate identifier \"{id}\" at positions {first} and {second}")]
    DuplicateIdentifier {
        id: String,
        first: usize,
        second: usize,
    },

    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledHash {
    pub id: String,
    pub hash: Hash256,
}

impl LabeledHash {
    pub fn new(id: impl Into<String>, hash: Hash256) -> Self {
        Self {
            id: id.into(),
            hash,
        }
    }
}

/// One comparison that fell within threshold. `transform` is the variant of
/// the right-hand hash that gave `distance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceEntry {
    pub left: usize,
    pub right: usize,
    pub distance: u32,
    pub transform: Dihedral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    /// 1-based, in order of each cluster's first member.
    pub id: usize,
    /// Input positions, ascending.
    pub members: Vec<usize>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids<'a>(&self, items: &'a [LabeledHash]) -> Vec<&'a str> {
        self.members.iter().map(|&i| items[i].id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub clusters: Vec<Cluster>,
    pub edges: Vec<DistanceEntry>,
}

impl ClusterReport {
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Id of the cluster holding input position `index`.
    pub fn cluster_of(&self, index: usize) -> Option<usize> {
        self.clusters
            .iter()
            .find(|c| c.members.contains(&index))
            .map(|c| c.id)
    }

    /// Drops clusters smaller than `min_size` and renumbers the rest.
    /// Edges are left untouched.
    pub fn retain_min_size(mut self, min_size: usize) -> Self {
        self.clusters.retain(|c| c.len() >= min_size);
        for (i, cluster) in self.clusters.iter_mut().enumerate() {
            cluster.id = i + 1;
        }
        self
    }
}

/// A needle and everything within threshold of it, itself included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadialCluster {
    pub id: usize,
    pub needle: usize,
    pub neighbours: Vec<DistanceEntry>,
}

/// A center and the hashes that joined it. `members` starts with the
/// center itself; each entry's `left` is the member, `right` the center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreedyCluster {
    pub id: usize,
    pub center: usize,
    pub members: Vec<DistanceEntry>,
}

impl GreedyCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Matcher {
    threshold: u32,
    dihedral: bool,
    strategy: SearchStrategy,
}

impl Matcher {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            dihedral: false,
            strategy: SearchStrategy::default(),
        }
    }

    /// Compare against the closest of the eight rotation/flip variants
    /// instead of the hash as given.
    pub fn with_dihedral(mut self, dihedral: bool) -> Self {
        self.dihedral = dihedral;
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_dihedral(&self) -> bool {
        self.dihedral
    }

    pub fn distance(&self, a: &Hash256, b: &Hash256) -> (u32, Dihedral) {
        if !self.dihedral {
            return (hamming_distance(a, b), Dihedral::Original);
        }
        min_over_variants(a, &dihedral_variants(b))
    }

    pub fn is_match(&self, a: &Hash256, b: &Hash256) -> bool {
        if self.dihedral {
            self.distance(a, b).0 <= self.threshold
        } else {
            hamming_distance_le(a, b, self.threshold)
        }
    }

    fn compare(&self, left: usize, a: &Hash256, right: usize, b: &Targets) -> Option<DistanceEntry> {
        let (distance, transform) = match b {
            Targets::Plain(hash) => {
                if !hamming_distance_le(a, hash, self.threshold) {
                    return None;
                }
                (hamming_distance(a, hash), Dihedral::Original)
            }
            Targets::Variants(variants) => min_over_variants(a, variants),
        };
        (distance <= self.threshold).then_some(DistanceEntry {
            left,
            right,
            distance,
            transform,
        })
    }

    fn target(&self, hash: &Hash256) -> Targets {
        if self.dihedral {
            Targets::Variants(Box::new(dihedral_variants(hash)))
        } else {
            Targets::Plain(*hash)
        }
    }

    fn targets(&self, items: &[LabeledHash]) -> Vec<Targets> {
        if self.dihedral {
            items
                .par_iter()
                .map(|item| Targets::Variants(Box::new(dihedral_variants(&item.hash))))
                .collect()
        } else {
            items.iter().map(|item| Targets::Plain(item.hash)).collect()
        }
    }

    /// Index over `items`, holding all eight variants of each in dihedral
    /// mode. `None` when this search should scan instead.
    fn index(&self, items: &[LabeledHash]) -> Option<MihIndex> {
        if !self.strategy.uses_index(self.threshold) {
            if self.strategy == SearchStrategy::Index {
                log::debug!("distance {} is beyond the index, scanning", self.threshold);
            }
            return None;
        }
        let mut index = MihIndex::new();
        for (i, item) in items.iter().enumerate() {
            if self.dihedral {
                for variant in dihedral_variants(&item.hash) {
                    index.insert(variant, i);
                }
            } else {
                index.insert(item.hash, i);
            }
        }
        Some(index)
    }

    /// Matches of `needle` among `targets[from..]`, ascending by position.
    fn row(
        &self,
        left: usize,
        needle: &Hash256,
        targets: &[Targets],
        index: Option<&MihIndex>,
        from: usize,
    ) -> Result<Vec<DistanceEntry>, IndexError> {
        let row = match index {
            Some(index) => index
                .candidates(needle, self.threshold)?
                .into_iter()
                .filter(|&j| j >= from)
                .filter_map(|j| self.compare(left, needle, j, &targets[j]))
                .collect(),
            None => (from..targets.len())
                .filter_map(|j| self.compare(left, needle, j, &targets[j]))
                .collect(),
        };
        Ok(row)
    }

    /// Every unordered pair `(i, j)`, `i < j`, within threshold, sorted by
    /// `(i, j)`.
    pub fn matching_pairs(&self, items: &[LabeledHash]) -> Result<Vec<DistanceEntry>, MatchError> {
        check_unique(items)?;
        let targets = self.targets(items);
        let index = self.index(items);
        let n = items.len();

        let rows: Vec<Vec<DistanceEntry>> = (0..n)
            .into_par_iter()
            .map(|i| self.row(i, &items[i].hash, &targets, index.as_ref(), i + 1))
            .collect::<Result<_, _>>()?;
        let edges: Vec<DistanceEntry> = rows.into_iter().flatten().collect();

        log::debug!(
            "{} of {} pairs within distance {}",
            edges.len(),
            n * n.saturating_sub(1) / 2,
            self.threshold
        );
        Ok(edges)
    }

    /// Transitive clustering: two hashes share a cluster when a chain of
    /// matches connects them. Every input lands in exactly one cluster.
    pub fn clusterize(&self, items: &[LabeledHash]) -> Result<ClusterReport, MatchError> {
        let edges = self.matching_pairs(items)?;

        let mut sets = UnionFind::new(items.len());
        for edge in &edges {
            sets.union(edge.left, edge.right);
        }

        let mut by_root: HashMap<usize, usize> = HashMap::new();
        let mut clusters: Vec<Cluster> = Vec::new();
        for i in 0..items.len() {
            let root = sets.find(i);
            let slot = *by_root.entry(root).or_insert_with(|| {
                clusters.push(Cluster {
                    id: clusters.len() + 1,
                    members: Vec::new(),
                });
                clusters.len() - 1
            });
            clusters[slot].members.push(i);
        }

        log::info!(
            "{} hashes formed {} clusters from {} matches",
            items.len(),
            clusters.len(),
            edges.len()
        );
        Ok(ClusterReport { clusters, edges })
    }

    /// For each hash, every hash (itself included) within threshold.
    pub fn radial_clusters(&self, items: &[LabeledHash]) -> Result<Vec<RadialCluster>, MatchError> {
        check_unique(items)?;
        let targets = self.targets(items);
        let index = self.index(items);

        let neighbourhoods: Vec<Vec<DistanceEntry>> = items
            .par_iter()
            .enumerate()
            .map(|(i, item)| self.row(i, &item.hash, &targets, index.as_ref(), 0))
            .collect::<Result<_, _>>()?;

        Ok(neighbourhoods
            .into_iter()
            .enumerate()
            .map(|(needle, neighbours)| RadialCluster {
                id: needle + 1,
                needle,
                neighbours,
            })
            .collect())
    }

    /// Matches each query against a reference set. `left` indexes
    /// `queries`, `right` indexes `references`.
    pub fn match_against(
        &self,
        queries: &[LabeledHash],
        references: &[LabeledHash],
    ) -> Result<Vec<DistanceEntry>, MatchError> {
        check_unique(queries)?;
        check_unique(references)?;
        let targets = self.targets(references);
        let index = self.index(references);

        let rows: Vec<Vec<DistanceEntry>> = queries
            .par_iter()
            .enumerate()
            .map(|(i, query)| self.row(i, &query.hash, &targets, index.as_ref(), 0))
            .collect::<Result<_, _>>()?;
        Ok(rows.into_iter().flatten().collect())
    }

    /// Single pass in input order: each hash joins the earliest center
    /// within threshold, or becomes a center itself. Every input lands in
    /// exactly one cluster; overlap goes to the older center.
    pub fn greedy_clusters(&self, items: &[LabeledHash]) -> Result<Vec<GreedyCluster>, MatchError> {
        check_unique(items)?;
        let indexed = self.strategy.uses_index(self.threshold);
        let mut index = MihIndex::new();
        let mut centers: Vec<Targets> = Vec::new();
        let mut clusters: Vec<GreedyCluster> = Vec::new();

        for (i, item) in items.iter().enumerate() {
            let candidates: Vec<usize> = if indexed {
                index.candidates(&item.hash, self.threshold)?
            } else {
                (0..centers.len()).collect()
            };
            let joined = candidates.into_iter().find_map(|k| {
                self.compare(i, &item.hash, k, &centers[k])
                    .map(|entry| (k, entry))
            });

            match joined {
                Some((k, entry)) => {
                    let cluster = &mut clusters[k];
                    cluster.members.push(DistanceEntry {
                        right: cluster.center,
                        ..entry
                    });
                }
                None => {
                    let k = clusters.len();
                    let target = self.target(&item.hash);
                    if indexed {
                        match &target {
                            Targets::Plain(hash) => index.insert(*hash, k),
                            Targets::Variants(variants) => {
                                for variant in variants.iter() {
                                    index.insert(*variant, k);
                                }
                            }
                        }
                    }
                    centers.push(target);
                    clusters.push(GreedyCluster {
                        id: k + 1,
                        center: i,
                        members: vec![DistanceEntry {
                            left: i,
                            right: i,
                            distance: 0,
                            transform: Dihedral::Original,
                        }],
                    });
                }
            }
        }

        log::info!(
            "{} hashes formed {} greedy clusters",
            items.len(),
            clusters.len()
        );
        Ok(clusters)
    }
}

enum Targets {
    Plain(Hash256),
    Variants(Box<[Hash256; 8]>),
}

fn min_over_variants(a: &Hash256, variants: &[Hash256; 8]) -> (u32, Dihedral) {
    let mut best = (u32::MAX, Dihedral::Original);
    for (variant, transform) in variants.iter().zip(Dihedral::ALL) {
        let d = hamming_distance(a, variant);
        if d < best.0 {
            best = (d, transform);
        }
    }
    best
}

fn check_unique(items: &[LabeledHash]) -> Result<(), MatchError> {
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if let Some(&first) = seen.get(item.id.as_str()) {
            return Err(MatchError::DuplicateIdentifier {
                id: item.id.clone(),
                first,
                second: i,
            });
        }
        seen.insert(item.id.as_str(), i);
    }
    Ok(())
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            self.parent[i] = self.find(self.parent[i]);
        }
        self.parent[i]
    }

    fn union(&mut self, i: usize, j: usize) {
        let pi = self.find(i);
        let pj = self.find(j);
        if pi == pj {
            return;
        }
        if self.rank[pi] < self.rank[pj] {
            self.parent[pi] = pj;
        } else if self.rank[pi] > self.rank[pj] {
            self.parent[pj] = pi;
        } else {
            self.parent[pj] = pi;
            self.rank[pi] += 1;
        }
    }
}
