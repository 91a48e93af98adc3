use crate::core::dihedral::Dihedral;
use crate::core::duplicate::{ClusterReport, DistanceEntry, GreedyCluster, Matcher, RadialCluster};
use crate::io::hashio::{DkvpRecord, HashRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;
use thiserror::Error;

// Fields written by the cluster renderers; everything else is pass-through.
const REPORT_KEYS: [&str; 7] = ["clidx", "clusz", "hash", "hash1", "hash2", "is_center", "d"];

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: missing \"{field}\" field")]
    MissingField { line: usize, field: String },

    #[error("line {line}: \"{field}\" value \"{value}\" is not a number")]
    InvalidNumber {
        line: usize,
        field: String,
        value: String,
    },
}

/// `clidx=..,clusz=..,hash=..,<metadata>` per member; a blank line between
/// clusters when `separate` is set.
pub fn snowball_lines(report: &ClusterReport, records: &[HashRecord], separate: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, cluster) in report.clusters.iter().enumerate() {
        if separate && i > 0 {
            lines.push(String::new());
        }
        for &member in &cluster.members {
            let record = &records[member];
            lines.push(format!(
                "clidx={},clusz={},hash={},{}",
                cluster.id,
                cluster.len(),
                record.hash,
                record.label()
            ));
        }
    }
    lines
}

/// `clidx=..,clusz=..,hash1=..,hash2=..,d=..,<metadata>` per neighbour.
pub fn radial_lines(clusters: &[RadialCluster], records: &[HashRecord], separate: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, cluster) in clusters.iter().enumerate() {
        if separate && i > 0 {
            lines.push(String::new());
        }
        let needle = &records[cluster.needle];
        for entry in &cluster.neighbours {
            let neighbour = &records[entry.right];
            lines.push(format!(
                "clidx={},clusz={},hash1={},hash2={},d={},{}",
                cluster.id,
                cluster.neighbours.len(),
                needle.hash,
                neighbour.hash,
                entry.distance,
                neighbour.label()
            ));
        }
    }
    lines
}

/// `clidx=..,clusz=..,hash1=<member>,hash2=<center>,is_center=..,d=..,<metadata>`
/// per member, center first.
pub fn greedy_lines(clusters: &[GreedyCluster], records: &[HashRecord], separate: bool) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, cluster) in clusters.iter().enumerate() {
        if separate && i > 0 {
            lines.push(String::new());
        }
        let center = &records[cluster.center];
        for entry in &cluster.members {
            let member = &records[entry.left];
            lines.push(format!(
                "clidx={},clusz={},hash1={},hash2={},is_center={},d={},{}",
                cluster.id,
                cluster.len(),
                member.hash,
                center.hash,
                u8::from(entry.left == cluster.center),
                entry.distance,
                member.label()
            ));
        }
    }
    lines
}

pub fn match_lines(entries: &[DistanceEntry], queries: &[HashRecord], references: &[HashRecord]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let query = &queries[entry.left];
            let reference = &references[entry.right];
            format!(
                "query={},reference={},d={},transform={},hash1={},hash2={}",
                query.id, reference.id, entry.distance, entry.transform, query.hash, reference.hash
            )
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonReport {
    pub generated_at: String,
    pub threshold: u32,
    pub dihedral: bool,
    pub clusters: Vec<JsonCluster>,
    pub edges: Vec<JsonEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCluster {
    pub clidx: usize,
    pub size: usize,
    pub members: Vec<JsonMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonMember {
    pub id: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonEdge {
    pub left: String,
    pub right: String,
    pub d: u32,
    pub transform: Dihedral,
}

pub fn json_report(report: &ClusterReport, records: &[HashRecord], matcher: &Matcher) -> JsonReport {
    JsonReport {
        generated_at: Utc::now().to_rfc3339(),
        threshold: matcher.threshold(),
        dihedral: matcher.is_dihedral(),
        clusters: report
            .clusters
            .iter()
            .map(|cluster| JsonCluster {
                clidx: cluster.id,
                size: cluster.len(),
                members: cluster
                    .members
                    .iter()
                    .map(|&i| JsonMember {
                        id: records[i].id.clone(),
                        hash: records[i].hash.to_hex_string(),
                    })
                    .collect(),
            })
            .collect(),
        edges: report
            .edges
            .iter()
            .map(|edge| JsonEdge {
                left: records[edge.left].id.clone(),
                right: records[edge.right].id.clone(),
                d: edge.distance,
                transform: edge.transform,
            })
            .collect(),
    }
}

/// One line of a cluster report read back in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportMember {
    /// `filename` when present, otherwise the pass-through fields.
    pub label: String,
    pub distance: Option<u32>,
}

/// Groups DKVP cluster-report lines by `clidx`, preserving line order
/// within each cluster.
pub fn parse_cluster_lines<R: BufRead>(reader: R) -> Result<BTreeMap<u32, Vec<ReportMember>>, ReportError> {
    let mut clusters: BTreeMap<u32, Vec<ReportMember>> = BTreeMap::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = DkvpRecord::parse(line);
        let clidx = number_field(&record, "clidx", n + 1)?.ok_or_else(|| ReportError::MissingField {
            line: n + 1,
            field: "clidx".to_string(),
        })?;
        let distance = number_field(&record, "d", n + 1)?;
        let label = match record.get("filename") {
            Some(name) => name.to_string(),
            None => record.without(&REPORT_KEYS).to_string(),
        };
        clusters
            .entry(clidx)
            .or_default()
            .push(ReportMember { label, distance });
    }
    Ok(clusters)
}

fn number_field(record: &DkvpRecord, field: &str, line: usize) -> Result<Option<u32>, ReportError> {
    record
        .get(field)
        .map(|value| {
            value.parse().map_err(|_| ReportError::InvalidNumber {
                line,
                field: field.to_string(),
                value: value.to_string(),
            })
        })
        .transpose()
}
