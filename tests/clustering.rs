use pdqcull::config::{Overrides, Settings};
use pdqcull::core::dihedral::Dihedral;
use pdqcull::core::distance::hamming_distance;
use pdqcull::core::index::SearchStrategy;
use pdqcull::io::hashio::{to_labeled, HashLoader, HashRecord, LoadOptions};
use pdqcull::io::report::{parse_cluster_lines, snowball_lines};
use pdqcull::{Hash256, LabeledHash, Matcher};
use pretty_assertions::assert_eq;
use std::fs;
use std::io::Cursor;
use tempfile::TempDir;

const KNOWN: &str = "f8f8f0cce0f4e84d0e370a22028f67f0b36e2ed596623e1d33e6339c4e9c9b22";

fn flipped(hash: &Hash256, bits: impl IntoIterator<Item = usize>) -> Hash256 {
    let mut out = *hash;
    for b in bits {
        out.flip_bit(b).unwrap();
    }
    out
}

fn load(text: &str, options: LoadOptions) -> Vec<HashRecord> {
    let mut loader = HashLoader::new(options);
    loader.load_reader("fixture", Cursor::new(text.to_string())).unwrap();
    loader.finish()
}

#[test]
fn chain_of_near_duplicates_forms_one_cluster() {
    let a = Hash256::from_hex_string(KNOWN).unwrap();
    let b = flipped(&a, 0..8);
    let c = flipped(&b, 8..16);
    assert_eq!(hamming_distance(&a, &c), 16);

    let items = vec![
        LabeledHash::new("a", a),
        LabeledHash::new("b", b),
        LabeledHash::new("c", c),
    ];
    let report = Matcher::new(10).clusterize(&items).unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report.clusters[0].ids(&items), vec!["a", "b", "c"]);
}

#[test]
fn empty_input_produces_no_clusters() {
    let records = load("\n# nothing here\n", LoadOptions::default());
    let report = Matcher::new(31).clusterize(&to_labeled(&records)).unwrap();
    assert!(report.is_empty());
    assert!(snowball_lines(&report, &records, true).is_empty());
}

#[test]
fn dkvp_pipeline_round_trips_through_report() {
    let base = Hash256::from_hex_string(KNOWN).unwrap();
    let text = [
        format!("hash={},quality=100,filename=a.jpg", base),
        format!("hash={},quality=20,filename=blurry.jpg", flipped(&base, 0..2)),
        format!("hash={},quality=90,filename=b.jpg", flipped(&base, 0..4)),
        format!("hash={},quality=95,filename=c.jpg", !base),
    ]
    .join("\n");

    let settings = Settings::default().apply(Overrides {
        threshold: Some(8),
        min_quality: Some(50),
        id_field: Some("filename".to_string()),
        min_cluster_size: Some(2),
        ..Overrides::default()
    });
    let records = load(&text, settings.load_options());
    assert_eq!(records.len(), 3);

    let report = settings
        .matcher()
        .unwrap()
        .clusterize(&to_labeled(&records))
        .unwrap()
        .retain_min_size(settings.min_cluster_size);
    assert_eq!(report.len(), 1);

    let lines = snowball_lines(&report, &records, settings.separate_clusters);
    let parsed = parse_cluster_lines(Cursor::new(lines.join("\n"))).unwrap();
    let labels: Vec<&str> = parsed[&1].iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["a.jpg", "b.jpg"]);
}

#[test]
fn dihedral_matching_finds_every_orientation() {
    let base = Hash256::from_hex_string(KNOWN).unwrap();
    let mut items = vec![LabeledHash::new("base", base)];
    for t in &Dihedral::ALL[1..] {
        items.push(LabeledHash::new(t.name(), t.apply(&base)));
    }

    let plain = Matcher::new(0).clusterize(&items).unwrap();
    assert_eq!(plain.len(), 8);

    let invariant = Matcher::new(0).with_dihedral(true).clusterize(&items).unwrap();
    assert_eq!(invariant.len(), 1);
    assert_eq!(invariant.clusters[0].len(), 8);
}

#[test]
fn hash_directory_is_loaded_in_path_order() {
    let temp_dir = TempDir::new().unwrap();
    let base = Hash256::from_hex_string(KNOWN).unwrap();
    fs::write(temp_dir.path().join("b.pdq"), format!("{},second\n", flipped(&base, [3]))).unwrap();
    fs::write(temp_dir.path().join("a.pdq"), format!("{},first\n", base)).unwrap();

    let mut loader = HashLoader::new(LoadOptions::default());
    loader.load_files(&[temp_dir.path()]).unwrap();
    let records = loader.finish();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second"]);

    let hits = Matcher::new(1)
        .match_against(&to_labeled(&records[1..]), &to_labeled(&records[..1]))
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].distance, 1);
}

#[test]
fn positional_metadata_survives_report_round_trip() {
    let base = Hash256::from_hex_string(KNOWN).unwrap();
    let text = format!("{},100,file1.jpg\n{},90,file2.jpg\n", base, flipped(&base, [7]));
    let records = load(&text, LoadOptions::default());

    let report = Matcher::new(4).clusterize(&to_labeled(&records)).unwrap();
    let lines = snowball_lines(&report, &records, false);
    assert_eq!(lines[0], format!("clidx=1,clusz=2,hash={},100,file1.jpg", base));

    let parsed = parse_cluster_lines(Cursor::new(lines.join("\n"))).unwrap();
    let labels: Vec<&str> = parsed[&1].iter().map(|m| m.label.as_str()).collect();
    assert_eq!(labels, vec!["100,file1.jpg", "90,file2.jpg"]);
}

#[test]
fn brute_force_setting_matches_indexed_clustering() {
    let base = Hash256::from_hex_string(KNOWN).unwrap();
    let items: Vec<LabeledHash> = (0..40)
        .map(|i| LabeledHash::new(format!("h{i}"), flipped(&base, (i * 5)..(i * 5 + i % 9))))
        .chain([LabeledHash::new("inverse", !base)])
        .collect();

    for threshold in [8, 31, 63] {
        let indexed = Settings::default().apply(Overrides {
            threshold: Some(threshold),
            ..Overrides::default()
        });
        let scanned = indexed.clone().apply(Overrides {
            brute_force: Some(true),
            ..Overrides::default()
        });
        let indexed = indexed.matcher().unwrap();
        let scanned = scanned.matcher().unwrap();
        assert_eq!(indexed.strategy(), SearchStrategy::Index);
        assert_eq!(scanned.strategy(), SearchStrategy::LinearScan);
        assert_eq!(indexed.clusterize(&items).unwrap(), scanned.clusterize(&items).unwrap());
        assert_eq!(
            indexed.greedy_clusters(&items).unwrap(),
            scanned.greedy_clusters(&items).unwrap()
        );
    }
}

#[test]
fn greedy_clusters_cover_every_hash_once() {
    let a = Hash256::from_hex_string(KNOWN).unwrap();
    let b = flipped(&a, 0..8);
    let c = flipped(&b, 8..16);
    let items = vec![
        LabeledHash::new("a", a),
        LabeledHash::new("b", b),
        LabeledHash::new("c", c),
    ];

    // snowball chains all three; greedy only joins hashes to a center
    let clusters = Matcher::new(10).greedy_clusters(&items).unwrap();
    let layout: Vec<(usize, Vec<usize>)> = clusters
        .iter()
        .map(|c| (c.center, c.members.iter().map(|e| e.left).collect()))
        .collect();
    assert_eq!(layout, vec![(0, vec![0, 1]), (2, vec![2])]);
}
