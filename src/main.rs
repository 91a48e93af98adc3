use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdqcull::config::{switch, Overrides, Settings};
use pdqcull::core::duplicate::{GreedyCluster, RadialCluster};
use pdqcull::core::hash::Hash256;
use pdqcull::io::hashio::{to_labeled, HashLoader, HashRecord, LoadOptions};
use pdqcull::io::hashtool::{self, Verb};
use pdqcull::io::report;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "pdqcull", version, about = "Find near-duplicate images by PDQ hash")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file (default: <config dir>/pdqcull/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Group hashes into clusters of near-duplicates
    Cluster {
        /// Hash files or directories of hash files (stdin when none)
        #[arg(value_name = "FILES")]
        paths: Vec<PathBuf>,
        /// Maximum Hamming distance for a match
        #[arg(short = 'd', long = "distance", value_name = "N")]
        distance: Option<u32>,
        /// Match across rotations and flips
        #[arg(long)]
        dihedral: bool,
        /// Match hashes only as given, even if the config file says dihedral
        #[arg(long, conflicts_with = "dihedral")]
        no_dihedral: bool,
        /// Compare every pair instead of using the slot index
        #[arg(short = 'b', long = "brute-force-query")]
        brute_force: bool,
        /// One cluster per hash listing its neighbours, instead of
        /// transitive clusters
        #[arg(long, conflicts_with = "json")]
        radial: bool,
        /// Single pass: each hash joins the first earlier center within
        /// distance, or starts a new cluster
        #[arg(long, conflicts_with_all = ["json", "radial"])]
        greedy: bool,
        /// Leave out clusters with fewer members
        #[arg(long, value_name = "N")]
        min_size: Option<usize>,
        /// Blank line between clusters
        #[arg(long)]
        separate: bool,
        /// No blank lines between clusters, even if the config file says so
        #[arg(long, conflicts_with = "separate")]
        no_separate: bool,
        /// Write a JSON report instead of DKVP lines
        #[arg(long)]
        json: bool,
        /// DKVP field identifying each hash (e.g. filename)
        #[arg(long, value_name = "KEY")]
        id_field: Option<String>,
        /// Skip hashes whose quality field is below this
        #[arg(long, value_name = "Q")]
        min_quality: Option<u32>,
    },

    /// Match query hashes against a reference set
    Match {
        /// Query hash files (stdin when none)
        #[arg(value_name = "QUERY")]
        queries: Vec<PathBuf>,
        /// Reference hash files or directories
        #[arg(long, required = true, num_args = 1.., value_name = "REF")]
        against: Vec<PathBuf>,
        /// Maximum Hamming distance for a match
        #[arg(short = 'd', long = "distance", value_name = "N")]
        distance: Option<u32>,
        /// Match across rotations and flips
        #[arg(long)]
        dihedral: bool,
        /// Match hashes only as given, even if the config file says dihedral
        #[arg(long, conflicts_with = "dihedral")]
        no_dihedral: bool,
        /// Compare every pair instead of using the slot index
        #[arg(short = 'b', long = "brute-force-query")]
        brute_force: bool,
    },

    /// Inspect hashes: norms, deltas, XORs, distance matrices, dumps
    Hashes {
        #[arg(value_enum)]
        verb: Verb,
        /// Hash files (stdin when none)
        #[arg(value_name = "FILES")]
        paths: Vec<PathBuf>,
    },

    /// Summarise a cluster report
    Report {
        /// Report file (stdin when omitted)
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,
        /// Print the grouped report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(workers) = settings.parallel_workers {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()
            .context("Failed to configure worker pool")?;
    }

    match cli.command {
        Commands::Cluster {
            paths,
            distance,
            dihedral,
            no_dihedral,
            brute_force,
            radial,
            greedy,
            min_size,
            separate,
            no_separate,
            json,
            id_field,
            min_quality,
        } => {
            let settings = settings.apply(Overrides {
                threshold: distance,
                dihedral: switch(dihedral, no_dihedral),
                min_cluster_size: min_size,
                min_quality,
                id_field,
                separate_clusters: switch(separate, no_separate),
                brute_force: brute_force.then_some(true),
            });
            let matcher = settings.matcher()?;
            let records = load_records(&paths, settings.load_options())?;
            let items = to_labeled(&records);
            eprintln!(
                "▶ Clustering {} hashes within distance {}{}",
                items.len(),
                matcher.threshold(),
                if matcher.is_dihedral() { " (dihedral)" } else { "" }
            );

            if radial {
                let clusters = benchmark("radial clustering", || matcher.radial_clusters(&items))?;
                let clusters = retain_radial(clusters, settings.min_cluster_size);
                emit(&report::radial_lines(&clusters, &records, settings.separate_clusters))?;
                eprintln!("✅ {} neighbourhood(s)", clusters.len());
            } else if greedy {
                let clusters = benchmark("greedy clustering", || matcher.greedy_clusters(&items))?;
                let clusters = retain_greedy(clusters, settings.min_cluster_size);
                emit(&report::greedy_lines(&clusters, &records, settings.separate_clusters))?;
                eprintln!("✅ {} cluster(s) from {} hashes", clusters.len(), records.len());
            } else {
                let clusters = benchmark("clustering", || matcher.clusterize(&items))?
                    .retain_min_size(settings.min_cluster_size);
                if json {
                    let doc = report::json_report(&clusters, &records, &matcher);
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                } else {
                    emit(&report::snowball_lines(&clusters, &records, settings.separate_clusters))?;
                }
                eprintln!("✅ {} cluster(s) from {} hashes", clusters.len(), records.len());
            }
        }

        Commands::Match {
            queries,
            against,
            distance,
            dihedral,
            no_dihedral,
            brute_force,
        } => {
            let settings = settings.apply(Overrides {
                threshold: distance,
                dihedral: switch(dihedral, no_dihedral),
                brute_force: brute_force.then_some(true),
                ..Overrides::default()
            });
            let matcher = settings.matcher()?;
            let references = load_records(&against, settings.load_options())?;
            let queries = load_records(&queries, settings.load_options())?;
            eprintln!(
                "▶ Matching {} queries against {} references",
                queries.len(),
                references.len()
            );
            let hits = benchmark("matching", || {
                matcher.match_against(&to_labeled(&queries), &to_labeled(&references))
            })?;
            emit(&report::match_lines(&hits, &queries, &references))?;
            eprintln!("✅ {} match(es)", hits.len());
        }

        Commands::Hashes { verb, paths } => run_hash_tool(verb, &paths)?,

        Commands::Report { path, json } => summarise_report(path.as_deref(), json)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_writer(io::stderr)
        .init();
}

/// Loads every record from `paths`, or from stdin when `paths` is empty.
fn load_records(paths: &[PathBuf], options: LoadOptions) -> Result<Vec<HashRecord>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Loading hashes…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut loader = HashLoader::new(options);
    if paths.is_empty() {
        loader.load_reader("<stdin>", io::stdin().lock())?;
    } else {
        for path in paths {
            spinner.set_message(format!("Loading {}…", path.display()));
            loader.load_path(path)?;
        }
    }
    spinner.finish_with_message(format!("Loaded {} hashes", loader.records().len()));
    Ok(loader.finish())
}

fn load_hashes(paths: &[PathBuf]) -> Result<Vec<Hash256>> {
    Ok(load_records(paths, LoadOptions::default())?
        .into_iter()
        .map(|record| record.hash)
        .collect())
}

fn run_hash_tool(verb: Verb, paths: &[PathBuf]) -> Result<()> {
    let lines = match verb {
        Verb::Matrix | Verb::Cij => {
            let (left, right) = match paths {
                [] | [_] => {
                    let hashes = load_hashes(paths)?;
                    (hashes.clone(), hashes)
                }
                [a, b] => (
                    load_hashes(std::slice::from_ref(a))?,
                    load_hashes(std::slice::from_ref(b))?,
                ),
                _ => bail!("matrix and cij take at most two files"),
            };
            if verb == Verb::Matrix {
                hashtool::matrix(&left, &right)
            } else {
                hashtool::cij(&left, &right)
            }
        }
        Verb::Pairwise => {
            let [a, b] = paths else {
                bail!("pairwise needs exactly two files");
            };
            hashtool::pairwise(
                &load_hashes(std::slice::from_ref(a))?,
                &load_hashes(std::slice::from_ref(b))?,
            )
        }
        _ => match hashtool::render(verb, &load_hashes(paths)?) {
            Some(lines) => lines,
            None => bail!("{:?} needs two hash lists", verb),
        },
    };
    emit(&lines)
}

fn summarise_report(path: Option<&Path>, json: bool) -> Result<()> {
    let clusters = match path {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("Could not open report {:?}", path))?;
            report::parse_cluster_lines(BufReader::new(file))?
        }
        None => report::parse_cluster_lines(io::stdin().lock())?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    }

    let members: usize = clusters.values().map(Vec::len).sum();
    let largest = clusters.values().map(Vec::len).max().unwrap_or(0);
    println!(
        "🗂️  {} cluster(s), {} member(s), largest {}",
        clusters.len(),
        members,
        largest
    );
    for (clidx, members) in &clusters {
        println!("\n✨ Cluster {} ({} members):", clidx, members.len());
        for member in members {
            match member.distance {
                Some(d) => println!("   ▶ {} (d={})", member.label, d),
                None => println!("   ▶ {}", member.label),
            }
        }
    }
    Ok(())
}

/// Drops neighbourhoods smaller than `min_size` and renumbers the rest.
fn retain_radial(clusters: Vec<RadialCluster>, min_size: usize) -> Vec<RadialCluster> {
    clusters
        .into_iter()
        .filter(|c| c.neighbours.len() >= min_size)
        .enumerate()
        .map(|(i, c)| RadialCluster { id: i + 1, ..c })
        .collect()
}

fn retain_greedy(clusters: Vec<GreedyCluster>, min_size: usize) -> Vec<GreedyCluster> {
    clusters
        .into_iter()
        .filter(|c| c.len() >= min_size)
        .enumerate()
        .map(|(i, c)| GreedyCluster { id: i + 1, ..c })
        .collect()
}

fn emit(lines: &[String]) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

/// Run `f()`, report how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    eprintln!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
