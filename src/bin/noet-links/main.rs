//! noet-links CLI tool
//!
//! Command-line interface for checking and querying the links of a directory of notes.
//!
//! ## Commands
//!
//! - `check <dir>`: Report every broken mention; exits non-zero when there are any
//! - `backlinks <dir> <doc>`: Documents linking to `doc`
//! - `distance <dir> <a> <b>`: Fewest undirected hops between two documents
//! - `neighbors <dir> <doc>`: Documents within `--depth` hops of `doc`
//! - `stats <dir>`: Index totals
//!
//! Documents are named by their `/`-separated path relative to `<dir>`.

use clap::{Parser, Subcommand};
use noet_links::{
    config::IndexConfig, index::IndexStore, registry::ReferenceRegistry, source::FsSource,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "noet-links")]
#[command(author, version, about = "Check and query links between markdown notes", long_about = None)]
struct Cli {
    /// Configuration file path (TOML). Defaults apply when absent.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate every mention and list the broken ones
    Check {
        /// Directory of notes
        path: PathBuf,

        /// Also print parse diagnostics
        #[arg(short, long)]
        verbose: bool,
    },

    /// List the documents that link to a document
    Backlinks {
        /// Directory of notes
        path: PathBuf,

        /// Document id, e.g. `notes/idea.md`
        doc: String,
    },

    /// Shortest undirected link distance between two documents
    Distance {
        /// Directory of notes
        path: PathBuf,

        a: String,

        b: String,
    },

    /// Documents reachable from a document, with their distance
    Neighbors {
        /// Directory of notes
        path: PathBuf,

        doc: String,

        /// Maximum number of hops (unbounded when omitted)
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Document, mention and tag totals
    Stats {
        /// Directory of notes
        path: PathBuf,
    },
}

fn open_store(path: &Path, config: &Option<PathBuf>) -> Result<IndexStore, Box<dyn std::error::Error>> {
    let config = match config {
        Some(config_path) => IndexConfig::load(config_path)?,
        None => IndexConfig::default(),
    };
    let source = FsSource::new(path, config.clone())?;
    let store = IndexStore::new(Box::new(source), ReferenceRegistry::new(), config);
    let report = store.rebuild_with_report()?;
    for (id, error) in report.failures.iter() {
        eprintln!("Warning: could not read {id}: {error}");
    }
    Ok(store)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { path, verbose } => {
            let store = open_store(&path, &cli.config)?;
            if verbose {
                for id in store.get_index().ids() {
                    for diagnostic in store.get_diagnostics(id) {
                        println!("{id}:{diagnostic}");
                    }
                }
            }
            let report = store.graph().validate_all();
            for broken in report.details.iter() {
                println!(
                    "{}:{}: broken link to '{}'",
                    broken.source, broken.mention.start, broken.target
                );
                let candidates = store.get_candidates(&broken.target, Some(3));
                if !candidates.is_empty() {
                    let names: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
                    println!("    did you mean: {}", names.join(", "));
                }
            }
            println!("{} valid, {} broken", report.valid, report.broken);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Backlinks { path, doc } => {
            let store = open_store(&path, &cli.config)?;
            if !store.get_index().contains(&doc) {
                eprintln!("Error: {doc} is not an indexed document");
                std::process::exit(2);
            }
            for source in store.graph().backlinks_of(&doc) {
                println!("{source}");
            }
        }

        Commands::Distance { path, a, b } => {
            let store = open_store(&path, &cli.config)?;
            match store.graph().distance(&a, &b) {
                Some(hops) => println!("{hops}"),
                None => {
                    println!("unreachable");
                    std::process::exit(1);
                }
            }
        }

        Commands::Neighbors { path, doc, depth } => {
            let store = open_store(&path, &cli.config)?;
            let graph = store.graph();
            let mut neighbors: Vec<(String, usize)> =
                graph.connected_neighborhood(&doc, depth).into_iter().collect();
            neighbors.sort_by(|(a_id, a), (b_id, b)| a.cmp(b).then_with(|| a_id.cmp(b_id)));
            for (id, hops) in neighbors {
                println!("{hops}\t{id}");
            }
        }

        Commands::Stats { path } => {
            let store = open_store(&path, &cli.config)?;
            let stats = store.get_stats();
            let graph = store.graph();
            println!("documents: {}", stats.document_count);
            println!("mentions:  {}", stats.mention_count);
            println!("tags:      {}", stats.tag_count);
            println!("broken:    {}", graph.validate_all().broken);
            println!("orphans:   {}", graph.orphans().len());
            println!("built in:  {}ms", stats.last_build_duration_ms);
        }
    }

    Ok(())
}
