//! Command-line interface.
//!
//! ```bash
//! # Register a file (or literal text) as an entity
//! resonance register src/lib.rs --name lib --kind unit
//!
//! # Compare two entities
//! resonance similarity phash:v1:… phash:v1:…
//!
//! # Group the registry into greedy threshold clusters
//! resonance clusters --min 0.8
//! ```
//!
//! Encounter history, heartbeats and formations live for one invocation only;
//! entities persist in the store directory.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::export::export_cypher_dump;
use crate::{EntityId, EntityKind, EntityMetadata, JsonDirStore, Resonance, ResonanceConfig};

/// Content-addressed entity registry
#[derive(Parser, Debug)]
#[command(name = "resonance")]
#[command(author, version, about = "Content-addressed entity registry with similarity tracking")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding one JSON record per entity
    #[arg(long, global = true, default_value = "entities")]
    pub store: PathBuf,

    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Register text, or the contents of a file, as an entity
    Register(RegisterArgs),

    /// Similarity and classification of two entities
    Similarity {
        a: String,
        b: String,
    },

    /// Greedy threshold clusters across the registry
    Clusters {
        /// Minimum mean similarity to join a cluster (defaults to the harmonic threshold)
        #[arg(long)]
        min: Option<f64>,
    },

    /// Most dissonant pairs in the registry
    Dissonance {
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Aggregate statistics
    Stats,

    /// Write the registry as a Cypher script
    Export {
        /// Output file (stdout if not given)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Literal text, or a path to a file to read
    pub input: String,

    /// Display name (defaults to the file name, or the text itself)
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long, default_value = "unit")]
    pub kind: EntityKind,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub author: Option<String>,
}

/// Run one parsed command against the store it names.
pub async fn execute(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ResonanceConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResonanceConfig::default(),
    };
    let store = JsonDirStore::open(&cli.store)
        .with_context(|| format!("failed to open store {}", cli.store.display()))?;
    let net = Resonance::open(store, config).await.context("failed to open registry")?;

    match cli.command {
        Commands::Register(args) => register(&net, args).await?,
        Commands::Similarity { a, b } => {
            let (a, b) = (EntityId::from(a), EntityId::from(b));
            let score = net.engine().similarity_of(&a, &b)?;
            println!("{a} ↔ {b}");
            println!("  similarity: {score:.4}");
            println!("  classification: {}", net.engine().classify(score));
        }
        Commands::Clusters { min } => {
            let min = min.unwrap_or(net.config().thresholds.harmonic);
            let clusters = net.engine().clusters(min);
            println!("{} clusters (min {min:.2})", clusters.len());
            for cluster in clusters {
                let names: Vec<String> = cluster
                    .members
                    .iter()
                    .map(|id| net.registry().get(id).map_or_else(|| id.to_string(), |e| e.name))
                    .collect();
                println!("  [{:.3}] {}", cluster.cohesion, names.join(", "));
            }
        }
        Commands::Dissonance { limit } => {
            let pairs = net.engine().dissonant_pairs();
            println!("{} dissonant pairs", pairs.len());
            for pair in pairs.into_iter().take(limit) {
                println!("  {:.3}  {} ↔ {}", pair.dissonance, pair.a, pair.b);
            }
        }
        Commands::Stats => {
            let stats = net.stats();
            println!("entities:     {}", stats.registry.entities);
            println!("occurrences:  {}", stats.registry.total_occurrences);
            println!("relations:    {}", stats.registry.relations);
            println!("derived:      {}", stats.registry.derived);
            for (kind, count) in &stats.registry.by_kind {
                println!("  {kind:<10} {count}");
            }
        }
        Commands::Export { output } => {
            let mut writer: Box<dyn Write> = match &output {
                Some(path) => Box::new(
                    File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
                ),
                None => Box::new(io::stdout().lock()),
            };
            export_cypher_dump(net.registry(), &mut writer)?;
            writer.flush()?;
        }
    }

    net.flush().await?;
    Ok(())
}

async fn register(net: &Resonance<JsonDirStore>, args: RegisterArgs) -> Result<()> {
    let path = Path::new(&args.input);
    let (text, default_name) = if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.input.clone());
        (text, name)
    } else {
        let name: String = args.input.chars().take(40).collect();
        (args.input.clone(), name)
    };

    let mut metadata = EntityMetadata::named(args.name.unwrap_or(default_name)).with_kind(args.kind);
    if let Some(description) = args.description {
        metadata = metadata.with_description(description);
    }
    if let Some(author) = args.author {
        metadata = metadata.with_author(author);
    }

    let entity = net.register(&text, metadata).await?;
    println!("{}", entity.id);
    println!("  name: {}", entity.name);
    println!("  kind: {}", entity.kind);
    println!("  occurrences: {}", entity.occurrences);
    if let Some(summary) = &entity.derived_summary {
        println!("  summary: {summary}");
    }
    let vector: Vec<String> = entity.feature_vector.iter().map(|v| format!("{v:.4}")).collect();
    println!("  vector: [{}]", vector.join(", "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register() {
        let cli = Cli::try_parse_from([
            "resonance", "--store", "/tmp/x", "register", "hello", "--name", "greeting", "--kind", "concept",
        ])
        .unwrap();
        assert_eq!(cli.store, PathBuf::from("/tmp/x"));
        match cli.command {
            Commands::Register(args) => {
                assert_eq!(args.input, "hello");
                assert_eq!(args.kind, EntityKind::Concept);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        assert!(Cli::try_parse_from(["resonance", "register", "x", "--kind", "planet"]).is_err());
    }

    #[tokio::test]
    async fn test_register_then_stats() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().to_str().unwrap();
        execute(Cli::try_parse_from(["resonance", "--store", store, "register", "alpha"]).unwrap())
            .await
            .unwrap();
        execute(Cli::try_parse_from(["resonance", "--store", store, "stats"]).unwrap())
            .await
            .unwrap();

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }
}
