//! conceptgraph CLI: build, inspect, and partition concept graphs.
//!
//! Usage:
//!   conceptgraph build --concepts raw.json [--embeddings nodes.json] [--config cfg.yaml] [--out dir]
//!   conceptgraph stats --graph graph.json [--top N]
//!   conceptgraph communities --graph graph.json

use clap::{Parser, Subcommand};
use conceptgraph::pipeline::read_artifact;
use conceptgraph::{
    detect_communities, graph_stats, Artifact, EmbeddedNodes, EmbeddingSource, Graph,
    GraphArtifact, Pipeline, PipelineConfig, RawConcepts,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "conceptgraph",
    version,
    about = "Fuse extracted relations and embedding similarity into a concept graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the fused graph and its layout from raw concepts
    Build {
        /// Raw concepts JSON (`{"nodes": [...], "edges": [...]}`)
        #[arg(long)]
        concepts: PathBuf,
        /// Precomputed "nodes with embeddings" JSON
        #[arg(long, conflicts_with = "embed")]
        embeddings: Option<PathBuf>,
        /// Embed nodes with the configured model (requires the `embeddings` feature)
        #[arg(long)]
        embed: bool,
        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for graph.json and layout.json
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Cache location (overrides the configured path)
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Print counts and the most connected nodes of a graph
    Stats {
        /// Fused graph JSON (node-link form)
        #[arg(long)]
        graph: PathBuf,
        /// How many nodes to list
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Print communities detected in a graph
    Communities {
        /// Fused graph JSON (node-link form)
        #[arg(long)]
        graph: PathBuf,
    },
}

/// Get the default cache directory (~/.cache/conceptgraph)
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".cache"))
        .join("conceptgraph")
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("conceptgraph=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_graph(path: &Path) -> Result<Graph, String> {
    let artifact: GraphArtifact =
        read_artifact(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Graph::from_artifact(&artifact).map_err(|e| e.to_string())
}

fn write_json<A: Artifact>(path: &Path, artifact: &A) -> Result<(), String> {
    let text = artifact.encode().map_err(|e| e.to_string())?;
    std::fs::write(path, text).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

#[cfg(feature = "embeddings")]
fn model_embedder(name: &str) -> Result<Box<dyn conceptgraph::Embedder>, String> {
    conceptgraph::embedding::FastEmbedEmbedder::from_model_name(name)
        .map(|e| Box::new(e) as Box<dyn conceptgraph::Embedder>)
        .map_err(|e| e.to_string())
}

#[cfg(not(feature = "embeddings"))]
fn model_embedder(_name: &str) -> Result<Box<dyn conceptgraph::Embedder>, String> {
    Err("built without the `embeddings` feature; pass --embeddings instead".to_string())
}

struct BuildArgs {
    concepts: PathBuf,
    embeddings: Option<PathBuf>,
    embed: bool,
    config: Option<PathBuf>,
    out: PathBuf,
    cache: Option<PathBuf>,
}

fn run_build(args: BuildArgs) -> Result<(), String> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load(path).map_err(|e| e.to_string())?,
        None => PipelineConfig::default(),
    };
    if args.cache.is_some() {
        config.cache.path = args.cache.clone();
    }
    let cache = config
        .cache
        .open(&default_cache_dir())
        .map_err(|e| format!("Failed to open cache: {}", e))?;

    let raw: RawConcepts = read_artifact(&args.concepts)
        .map_err(|e| format!("Failed to read {}: {}", args.concepts.display(), e))?;
    let precomputed: Option<EmbeddedNodes> = match &args.embeddings {
        Some(path) => Some(
            read_artifact(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?,
        ),
        None => None,
    };
    let model = if args.embed {
        Some(model_embedder(&config.embedding.model)?)
    } else {
        None
    };
    let source = match (&model, &precomputed) {
        (Some(model), _) => EmbeddingSource::Model(model.as_ref()),
        (None, Some(records)) => EmbeddingSource::Precomputed(records),
        (None, None) => EmbeddingSource::None,
    };

    let pipeline = Pipeline::new(config, cache).map_err(|e| e.to_string())?;
    let output = pipeline.build(&raw, source).map_err(|e| e.to_string())?;

    std::fs::create_dir_all(&args.out)
        .map_err(|e| format!("Failed to create {}: {}", args.out.display(), e))?;
    write_json(&args.out.join("graph.json"), &output.graph.to_artifact())?;
    write_json(&args.out.join("layout.json"), &output.layout.to_artifact())?;

    let report = &output.report;
    println!(
        "Built graph: {} nodes, {} edges ({} duplicate records dropped, {} blank ids rejected)",
        output.graph.node_count(),
        output.graph.edge_count(),
        report.dedup.duplicates_dropped,
        report.dedup.blank_ids_rejected
    );
    if let Some(fusion) = &report.fusion {
        println!(
            "  explicit: {}, similarity: {}, dangling dropped: {}, duplicate explicit dropped: {}",
            fusion.explicit_added,
            fusion.similarity_added,
            fusion.dangling_count(),
            fusion.duplicate_explicit_count()
        );
    }
    if let Some(similarity) = &report.similarity {
        println!(
            "  embedded nodes: {}, missing embeddings: {}",
            similarity.compared,
            similarity.missing.len()
        );
    }
    if let Some(layout) = &report.layout {
        println!(
            "  layout: {:?} ({} projected, {} by force layout)",
            layout.method, layout.projected, layout.fallback
        );
    }
    for (stage, outcome) in &report.cache {
        println!("  cache {}: {:?}", stage, outcome);
    }
    println!("Wrote {}", args.out.display());
    Ok(())
}

fn cmd_build(args: BuildArgs) -> i32 {
    match run_build(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_stats(path: &Path, top: usize) -> i32 {
    let graph = match load_graph(path) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let stats = graph_stats(&graph, top);
    println!("Nodes: {}", stats.node_count);
    println!(
        "Edges: {} ({} explicit, {} similarity)",
        stats.edge_count, stats.explicit_edges, stats.similarity_edges
    );
    println!("Density: {:.4}", stats.density);
    if !stats.most_connected.is_empty() {
        println!("Most connected:");
        for node in &stats.most_connected {
            println!("  {} ({} connections)", node.label, node.degree);
        }
    }
    0
}

fn cmd_communities(path: &Path) -> i32 {
    let graph = match load_graph(path) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let communities = detect_communities(&graph);
    if communities.is_empty() {
        println!("No nodes.");
        return 0;
    }
    for (i, members) in communities.iter().enumerate() {
        let labels: Vec<&str> = members
            .iter()
            .filter_map(|key| graph.get_node(key))
            .map(|node| node.label.as_str())
            .collect();
        println!("Community {} ({} nodes): {}", i + 1, members.len(), labels.join(", "));
    }
    0
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Build {
            concepts,
            embeddings,
            embed,
            config,
            out,
            cache,
        } => cmd_build(BuildArgs {
            concepts,
            embeddings,
            embed,
            config,
            out,
            cache,
        }),
        Commands::Stats { graph, top } => cmd_stats(&graph, top),
        Commands::Communities { graph } => cmd_communities(&graph),
    };
    std::process::exit(code);
}
