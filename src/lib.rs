//! conceptgraph: weighted concept graphs from extracted relations and embeddings
//!
//! Fuses two relationship signals into one simple undirected graph and
//! lays it out for rendering.
//!
//! # Core Concepts
//!
//! - **Nodes**: concepts keyed by their trimmed, case-folded name
//! - **Explicit edges**: relations asserted by an extraction service, weight 1.0
//! - **Similarity edges**: node pairs whose embedding cosine similarity is above a threshold
//! - **Layout**: one 2D/3D coordinate per node, from a projection of the
//!   embeddings with a force-directed fallback
//!
//! # Example
//!
//! ```
//! use conceptgraph::{Artifact, EmbeddingSource, NoCache, Pipeline, PipelineConfig, RawConcepts};
//!
//! let raw = RawConcepts::decode(
//!     r#"{"nodes": [{"id": "Entropy"}, {"id": "Information"}],
//!         "edges": [{"source": "entropy", "target": "information", "relationship": "measures"}]}"#,
//! )
//! .unwrap();
//! let pipeline = Pipeline::new(PipelineConfig::default(), Box::new(NoCache)).unwrap();
//! let out = pipeline.build(&raw, EmbeddingSource::None).unwrap();
//! assert_eq!(out.graph.edge_count(), 1);
//! assert!(out.layout.covers(&out.graph));
//! ```

pub mod analysis;
pub mod artifact;
pub mod config;
pub mod embedding;
pub mod extraction;
pub mod graph;
pub mod layout;
pub mod pipeline;
pub mod storage;

pub use analysis::{detect_communities, graph_stats, modularity, GraphStats, RankedNode};
pub use artifact::{
    Artifact, ArtifactError, ArtifactResult, EmbeddedNodeRecord, EmbeddedNodes, GraphArtifact,
    LayoutArtifact, RawConceptRecord, RawConcepts, RawEdgeRecord,
};
pub use config::{CacheBackend, ConfigError, PipelineConfig};
pub use embedding::{Embedder, EmbeddingError, SimilarityEngine, SimilarityError};
pub use extraction::{
    parse_extraction_response, ConceptExtractor, ExtractionError, MockExtractor, TextFragment,
};
pub use graph::{
    deduplicate, fuse, ConceptNode, DedupReport, Edge, EdgeKind, FusionReport, Graph, NodeKey,
};
pub use layout::{Layout, LayoutConfig, LayoutEngine, LayoutError, LayoutMethod, LayoutReport};
pub use pipeline::{EmbeddingSource, Pipeline, PipelineError, PipelineOutput, PipelineResult};
pub use storage::{ArtifactCache, FileCache, MemoryCache, NoCache, OpenCache, SqliteCache};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
