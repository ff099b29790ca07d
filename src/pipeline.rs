//! End-to-end orchestration
//!
//! Raw concepts are deduplicated, embedded, compared, fused, and laid
//! out. The `embeddings`, `graph`, and `layout` stages (and `concepts`
//! for extraction) are memoized through an [`ArtifactCache`] under
//! fingerprints of the configuration that produced them.

use crate::artifact::{
    Artifact, ArtifactError, ArtifactResult, EmbeddedNodes, GraphArtifact, LayoutArtifact,
    RawConcepts,
};
use crate::config::{ConfigError, PipelineConfig};
use crate::embedding::{
    attach_embeddings, attach_precomputed, to_embedded_nodes, Embedder, EmbeddingError,
    SimilarityEngine, SimilarityError, SimilarityReport,
};
use crate::extraction::{extract_all, ConceptExtractor, ExtractionSummary, TextFragment};
use crate::graph::{deduplicate, fuse, ConceptNode, DedupReport, FusionReport, Graph};
use crate::layout::{vectors_of, Layout, LayoutEngine, LayoutError, LayoutReport};
use crate::storage::{
    fingerprint, get_or_compute_checked, lookup, save, ArtifactCache, CacheOutcome, StorageError,
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Hard failures of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Where node vectors come from.
pub enum EmbeddingSource<'a> {
    /// Embed `"{label}: {description}"` with a model
    Model(&'a dyn Embedder),
    /// Match vectors from a "nodes with embeddings" artifact by key
    Precomputed(&'a EmbeddedNodes),
    /// No vectors: no similarity edges, topology-only layout
    None,
}

impl EmbeddingSource<'_> {
    /// Identifies the source in cache keys.
    fn cache_tag(&self, model: &str) -> PipelineResult<String> {
        Ok(match self {
            EmbeddingSource::Model(_) => format!("model:{}", model),
            EmbeddingSource::Precomputed(records) => {
                format!("precomputed:{}", fingerprint(records, None)?)
            }
            EmbeddingSource::None => "none".to_string(),
        })
    }
}

/// What a run did, stage by stage.
///
/// Stage reports are `None` when that stage was served from the cache.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub dedup: DedupReport,
    pub embedded_nodes: usize,
    pub similarity: Option<SimilarityReport>,
    pub fusion: Option<FusionReport>,
    pub layout: Option<LayoutReport>,
    /// Cache outcome per stage name
    pub cache: BTreeMap<&'static str, CacheOutcome>,
}

/// The two artifacts handed to renderers, plus the run report.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub graph: Graph,
    pub layout: Layout,
    pub report: PipelineReport,
}

/// Runs the stages with one configuration and one cache.
pub struct Pipeline {
    config: PipelineConfig,
    cache: Box<dyn ArtifactCache>,
    similarity: SimilarityEngine,
    layout: LayoutEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, cache: Box<dyn ArtifactCache>) -> PipelineResult<Self> {
        config.validate()?;
        let similarity =
            SimilarityEngine::new(config.similarity.threshold, config.similarity.dimension)?;
        let layout = LayoutEngine::new(config.layout.clone())?
            .with_expected_dimension(config.similarity.dimension);
        Ok(Self {
            config,
            cache,
            similarity,
            layout,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract raw concepts from fragments, cached as stage `concepts`.
    ///
    /// A run in which some fragment failed is returned but not cached, so
    /// the next run retries those fragments. The summary is `None` on a
    /// cache hit.
    pub async fn extract(
        &self,
        extractor: &dyn ConceptExtractor,
        fragments: &[TextFragment],
    ) -> PipelineResult<(RawConcepts, Option<ExtractionSummary>)> {
        let max = self.config.extraction.max_fragments;
        let key = fingerprint(&(extractor.id(), max, fragments), None)?;

        match lookup::<RawConcepts, _>(self.cache.as_ref(), "concepts", &key, |_| Ok(())) {
            Ok(raw) => {
                info!(nodes = raw.nodes.len(), edges = raw.edges.len(), "using cached extraction");
                return Ok((raw, None));
            }
            Err(CacheOutcome::Recomputed) => warn!("cached extraction was malformed"),
            Err(_) => {}
        }

        let timeout = Duration::from_secs(self.config.extraction.timeout_seconds);
        let (raw, summary) = extract_all(extractor, fragments, max, timeout).await;
        if summary.failed_fragments == 0 {
            save(self.cache.as_ref(), "concepts", &key, &raw);
        } else {
            warn!(
                failed = summary.failed_fragments,
                "extraction incomplete, not caching"
            );
        }
        Ok((raw, Some(summary)))
    }

    /// Build the fused graph and its layout from raw concepts.
    pub fn build(
        &self,
        raw: &RawConcepts,
        source: EmbeddingSource<'_>,
    ) -> PipelineResult<PipelineOutput> {
        let mut report = PipelineReport::default();
        let cache = self.cache.as_ref();

        let (mut nodes, dedup) = deduplicate(&raw.nodes);
        report.dedup = dedup;

        let input = fingerprint(&(raw, source.cache_tag(&self.config.embedding.model)?), None)?;
        let keys = self.config.stage_fingerprints(&input)?;

        // embeddings
        let (embedded, outcome) = get_or_compute_checked(
            cache,
            "embeddings",
            &keys.embeddings,
            |records: &EmbeddedNodes| same_nodes(records, &nodes),
            || -> PipelineResult<EmbeddedNodes> {
                let mut fresh = nodes.clone();
                match &source {
                    EmbeddingSource::Model(embedder) => attach_embeddings(&mut fresh, *embedder)?,
                    EmbeddingSource::Precomputed(records) => {
                        attach_precomputed(&mut fresh, records);
                    }
                    EmbeddingSource::None => {}
                }
                Ok(to_embedded_nodes(&fresh))
            },
        )?;
        report.cache.insert("embeddings", outcome);
        report.embedded_nodes = attach_precomputed(&mut nodes, &embedded);

        // similarity + fusion
        let mut fresh_graph: Option<Graph> = None;
        let (graph_artifact, outcome) = get_or_compute_checked(
            cache,
            "graph",
            &keys.graph,
            |artifact: &GraphArtifact| {
                let graph = Graph::from_artifact(artifact)?;
                if graph.node_count() == nodes.len() && nodes.iter().all(|n| graph.contains(&n.key))
                {
                    Ok(())
                } else {
                    Err(ArtifactError::Malformed(
                        "cached graph does not match the node set".to_string(),
                    ))
                }
            },
            || -> PipelineResult<GraphArtifact> {
                let (similar, similarity_report) = self.similarity.compute(&nodes)?;
                let (graph, fusion_report) = fuse(nodes.clone(), &raw.edges, &similar);
                report.similarity = Some(similarity_report);
                report.fusion = Some(fusion_report);
                let artifact = graph.to_artifact();
                fresh_graph = Some(graph);
                Ok(artifact)
            },
        )?;
        report.cache.insert("graph", outcome);
        let graph = match fresh_graph {
            Some(graph) => graph,
            None => Graph::from_artifact(&graph_artifact)?,
        };

        // layout
        let dims = self.layout.config().dimensions;
        let vectors = vectors_of(&nodes);
        let mut fresh_layout: Option<Layout> = None;
        let (layout_artifact, outcome) = get_or_compute_checked(
            cache,
            "layout",
            &keys.layout,
            |artifact: &LayoutArtifact| Layout::from_artifact(artifact, &graph, dims).map(|_| ()),
            || -> PipelineResult<LayoutArtifact> {
                let (layout, layout_report) = self.layout.compute(&graph, &vectors)?;
                report.layout = Some(layout_report);
                let artifact = layout.to_artifact();
                fresh_layout = Some(layout);
                Ok(artifact)
            },
        )?;
        report.cache.insert("layout", outcome);
        let layout = match fresh_layout {
            Some(layout) => layout,
            None => Layout::from_artifact(&layout_artifact, &graph, dims)?,
        };

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            embedded = report.embedded_nodes,
            coordinates = layout.len(),
            "pipeline complete"
        );
        Ok(PipelineOutput {
            graph,
            layout,
            report,
        })
    }
}

/// Accept a cached embeddings artifact only if it lists exactly `nodes`, in order.
fn same_nodes(records: &EmbeddedNodes, nodes: &[ConceptNode]) -> ArtifactResult<()> {
    let matches = records.0.len() == nodes.len()
        && records
            .0
            .iter()
            .zip(nodes)
            .all(|(r, n)| r.id == n.key.as_str());
    if matches {
        Ok(())
    } else {
        Err(ArtifactError::Malformed(
            "cached embeddings do not match the node set".to_string(),
        ))
    }
}

/// Decode an artifact from a file path, validating it.
pub fn read_artifact<A: Artifact>(path: &std::path::Path) -> PipelineResult<A> {
    let text = std::fs::read_to_string(path).map_err(StorageError::from)?;
    Ok(A::decode(&text)?)
}
