//! Full pipeline runs against real cache backends

mod common;

use conceptgraph::storage::CacheOutcome;
use conceptgraph::{
    detect_communities, graph_stats, Artifact, CacheBackend, EdgeKind, EmbeddedNodes,
    EmbeddingSource, FileCache, Graph, GraphArtifact, Layout, LayoutArtifact, MockExtractor,
    OpenCache, Pipeline, PipelineConfig, SqliteCache, TextFragment,
};
use tempfile::TempDir;

fn config() -> PipelineConfig {
    PipelineConfig::from_yaml_str(
        "similarity:\n  threshold: 0.9\nlayout:\n  dimensions: 3\n  n_neighbors: 4\n  projection_epochs: 100\n",
    )
    .unwrap()
}

#[test]
fn build_writes_artifacts_that_reload_cleanly() {
    let (raw, embedder) = common::ml_corpus();
    let dir = TempDir::new().unwrap();
    let cache = FileCache::open(dir.path().join("cache")).unwrap();
    let pipeline = Pipeline::new(config(), Box::new(cache)).unwrap();

    let out = pipeline.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();

    assert_eq!(out.graph.node_count(), 8);
    assert!(out.layout.covers(&out.graph));
    assert!(out.layout.coordinates.values().all(|p| p.len() == 3));
    let fusion = out.report.fusion.as_ref().unwrap();
    assert_eq!(fusion.explicit_added, 3);
    assert_eq!(fusion.dangling_count(), 1);

    let graph_json = out.graph.to_artifact().encode().unwrap();
    let layout_json = out.layout.to_artifact().encode().unwrap();
    let graph = Graph::from_artifact(&GraphArtifact::decode(&graph_json).unwrap()).unwrap();
    let layout = Layout::from_artifact(&LayoutArtifact::decode(&layout_json).unwrap(), &graph, 3)
        .unwrap();
    assert_eq!(graph.edge_count(), out.graph.edge_count());
    assert_eq!(layout.len(), 8);
    for node in out.graph.nodes() {
        assert_eq!(graph.degree(&node.key), Some(node.degree));
    }
}

#[test]
fn file_cache_serves_second_run_across_pipelines() {
    let (raw, embedder) = common::ml_corpus();
    let dir = TempDir::new().unwrap();

    let first = Pipeline::new(config(), Box::new(FileCache::open(dir.path()).unwrap())).unwrap();
    let a = first.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();

    let second = Pipeline::new(config(), Box::new(FileCache::open(dir.path()).unwrap())).unwrap();
    let b = second.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();

    assert_eq!(embedder.calls(), 1);
    assert_eq!(b.report.cache["layout"], CacheOutcome::Hit);
    assert_eq!(a.graph.edge_count(), b.graph.edge_count());
    assert_eq!(a.layout.len(), b.layout.len());
}

#[test]
fn corrupt_cache_files_are_recomputed() {
    let (raw, embedder) = common::ml_corpus();
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::new(config(), Box::new(FileCache::open(dir.path()).unwrap())).unwrap();
    pipeline.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();

    for entry in std::fs::read_dir(dir.path()).unwrap() {
        std::fs::write(entry.unwrap().path(), "garbage").unwrap();
    }

    let out = pipeline.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();
    assert!(out
        .report
        .cache
        .values()
        .all(|outcome| *outcome == CacheOutcome::Recomputed));
    assert!(out.layout.covers(&out.graph));
}

#[test]
fn sqlite_backend_from_config() {
    let (raw, embedder) = common::ml_corpus();
    let dir = TempDir::new().unwrap();
    let mut config = config();
    config.cache.backend = CacheBackend::Sqlite;
    config.cache.path = Some(dir.path().join("cache.db"));

    let cache = config.cache.open(dir.path()).unwrap();
    assert_eq!(cache.name(), "sqlite");
    let pipeline = Pipeline::new(config, cache).unwrap();
    pipeline.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();
    let again = pipeline.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();
    assert_eq!(again.report.cache["graph"], CacheOutcome::Hit);

    let db = SqliteCache::open(dir.path().join("cache.db")).unwrap();
    assert_eq!(db.count("layout").unwrap(), 1);
}

#[test]
fn precomputed_embeddings_artifact_drives_similarity() {
    let raw = common::concepts(&[("Travel", ""), ("Voyage", ""), ("Cheese", "")], &[]);
    let records = EmbeddedNodes::decode(
        r#"[
            {"id": "travel", "description": "", "embedding": [0.9, 0.1, 0.0]},
            {"id": "VOYAGE", "description": "", "embedding": [0.85, 0.15, 0.0]}
        ]"#,
    )
    .unwrap();
    let pipeline = Pipeline::new(config(), Box::new(conceptgraph::NoCache)).unwrap();
    let out = pipeline.build(&raw, EmbeddingSource::Precomputed(&records)).unwrap();

    assert_eq!(out.report.embedded_nodes, 2);
    assert_eq!(out.graph.edge_count(), 1);
    assert_eq!(out.graph.edges()[0].kind, EdgeKind::Similarity);
    let similarity = out.report.similarity.as_ref().unwrap();
    assert_eq!(similarity.missing.len(), 1);
    assert!(out.layout.covers(&out.graph));
}

#[test]
fn stats_and_communities_over_built_graph() {
    let (raw, embedder) = common::ml_corpus();
    let pipeline = Pipeline::new(config(), Box::new(conceptgraph::NoCache)).unwrap();
    let out = pipeline.build(&raw, EmbeddingSource::Model(&embedder)).unwrap();

    let stats = graph_stats(&out.graph, 3);
    assert_eq!(stats.node_count, 8);
    assert_eq!(stats.explicit_edges + stats.similarity_edges, stats.edge_count);
    assert!(stats.most_connected.len() <= 3);
    assert!(stats
        .most_connected
        .windows(2)
        .all(|w| w[0].degree >= w[1].degree));

    let communities = detect_communities(&out.graph);
    let covered: usize = communities.iter().map(Vec::len).sum();
    assert_eq!(covered, 8);
}

#[tokio::test]
async fn extraction_feeds_build() {
    let extractor = MockExtractor::available()
        .with_response(
            "page one",
            r#"```json
            {"nodes": [{"id": "Entropy", "description": "disorder"}],
             "edges": [{"source": "Entropy", "target": "Information", "relationship": "measures"}]}
            ```"#,
        )
        .with_response(
            "page two",
            r#"{"nodes": [{"id": "Information", "description": "bits"}, {"id": "entropy"}], "edges": []}"#,
        );
    let fragments = vec![
        TextFragment::new(1, 0, "page one"),
        TextFragment::new(2, 0, "page two"),
    ];
    let pipeline = Pipeline::new(config(), Box::new(conceptgraph::MemoryCache::new())).unwrap();

    let (raw, summary) = pipeline.extract(&extractor, &fragments).await.unwrap();
    assert_eq!(summary.unwrap().failed_fragments, 0);

    let out = pipeline.build(&raw, EmbeddingSource::None).unwrap();
    assert_eq!(out.graph.node_count(), 2);
    assert_eq!(out.report.dedup.duplicates_dropped, 1);
    assert_eq!(out.graph.edge_count(), 1);
    assert!(out.layout.covers(&out.graph));
}
