//! Shared fixtures for integration tests

#![allow(dead_code)]

use conceptgraph::{
    Embedder, EmbeddingError, RawConceptRecord, RawConcepts, RawEdgeRecord,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Deterministic embedder: looks vectors up by the node name in
/// `"{name}: {description}"`; unknown names embed to `fallback`.
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbedder {
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with(mut self, name: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(name.to_string(), vector);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Embedder for MockEmbedder {
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(texts
            .iter()
            .map(|text| {
                let name = text.split(": ").next().unwrap_or_default();
                self.vectors
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect())
    }
}

pub fn concepts(nodes: &[(&str, &str)], edges: &[(&str, &str, &str)]) -> RawConcepts {
    RawConcepts {
        nodes: nodes
            .iter()
            .map(|(id, desc)| RawConceptRecord::new(*id, *desc))
            .collect(),
        edges: edges
            .iter()
            .map(|(s, t, r)| RawEdgeRecord::new(*s, *t, *r))
            .collect(),
    }
}

/// A small machine-learning corpus with two loose topic groups.
pub fn ml_corpus() -> (RawConcepts, MockEmbedder) {
    let raw = concepts(
        &[
            ("Gradient Descent", "iterative optimizer"),
            ("Backpropagation", "computes gradients"),
            ("Learning Rate", "step size"),
            ("Loss Function", "training objective"),
            ("Entropy", "uncertainty of a distribution"),
            ("Cross Entropy", "loss between distributions"),
            ("KL Divergence", "distance between distributions"),
            ("Glossary Stub", ""),
        ],
        &[
            ("Gradient Descent", "Backpropagation", "enables"),
            ("Learning Rate", "Gradient Descent", "controls"),
            ("Cross Entropy", "Loss Function", "is a"),
            ("Entropy", "Missing Concept", "dangles"),
        ],
    );
    let embedder = MockEmbedder::new(vec![0.0, 0.0, 0.0, 0.0])
        .with("Gradient Descent", vec![1.0, 0.1, 0.0, 0.0])
        .with("Backpropagation", vec![0.9, 0.2, 0.0, 0.0])
        .with("Learning Rate", vec![0.8, 0.3, 0.1, 0.0])
        .with("Loss Function", vec![0.6, 0.6, 0.2, 0.0])
        .with("Entropy", vec![0.0, 0.1, 1.0, 0.2])
        .with("Cross Entropy", vec![0.1, 0.2, 0.9, 0.3])
        .with("KL Divergence", vec![0.0, 0.0, 0.8, 0.5]);
    (raw, embedder)
}
