//! Fusion of explicit and similarity edges into one simple graph
//!
//! Order of operations is fixed: nodes, then explicit edges, then
//! similarity edges, then degree. Because explicit edges are placed first
//! and an occupied pair rejects every later edge, an explicit edge always
//! wins over a similarity edge for the same pair.

use super::edge::{Edge, EdgeKind};
use super::node::{ConceptNode, NodeKey};
use super::structure::{EdgeRejection, Graph};
use crate::artifact::RawEdgeRecord;
use tracing::{debug, info, warn};

/// An edge record that named a node absent from the node set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingEdge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
}

/// What fusion kept and dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionReport {
    pub explicit_added: usize,
    pub similarity_added: usize,
    /// Edges dropped because an endpoint is missing
    pub dangling: Vec<DanglingEdge>,
    /// Later explicit records for an already-connected pair, as `(source, target)`
    pub duplicate_explicit: Vec<(String, String)>,
    /// Records whose endpoints canonicalize to the same key
    pub self_loops_dropped: usize,
    /// Similarity edges whose pair was already taken
    pub similarity_shadowed: usize,
}

impl FusionReport {
    pub fn dangling_count(&self) -> usize {
        self.dangling.len()
    }

    pub fn duplicate_explicit_count(&self) -> usize {
        self.duplicate_explicit.len()
    }
}

/// Build the fused graph.
///
/// - `nodes`: deduplicated concept nodes (first occurrence of a key wins
///   if duplicates slip through)
/// - `explicit`: raw extraction relations; endpoints are canonicalized the
///   same way node ids are
/// - `similarity`: candidate edges from the similarity engine
///
/// Never fails: dangling references, duplicate explicit pairs, and
/// self-loops are dropped and recorded in the report.
pub fn fuse(
    nodes: Vec<ConceptNode>,
    explicit: &[RawEdgeRecord],
    similarity: &[Edge],
) -> (Graph, FusionReport) {
    let mut graph = Graph::with_nodes(nodes);
    let mut report = FusionReport::default();

    for record in explicit {
        let (Some(source), Some(target)) = (
            NodeKey::canonicalize(&record.source),
            NodeKey::canonicalize(&record.target),
        ) else {
            warn!(
                source = %record.source,
                target = %record.target,
                "dropping explicit edge with blank endpoint"
            );
            report.dangling.push(DanglingEdge {
                source: record.source.clone(),
                target: record.target.clone(),
                kind: EdgeKind::Explicit,
            });
            continue;
        };
        let edge = Edge::explicit(source, target, record.relationship.clone());
        match graph.try_insert_edge(edge) {
            Ok(()) => report.explicit_added += 1,
            Err(EdgeRejection::Dangling) => {
                warn!(
                    source = %record.source,
                    target = %record.target,
                    "dropping explicit edge with dangling reference"
                );
                report.dangling.push(DanglingEdge {
                    source: record.source.clone(),
                    target: record.target.clone(),
                    kind: EdgeKind::Explicit,
                });
            }
            Err(EdgeRejection::SelfLoop) => report.self_loops_dropped += 1,
            Err(EdgeRejection::Occupied) => {
                debug!(
                    source = %record.source,
                    target = %record.target,
                    "dropping duplicate explicit edge"
                );
                report
                    .duplicate_explicit
                    .push((record.source.clone(), record.target.clone()));
            }
        }
    }

    for edge in similarity {
        match graph.try_insert_edge(edge.clone()) {
            Ok(()) => report.similarity_added += 1,
            Err(EdgeRejection::Dangling) => {
                warn!(
                    source = %edge.source,
                    target = %edge.target,
                    "dropping similarity edge with dangling reference"
                );
                report.dangling.push(DanglingEdge {
                    source: edge.source.to_string(),
                    target: edge.target.to_string(),
                    kind: EdgeKind::Similarity,
                });
            }
            Err(EdgeRejection::SelfLoop) => report.self_loops_dropped += 1,
            Err(EdgeRejection::Occupied) => report.similarity_shadowed += 1,
        }
    }

    graph.recompute_degrees();

    if !report.dangling.is_empty() || !report.duplicate_explicit.is_empty() {
        warn!(
            dangling = report.dangling.len(),
            duplicate_explicit = report.duplicate_explicit.len(),
            "fusion dropped edge records"
        );
    }
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        explicit = report.explicit_added,
        similarity = report.similarity_added,
        "fused concept graph"
    );

    (graph, report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> ConceptNode {
        ConceptNode::new(id, format!("about {}", id)).unwrap()
    }

    fn key(s: &str) -> NodeKey {
        NodeKey::canonicalize(s).unwrap()
    }

    fn raw(s: &str, t: &str, rel: &str) -> RawEdgeRecord {
        RawEdgeRecord::new(s, t, rel)
    }

    #[test]
    fn explicit_edge_beats_similarity_edge() {
        let nodes = vec![node("Gradient Descent"), node("Backpropagation")];
        let explicit = vec![raw("Gradient Descent", "Backpropagation", "enables")];
        let similar = vec![Edge::similarity(
            key("gradient descent"),
            key("backpropagation"),
            0.99,
        )];

        let (graph, report) = fuse(nodes, &explicit, &similar);

        assert_eq!(graph.edge_count(), 1);
        let edge = graph
            .edge_between(&key("backpropagation"), &key("gradient descent"))
            .unwrap();
        assert_eq!(edge.kind, EdgeKind::Explicit);
        assert_eq!(edge.weight, 1.0);
        assert_eq!(edge.relationship, "enables");
        assert_eq!(report.similarity_shadowed, 1);
    }

    #[test]
    fn reversed_similarity_edge_is_still_shadowed() {
        let nodes = vec![node("a"), node("b")];
        let explicit = vec![raw("a", "b", "causes")];
        let similar = vec![Edge::similarity(key("b"), key("a"), 0.9)];
        let (graph, _) = fuse(nodes, &explicit, &similar);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[0].kind, EdgeKind::Explicit);
    }

    #[test]
    fn first_explicit_record_wins_for_a_pair() {
        let nodes = vec![node("a"), node("b")];
        let explicit = vec![raw("a", "b", "enables"), raw("B", "A", "contradicts")];
        let (graph, report) = fuse(nodes, &explicit, &[]);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges()[0].relationship, "enables");
        assert_eq!(report.duplicate_explicit_count(), 1);
    }

    #[test]
    fn dangling_references_are_dropped_and_reported() {
        let nodes = vec![node("a"), node("b")];
        let explicit = vec![raw("a", "ghost", "haunts"), raw("a", "b", "enables")];
        let similar = vec![Edge::similarity(key("b"), key("phantom"), 0.8)];
        let (graph, report) = fuse(nodes, &explicit, &similar);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(report.dangling_count(), 2);
        assert_eq!(report.dangling[0].kind, EdgeKind::Explicit);
        assert_eq!(report.dangling[1].kind, EdgeKind::Similarity);
    }

    #[derive(Clone, Default)]
    struct LogBuffer(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn blank_endpoint_is_reported_and_logged() {
        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let (graph, report) = tracing::subscriber::with_default(subscriber, || {
            fuse(vec![node("a"), node("b")], &[raw("a", "   ", "points at")], &[])
        });

        assert_eq!(graph.edge_count(), 0);
        assert_eq!(report.dangling_count(), 1);
        assert_eq!(report.dangling[0].kind, EdgeKind::Explicit);
        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("blank endpoint"), "log was: {}", text);
    }

    #[test]
    fn explicit_endpoints_are_canonicalized() {
        let nodes = vec![node("Entropy"), node("Information")];
        let explicit = vec![raw("  ENTROPY", "information ", "measures")];
        let (graph, report) = fuse(nodes, &explicit, &[]);
        assert_eq!(graph.edge_count(), 1);
        assert!(report.dangling.is_empty());
    }

    #[test]
    fn self_loops_are_dropped() {
        let nodes = vec![node("a")];
        let explicit = vec![raw("a", "A", "is")];
        let similar = vec![Edge::similarity(key("a"), key("a"), 1.0)];
        let (graph, report) = fuse(nodes, &explicit, &similar);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(report.self_loops_dropped, 2);
    }

    #[test]
    fn degree_counts_incident_edges() {
        let nodes = vec![node("hub"), node("x"), node("y"), node("z")];
        let explicit = vec![raw("hub", "x", "r"), raw("hub", "y", "r")];
        let similar = vec![Edge::similarity(key("z"), key("hub"), 0.8)];
        let (graph, _) = fuse(nodes, &explicit, &similar);
        assert_eq!(graph.degree(&key("hub")), Some(3));
        assert_eq!(graph.degree(&key("x")), Some(1));
        assert_eq!(graph.degree(&key("z")), Some(1));
    }

    #[test]
    fn fusion_is_idempotent() {
        let nodes = vec![node("a"), node("b"), node("c")];
        let explicit = vec![raw("a", "b", "r"), raw("b", "c", "s")];
        let similar = vec![Edge::similarity(key("a"), key("c"), 0.8)];
        let first = fuse(nodes.clone(), &explicit, &similar);
        let second = fuse(nodes, &explicit, &similar);
        assert_eq!(first.0.nodes(), second.0.nodes());
        assert_eq!(first.0.edges(), second.0.edges());
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn empty_input_yields_empty_graph() {
        let (graph, report) = fuse(Vec::new(), &[], &[]);
        assert!(graph.is_empty());
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(report, FusionReport::default());
    }
}
