//! Deduplication of raw concept records into canonical nodes

use super::node::{ConceptNode, NodeKey};
use crate::artifact::RawConceptRecord;
use std::collections::HashSet;
use tracing::{debug, warn};

/// What deduplication kept and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupReport {
    /// Records seen
    pub input_records: usize,
    /// Nodes produced
    pub unique_nodes: usize,
    /// Later records whose key was already taken
    pub duplicates_dropped: usize,
    /// Records with an empty or whitespace-only id
    pub blank_ids_rejected: usize,
}

/// Canonicalize and merge raw records into a unique, order-preserving node list.
///
/// The first record for a key wins; later duplicates are dropped whole
/// (descriptions are not merged). Records whose id is blank after trimming
/// are rejected rather than collapsed into one anonymous node.
pub fn deduplicate(records: &[RawConceptRecord]) -> (Vec<ConceptNode>, DedupReport) {
    let mut seen: HashSet<NodeKey> = HashSet::with_capacity(records.len());
    let mut nodes = Vec::with_capacity(records.len());
    let mut report = DedupReport {
        input_records: records.len(),
        ..Default::default()
    };

    for record in records {
        let Some(node) = ConceptNode::new(&record.id, record.description.clone()) else {
            report.blank_ids_rejected += 1;
            continue;
        };
        if seen.insert(node.key.clone()) {
            nodes.push(node);
        } else {
            debug!(key = %node.key, "dropping duplicate concept record");
            report.duplicates_dropped += 1;
        }
    }

    report.unique_nodes = nodes.len();
    if report.blank_ids_rejected > 0 {
        warn!(
            count = report.blank_ids_rejected,
            "rejected concept records with blank ids"
        );
    }
    (nodes, report)
}
