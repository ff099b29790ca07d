//! Concept extraction collaborator
//!
//! The extraction service (an LLM behind some transport) turns a text
//! fragment into raw concept and relation records. This module defines
//! the client seam, the schema-validated parser for its responses, and a
//! batch driver. Transport is out of scope; `MockExtractor` serves
//! preconfigured responses for tests and offline runs.

use crate::artifact::RawConcepts;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

/// An ordered piece of document text handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    /// 1-based page the fragment came from
    pub page: usize,
    /// Position of the fragment within its page
    pub chunk_index: usize,
    pub text: String,
}

impl TextFragment {
    pub fn new(page: usize, chunk_index: usize, text: impl Into<String>) -> Self {
        Self {
            page,
            chunk_index,
            text: text.into(),
        }
    }
}

/// Errors from extraction operations.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("extractor not available: {0}")]
    Unavailable(String),
    #[error("extraction call failed: {0}")]
    InvocationFailed(String),
    #[error("no JSON object found in extraction response: {0}")]
    NoJson(String),
    #[error("extraction response does not match schema: {0}")]
    Schema(String),
    #[error("extraction timed out after {0} seconds")]
    Timeout(u64),
}

/// Client trait for the extraction service.
///
/// Abstracts over transport so the pipeline does not depend on how the
/// service is reached.
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    /// Identifies the extractor (model, prompt version) in cache keys.
    fn id(&self) -> &str;

    /// Extract concepts and relations from one fragment.
    async fn extract(&self, fragment: &TextFragment) -> Result<RawConcepts, ExtractionError>;
}

/// Slice out the body of the first markdown code fence, if closed.
fn fenced_body(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    // skip an info string such as `json`
    let body_start = rest.find('\n').map_or(0, |i| i + 1);
    let rest = &rest[body_start..];
    rest.find("```").map(|close| &rest[..close])
}

/// Locate the JSON object in a model reply.
///
/// Replies may be bare JSON, a fenced block, or JSON surrounded by prose.
/// Candidates are tried in that order; only objects are accepted.
fn extract_json(text: &str) -> Option<serde_json::Value> {
    let text = text.trim();
    let braced = match (text.find('{'), text.rfind('}')) {
        (Some(open), Some(close)) if open < close => Some(&text[open..=close]),
        _ => None,
    };
    [Some(text), fenced_body(text), braced]
        .into_iter()
        .flatten()
        .filter_map(|candidate| serde_json::from_str::<serde_json::Value>(candidate.trim()).ok())
        .find(serde_json::Value::is_object)
}

/// Parse an extraction response into raw records.
///
/// Distinguishes "nothing extracted" (`Ok` with empty arrays) from a
/// response with no JSON (`NoJson`) or one of the wrong shape (`Schema`).
/// The response must carry both `nodes` and `edges` arrays; node records
/// need a string `id`, edge records string `source` and `target`.
pub fn parse_extraction_response(text: &str) -> Result<RawConcepts, ExtractionError> {
    let value = extract_json(text).ok_or_else(|| {
        let snippet: String = text.chars().take(200).collect();
        ExtractionError::NoJson(snippet)
    })?;
    serde_json::from_value::<RawConcepts>(value).map_err(|e| ExtractionError::Schema(e.to_string()))
}

/// Counts from a batch extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub fragments_processed: usize,
    pub failed_fragments: usize,
    pub nodes: usize,
    pub edges: usize,
}

/// Run the extractor over the first `max_fragments` fragments in order.
///
/// Results are concatenated in fragment order. A fragment whose
/// extraction fails or exceeds `timeout` is logged, counted, and skipped.
pub async fn extract_all(
    extractor: &dyn ConceptExtractor,
    fragments: &[TextFragment],
    max_fragments: usize,
    timeout: Duration,
) -> (RawConcepts, ExtractionSummary) {
    let selected = &fragments[..fragments.len().min(max_fragments)];
    let mut merged = RawConcepts::default();
    let mut summary = ExtractionSummary::default();

    for (i, fragment) in selected.iter().enumerate() {
        info!(
            fragment = i + 1,
            total = selected.len(),
            page = fragment.page,
            "extracting concepts"
        );
        let result = match tokio::time::timeout(timeout, extractor.extract(fragment)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractionError::Timeout(timeout.as_secs())),
        };
        match result {
            Ok(batch) => merged.extend(batch),
            Err(e) => {
                warn!(page = fragment.page, chunk = fragment.chunk_index, error = %e, "extraction failed, skipping fragment");
                summary.failed_fragments += 1;
            }
        }
        summary.fragments_processed += 1;
    }

    summary.nodes = merged.nodes.len();
    summary.edges = merged.edges.len();
    (merged, summary)
}

/// Extractor that replays preconfigured raw responses, keyed by fragment text.
///
/// Responses go through [`parse_extraction_response`], so malformed
/// payloads behave exactly as they would from a live service.
pub struct MockExtractor {
    id: String,
    available: bool,
    responses: HashMap<String, String>,
}

impl MockExtractor {
    /// Create a mock extractor that reports as available.
    pub fn available() -> Self {
        Self {
            id: "mock".to_string(),
            available: true,
            responses: HashMap::new(),
        }
    }

    /// Create a mock extractor that fails every call as unavailable.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::available()
        }
    }

    /// Register the raw response for a fragment text.
    pub fn with_response(mut self, fragment_text: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(fragment_text.into(), response.into());
        self
    }
}

#[async_trait]
impl ConceptExtractor for MockExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    async fn extract(&self, fragment: &TextFragment) -> Result<RawConcepts, ExtractionError> {
        if !self.available {
            return Err(ExtractionError::Unavailable("mock extractor offline".to_string()));
        }
        let response = self.responses.get(&fragment.text).ok_or_else(|| {
            ExtractionError::InvocationFailed(format!(
                "no response registered for fragment on page {}",
                fragment.page
            ))
        })?;
        parse_extraction_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(30);

    const CLEAN: &str = r#"{
        "nodes": [
            {"id": "Gradient Descent", "description": "iterative optimizer"},
            {"id": "Learning Rate", "description": "step size"}
        ],
        "edges": [
            {"source": "Learning Rate", "target": "Gradient Descent", "relationship": "controls"}
        ]
    }"#;

    #[test]
    fn parses_pure_json() {
        let raw = parse_extraction_response(CLEAN).unwrap();
        assert_eq!(raw.nodes.len(), 2);
        assert_eq!(raw.edges[0].relationship, "controls");
    }

    #[test]
    fn strips_markdown_fences() {
        let fenced = format!("```json\n{}\n```", CLEAN);
        assert_eq!(parse_extraction_response(&fenced).unwrap().nodes.len(), 2);

        let bare_fence = format!("```\n{}\n```", CLEAN);
        assert_eq!(parse_extraction_response(&bare_fence).unwrap().nodes.len(), 2);
    }

    #[test]
    fn finds_object_inside_prose() {
        let chatty = format!("Here are the concepts:\n{}\nHope this helps!", CLEAN);
        assert_eq!(parse_extraction_response(&chatty).unwrap().edges.len(), 1);
    }

    #[test]
    fn empty_arrays_are_a_valid_empty_result() {
        let raw = parse_extraction_response(r#"{"nodes": [], "edges": []}"#).unwrap();
        assert!(raw.is_empty());
    }

    #[test]
    fn prose_without_json_is_no_json() {
        let err = parse_extraction_response("I could not find any concepts.").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJson(_)));
    }

    #[test]
    fn missing_edges_array_is_a_schema_error() {
        let err = parse_extraction_response(r#"{"nodes": [{"id": "a"}]}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Schema(_)));
    }

    #[test]
    fn non_string_id_is_a_schema_error() {
        let err = parse_extraction_response(r#"{"nodes": [{"id": 7}], "edges": []}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Schema(_)));
    }

    #[tokio::test]
    async fn extract_all_skips_failed_fragments_and_keeps_order() {
        let extractor = MockExtractor::available()
            .with_response("first", r#"{"nodes": [{"id": "A"}], "edges": []}"#)
            .with_response("second", "not json at all")
            .with_response("third", r#"{"nodes": [{"id": "B"}], "edges": []}"#);
        let fragments = vec![
            TextFragment::new(1, 0, "first"),
            TextFragment::new(1, 1, "second"),
            TextFragment::new(2, 0, "third"),
        ];

        let (raw, summary) = extract_all(&extractor, &fragments, 50, LONG).await;

        let ids: Vec<&str> = raw.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(summary.fragments_processed, 3);
        assert_eq!(summary.failed_fragments, 1);
    }

    #[tokio::test]
    async fn extract_all_honors_fragment_cap() {
        let extractor = MockExtractor::available()
            .with_response("one", r#"{"nodes": [{"id": "A"}], "edges": []}"#)
            .with_response("two", r#"{"nodes": [{"id": "B"}], "edges": []}"#);
        let fragments = vec![TextFragment::new(1, 0, "one"), TextFragment::new(1, 1, "two")];

        let (raw, summary) = extract_all(&extractor, &fragments, 1, LONG).await;
        assert_eq!(raw.nodes.len(), 1);
        assert_eq!(summary.fragments_processed, 1);
    }

    #[test]
    fn unavailable_extractor_fails_every_fragment() {
        let extractor = MockExtractor::unavailable();
        let fragments = vec![TextFragment::new(1, 0, "text")];
        let (raw, summary) = tokio_test::block_on(extract_all(&extractor, &fragments, 10, LONG));
        assert!(raw.is_empty());
        assert_eq!(summary.failed_fragments, 1);
    }

    struct StalledExtractor;

    #[async_trait]
    impl ConceptExtractor for StalledExtractor {
        fn id(&self) -> &str {
            "stalled"
        }

        async fn extract(&self, _fragment: &TextFragment) -> Result<RawConcepts, ExtractionError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(RawConcepts::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fragments_time_out_and_are_skipped() {
        let fragments = vec![TextFragment::new(1, 0, "text")];
        let (raw, summary) =
            extract_all(&StalledExtractor, &fragments, 10, Duration::from_secs(5)).await;
        assert!(raw.is_empty());
        assert_eq!(summary.failed_fragments, 1);
    }
}
