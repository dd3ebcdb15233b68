//! Search-related models for requests, results and cost estimates.

use serde::{Deserialize, Serialize};

use super::config::{ProviderKind, SearchConfig};
use super::filter::FilterOptions;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Parameters of a single search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,

    pub top_k: u32,

    pub score_threshold: f64,

    pub use_rerank: bool,

    #[serde(default, skip_serializing_if = "FilterOptions::is_empty")]
    pub filters: FilterOptions,
}

impl SearchRequest {
    /// Create a request using the configured search defaults.
    pub fn new(query: impl Into<String>, defaults: &SearchConfig) -> Self {
        Self {
            query: query.into(),
            top_k: defaults.top_k,
            score_threshold: defaults.score_threshold,
            use_rerank: defaults.use_rerank,
            filters: FilterOptions::default(),
        }
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_score_threshold(mut self, score_threshold: f64) -> Self {
        self.score_threshold = score_threshold;
        self
    }

    pub fn with_rerank(mut self, use_rerank: bool) -> Self {
        self.use_rerank = use_rerank;
        self
    }

    pub fn with_filters(mut self, filters: FilterOptions) -> Self {
        self.filters = filters;
        self
    }
}

/// A single ranked passage. Scores are comparable only within one ranking pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,

    pub score: f64,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Outcome of a search.
///
/// Built through [`SearchResponse::new`] so that `total` and `should_use_llm` always
/// agree with `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub cost_estimate: f64,
    pub tokens_used: u64,
    #[serde(rename = "shouldUseLLM")]
    pub should_use_llm: bool,
    pub rerank_used: bool,
    pub provider: ProviderKind,
}

impl SearchResponse {
    pub fn new(
        results: Vec<SearchResult>,
        cost_estimate: f64,
        tokens_used: u64,
        rerank_used: bool,
        provider: ProviderKind,
    ) -> Self {
        Self {
            total: results.len(),
            should_use_llm: results.is_empty(),
            results,
            cost_estimate,
            tokens_used,
            rerank_used,
            provider,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Pre-flight cost estimate for a query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub embedding_tokens: u64,
    pub embedding_cost: f64,
    pub rerank_cost: f64,
    pub total_cost: f64,
    pub provider: ProviderKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f64) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            score,
            content: String::new(),
            metadata: None,
        }
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_response_invariants() {
        let empty = SearchResponse::new(vec![], 0.0, 3, false, ProviderKind::Voyage);
        assert_eq!(empty.total, 0);
        assert!(empty.should_use_llm);

        let full = SearchResponse::new(
            vec![result("a", 0.9), result("b", 0.85)],
            0.1,
            103,
            true,
            ProviderKind::Mistral,
        );
        assert_eq!(full.total, full.results.len());
        assert!(!full.should_use_llm);
    }

    #[test]
    fn test_response_wire_names() {
        let value =
            serde_json::to_value(SearchResponse::new(vec![], 0.0, 0, false, ProviderKind::Voyage))
                .unwrap();
        assert_eq!(value["shouldUseLLM"], true);
        assert_eq!(value["costEstimate"], 0.0);
        assert_eq!(value["rerankUsed"], false);
        assert_eq!(value["provider"], "voyage");
    }

    #[test]
    fn test_request_defaults_from_config() {
        let request = SearchRequest::new("refund policy", &SearchConfig::default());
        assert_eq!(request.top_k, 5);
        assert!(request.use_rerank);
        assert!(request.filters.is_empty());
    }
}
