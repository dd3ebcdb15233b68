use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";
pub const DEFAULT_COLLECTION: &str = "mcp-knowledge-base";
pub const DEFAULT_VECTOR_SIZE: u64 = 1024;
pub const DEFAULT_VOYAGE_URL: &str = "https://api.voyageai.com/v1";
pub const DEFAULT_MISTRAL_URL: &str = "https://api.mistral.ai/v1";
pub const DEFAULT_USER_ID: &str = "default_user";

/// Embedding provider variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Voyage,
    Mistral,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Voyage => "voyage",
            ProviderKind::Mistral => "mistral",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "voyage" => Ok(ProviderKind::Voyage),
            "mistral" => Ok(ProviderKind::Mistral),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

/// Immutable configuration snapshot.
///
/// Every field has a default so that a partial document (or none at all) deserializes
/// into a complete snapshot; ranges are checked by [`Config::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub qdrant: QdrantConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub cost: CostConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub filters: FiltersConfig,

    #[serde(default)]
    pub system: SystemConfig,
}

impl Config {
    /// Deserialize a merged JSON document and validate it.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_value(value).map_err(|e| ConfigError::Validation(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Range checks for every bounded field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty("qdrant.url", &self.qdrant.url)?;
        non_empty("qdrant.collectionName", &self.qdrant.collection_name)?;
        in_range_u64("qdrant.vectorSize", self.qdrant.vector_size, 1, 65_536)?;

        in_range_u64(
            "providers.timeoutSecs",
            self.providers.timeout_secs,
            1,
            600,
        )?;
        in_range_u64(
            "providers.maxRetries",
            u64::from(self.providers.max_retries),
            1,
            10,
        )?;
        non_empty(
            "providers.voyage.embeddingModel",
            &self.providers.voyage.embedding_model,
        )?;
        non_empty(
            "providers.voyage.rerankModel",
            &self.providers.voyage.rerank_model,
        )?;
        non_empty("providers.voyage.baseUrl", &self.providers.voyage.base_url)?;
        non_empty(
            "providers.mistral.embeddingModel",
            &self.providers.mistral.embedding_model,
        )?;
        non_empty("providers.mistral.baseUrl", &self.providers.mistral.base_url)?;

        non_empty("logging.baseLogDir", &self.logging.base_log_dir)?;
        non_empty("logging.level", &self.logging.level)?;
        if self.logging.rotate_days == 0 {
            return Err(ConfigError::Validation(
                "logging.rotateDays must be at least 1".to_string(),
            ));
        }

        non_negative("cost.threshold", self.cost.threshold)?;
        non_negative(
            "cost.embeddingCostPerMillion.voyage",
            self.cost.embedding_cost_per_million.voyage,
        )?;
        non_negative(
            "cost.embeddingCostPerMillion.mistral",
            self.cost.embedding_cost_per_million.mistral,
        )?;
        non_negative(
            "cost.rerankCostPerThousand.voyage",
            self.cost.rerank_cost_per_thousand.voyage,
        )?;
        non_negative(
            "cost.rerankCostPerThousand.mistral",
            self.cost.rerank_cost_per_thousand.mistral,
        )?;

        in_range_u64("search.topK", u64::from(self.search.top_k), 1, 100)?;
        unit_interval("search.scoreThreshold", self.search.score_threshold)?;
        if self.search.batch_size == 0 {
            return Err(ConfigError::Validation(
                "search.batchSize must be at least 1".to_string(),
            ));
        }

        unit_interval("filters.default.minScore", self.filters.default.min_score)?;

        non_empty("system.userIdHeader", &self.system.user_id_header)?;
        non_empty("system.defaultUserId", &self.system.default_user_id)?;

        Ok(())
    }
}

fn non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn in_range_u64(field: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{field} must be between {min} and {max}, got {value}"
        )));
    }
    Ok(())
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn unit_interval(field: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{field} must be between 0.0 and 1.0, got {value}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QdrantConfig {
    /// When false, searches use the in-process keyword matcher.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_qdrant_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_collection")]
    pub collection_name: String,

    #[serde(default = "default_vector_size")]
    pub vector_size: u64,

    #[serde(default)]
    pub recreate_collection: bool,
}

fn default_true() -> bool {
    true
}

fn default_qdrant_url() -> String {
    DEFAULT_QDRANT_URL.to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_vector_size() -> u64 {
    DEFAULT_VECTOR_SIZE
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_qdrant_url(),
            api_key: None,
            collection_name: default_collection(),
            vector_size: default_vector_size(),
            recreate_collection: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default)]
    pub primary: ProviderKind,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub voyage: VoyageConfig,

    #[serde(default)]
    pub mistral: MistralConfig,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: ProviderKind::Voyage,
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            voyage: VoyageConfig::default(),
            mistral: MistralConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoyageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_voyage_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_voyage_rerank_model")]
    pub rerank_model: String,

    #[serde(default = "default_voyage_url")]
    pub base_url: String,
}

fn default_voyage_embedding_model() -> String {
    "voyage-large-2".to_string()
}

fn default_voyage_rerank_model() -> String {
    "voyage-rerank-lite-1".to_string()
}

fn default_voyage_url() -> String {
    DEFAULT_VOYAGE_URL.to_string()
}

impl Default for VoyageConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            embedding_model: default_voyage_embedding_model(),
            rerank_model: default_voyage_rerank_model(),
            base_url: default_voyage_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MistralConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_mistral_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_mistral_url")]
    pub base_url: String,
}

fn default_mistral_embedding_model() -> String {
    "mistral-embed".to_string()
}

fn default_mistral_url() -> String {
    DEFAULT_MISTRAL_URL.to_string()
}

impl Default for MistralConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            embedding_model: default_mistral_embedding_model(),
            base_url: default_mistral_url(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_base_log_dir")]
    pub base_log_dir: String,

    #[serde(default = "default_rotate_days")]
    pub rotate_days: u32,

    #[serde(default = "default_true")]
    pub log_search_queries: bool,

    #[serde(default = "default_true")]
    pub log_cost_estimates: bool,

    /// Tracing filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_base_log_dir() -> String {
    "user_logs".to_string()
}

fn default_rotate_days() -> u32 {
    30
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_log_dir: default_base_log_dir(),
            rotate_days: default_rotate_days(),
            log_search_queries: true,
            log_cost_estimates: true,
            level: default_level(),
        }
    }
}

/// Embedding price table, USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRates {
    #[serde(default = "default_voyage_embedding_rate")]
    pub voyage: f64,

    #[serde(default = "default_mistral_embedding_rate")]
    pub mistral: f64,
}

fn default_voyage_embedding_rate() -> f64 {
    0.10
}

fn default_mistral_embedding_rate() -> f64 {
    0.15
}

impl Default for EmbeddingRates {
    fn default() -> Self {
        Self {
            voyage: default_voyage_embedding_rate(),
            mistral: default_mistral_embedding_rate(),
        }
    }
}

/// Rerank price table, USD per thousand tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankRates {
    #[serde(default = "default_voyage_rerank_rate")]
    pub voyage: f64,

    #[serde(default = "default_mistral_rerank_rate")]
    pub mistral: f64,
}

fn default_voyage_rerank_rate() -> f64 {
    1.00
}

fn default_mistral_rerank_rate() -> f64 {
    0.80
}

impl Default for RerankRates {
    fn default() -> Self {
        Self {
            voyage: default_voyage_rerank_rate(),
            mistral: default_mistral_rerank_rate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostConfig {
    /// Per-search cost (USD) above which a warning is emitted.
    #[serde(default = "default_cost_threshold")]
    pub threshold: f64,

    #[serde(default)]
    pub embedding_cost_per_million: EmbeddingRates,

    #[serde(default)]
    pub rerank_cost_per_thousand: RerankRates,
}

fn default_cost_threshold() -> f64 {
    0.05
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            threshold: default_cost_threshold(),
            embedding_cost_per_million: EmbeddingRates::default(),
            rerank_cost_per_thousand: RerankRates::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_true")]
    pub use_rerank: bool,

    #[serde(default = "default_min_tokens_for_rerank")]
    pub min_tokens_for_rerank: u32,
}

fn default_top_k() -> u32 {
    5
}

fn default_score_threshold() -> f64 {
    0.82
}

fn default_batch_size() -> u32 {
    10
}

fn default_min_tokens_for_rerank() -> u32 {
    100
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            score_threshold: default_score_threshold(),
            batch_size: default_batch_size(),
            use_rerank: true,
            min_tokens_for_rerank: default_min_tokens_for_rerank(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FiltersConfig {
    #[serde(default)]
    pub default: DefaultFilterConfig,

    /// Raw payload conditions (`key -> value`) matched on every search.
    #[serde(default)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultFilterConfig {
    #[serde(default = "default_min_score")]
    pub min_score: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,

    #[serde(default)]
    pub required_tags: Vec<String>,
}

fn default_min_score() -> f64 {
    0.7
}

impl Default for DefaultFilterConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_age_days: None,
            required_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfig {
    #[serde(default = "default_user_id_header")]
    pub user_id_header: String,

    #[serde(default = "default_user_id")]
    pub default_user_id: String,

    #[serde(default = "default_true")]
    pub enable_cost_estimation: bool,

    #[serde(default = "default_true")]
    pub auto_save_new_qa_pairs: bool,
}

fn default_user_id_header() -> String {
    "X-User-ID".to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            user_id_header: default_user_id_header(),
            default_user_id: default_user_id(),
            enable_cost_estimation: true,
            auto_save_new_qa_pairs: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.qdrant.url, DEFAULT_QDRANT_URL);
        assert_eq!(config.qdrant.collection_name, DEFAULT_COLLECTION);
        assert_eq!(config.providers.primary, ProviderKind::Voyage);
        assert_eq!(config.search.top_k, 5);
        assert!((config.search.score_threshold - 0.82).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_document_matches_defaults() {
        let config = Config::from_value(serde_json::json!({})).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_camel_case_fields() {
        let value = Config::default().to_value();
        assert_eq!(value["qdrant"]["collectionName"], DEFAULT_COLLECTION);
        assert_eq!(value["search"]["minTokensForRerank"], 100);
        assert_eq!(value["providers"]["primary"], "voyage");
    }

    #[test]
    fn test_wrong_type_rejected() {
        let err = Config::from_value(serde_json::json!({"search": {"topK": "five"}}));
        assert!(matches!(err, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let err = Config::from_value(serde_json::json!({"providers": {"primary": "openai"}}));
        assert!(matches!(err, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let err = Config::from_value(serde_json::json!({"search": {"scoreThreshold": 1.5}}));
        assert!(matches!(err, Err(ConfigError::Validation(_))));

        let err = Config::from_value(serde_json::json!({"search": {"topK": 0}}));
        assert!(matches!(err, Err(ConfigError::Validation(_))));

        let err = Config::from_value(serde_json::json!({"cost": {"threshold": -1.0}}));
        assert!(matches!(err, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(
            "Mistral".parse::<ProviderKind>().unwrap(),
            ProviderKind::Mistral
        );
        assert!("cohere".parse::<ProviderKind>().is_err());
        assert_eq!(ProviderKind::Voyage.to_string(), "voyage");
    }

    #[test]
    fn test_partial_rate_table_keeps_defaults() {
        let config = Config::from_value(
            serde_json::json!({"cost": {"embeddingCostPerMillion": {"voyage": 0.2}}}),
        )
        .unwrap();
        assert!((config.cost.embedding_cost_per_million.voyage - 0.2).abs() < f64::EPSILON);
        assert!((config.cost.embedding_cost_per_million.mistral - 0.15).abs() < f64::EPSILON);
    }
}
