mod config;
mod document;
mod filter;
mod log_entry;
mod search;

pub use config::{
    Config, CostConfig, DEFAULT_COLLECTION, DEFAULT_QDRANT_URL, DEFAULT_USER_ID,
    DEFAULT_VECTOR_SIZE, EmbeddingRates, FiltersConfig, LoggingConfig, MistralConfig,
    ProviderKind, ProvidersConfig, QdrantConfig, RerankRates, SearchConfig, SystemConfig,
    VoyageConfig,
};
pub use document::Document;
pub use filter::{
    CustomFilter, DateRange, FieldCondition, FilterOperator, FilterOptions, PayloadFilter,
    Predicate, WordCountRange,
};
pub use log_entry::{LogEntry, LogEvent, LogType};
pub use search::{CostEstimate, OutputFormat, SearchRequest, SearchResponse, SearchResult};
