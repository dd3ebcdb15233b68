pub mod config_store;
pub mod cost;
pub mod event_log;
pub mod fallback;
pub mod filter_builder;
pub mod provider;
pub mod search;
pub mod vector_store;

pub use config_store::ConfigStore;
pub use cost::{CostModel, estimate_tokens};
pub use event_log::{EventLog, LogSettings};
pub use fallback::FallbackMatcher;
pub use filter_builder::{build_payload_filter, build_payload_filter_at};
pub use provider::{EmbeddingProvider, create_provider};
pub use search::{ImportSummary, Retriever, SearchPipeline};
pub use vector_store::{QdrantIndex, RetrievalIndex, create_index};
