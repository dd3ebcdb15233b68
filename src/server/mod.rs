//! Tool-call surface over the search pipeline.
//!
//! Every tool returns a JSON value; failures come back as `{"error": message}` rather than
//! as an `Err`, so a transport can forward any outcome unchanged.

pub mod protocol;
pub mod tools;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::RwLock;

use crate::error::AppError;
use crate::models::{
    Config, CostEstimate, Document, FilterOptions, LogEvent, LogType, SearchRequest,
};
use crate::services::{
    ConfigStore, EmbeddingProvider, EventLog, FallbackMatcher, Retriever, SearchPipeline,
    create_index, create_provider,
};

pub use protocol::{Request, Response, serve_lines, serve_stdio};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchDocumentsArgs {
    query: String,
    top_k: Option<u32>,
    score_threshold: Option<f64>,
    use_rerank: Option<bool>,
    #[serde(default)]
    estimate_only: bool,
    #[serde(default)]
    filters: Option<FilterOptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EstimateCostArgs {
    query: String,
    use_rerank: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct UpdateConfigArgs {
    updates: Value,
}

#[derive(Debug, Deserialize)]
struct ImportDocumentsArgs {
    documents: Vec<Document>,
}

pub struct KnowledgeServer {
    config: Arc<ConfigStore>,
    pipeline: RwLock<Arc<SearchPipeline>>,
    log: EventLog,
    fallback: Arc<FallbackMatcher>,
}

impl KnowledgeServer {
    /// Build provider and index from the current configuration snapshot.
    pub fn new(config: Arc<ConfigStore>, log: EventLog) -> Result<Self, AppError> {
        let snapshot = config.snapshot();
        let fallback = Arc::new(FallbackMatcher::new());
        let provider = create_provider(&snapshot.providers)?;
        let retriever = build_retriever(&snapshot, &fallback)?;

        Ok(Self::with_parts(config, provider, retriever, log, fallback))
    }

    /// Assemble a server from pre-built parts.
    pub fn with_parts(
        config: Arc<ConfigStore>,
        provider: Arc<dyn EmbeddingProvider>,
        retriever: Retriever,
        log: EventLog,
        fallback: Arc<FallbackMatcher>,
    ) -> Self {
        let snapshot = config.snapshot();
        let pipeline = SearchPipeline::new(provider, retriever, &snapshot, log.clone());

        Self {
            config,
            pipeline: RwLock::new(Arc::new(pipeline)),
            log,
            fallback,
        }
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn config_handle(&self) -> Arc<ConfigStore> {
        Arc::clone(&self.config)
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// The pipeline for the current configuration. Callers keep the snapshot they got
    /// even if the configuration changes mid-request.
    pub async fn pipeline(&self) -> Arc<SearchPipeline> {
        Arc::clone(&*self.pipeline.read().await)
    }

    pub fn resolve_user<'a>(&self, user_id: Option<&'a str>, config: &'a Config) -> &'a str {
        user_id
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(config.system.default_user_id.as_str())
    }

    pub fn log_server_start(&self) {
        let snapshot = self.config.snapshot();
        self.log.log(
            LogEvent::new(&snapshot.system.default_user_id, LogType::System)
                .method("server_start")
                .metadata(json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "provider": snapshot.providers.primary,
                    "collection": snapshot.qdrant.collection_name,
                })),
        );
    }

    /// Create the vector collection if it is missing. A no-op in fallback mode.
    pub async fn ensure_index(&self, recreate: bool) -> Result<(), AppError> {
        let snapshot = self.config.snapshot();
        let pipeline = self.pipeline().await;
        if let Some(index) = pipeline.retriever().index() {
            index
                .initialize(snapshot.qdrant.vector_size, recreate)
                .await?;
            tracing::debug!(collection = index.collection(), recreate, "index ready");
        }
        Ok(())
    }

    pub fn list_tools(&self) -> Value {
        tools::descriptors()
    }

    /// Dispatch a tool call. Never fails; errors are returned as `{"error": ...}`.
    pub async fn call_tool(&self, name: &str, arguments: Value, user_id: Option<&str>) -> Value {
        let snapshot = self.config.snapshot();
        let user = self.resolve_user(user_id, &snapshot);

        let outcome = match name {
            tools::SEARCH_DOCUMENTS => self.search_documents(user, &snapshot, arguments).await,
            tools::ESTIMATE_COST => self.estimate_cost(user, &snapshot, arguments).await,
            tools::GET_CONFIG => Ok(snapshot.to_value()),
            tools::UPDATE_CONFIG => self.update_config(user, arguments).await,
            tools::IMPORT_DOCUMENTS => self.import_documents(user, arguments).await,
            other => Err(AppError::UnknownTool(other.to_string())),
        };

        outcome.unwrap_or_else(|e| {
            tracing::warn!(tool = name, error = %e, "tool call failed");
            json!({ "error": e.to_string() })
        })
    }

    async fn search_documents(
        &self,
        user: &str,
        config: &Config,
        arguments: Value,
    ) -> Result<Value, AppError> {
        let args: SearchDocumentsArgs = parse_args(arguments)?;
        let pipeline = self.pipeline().await;

        if args.estimate_only {
            let use_rerank = args.use_rerank.unwrap_or(config.search.use_rerank);
            let mut payload =
                self.estimate_payload(user, config, &pipeline, &args.query, use_rerank)?;
            payload["estimateOnly"] = json!(true);
            return Ok(payload);
        }

        let mut request = SearchRequest::new(args.query, &config.search);
        if let Some(top_k) = args.top_k {
            request = request.with_top_k(top_k);
        }
        if let Some(threshold) = args.score_threshold {
            request = request.with_score_threshold(threshold);
        }
        if let Some(use_rerank) = args.use_rerank {
            request = request.with_rerank(use_rerank);
        }
        if let Some(filters) = args.filters {
            request = request.with_filters(filters);
        }

        let response = pipeline.search(user, &request).await?;
        Ok(serde_json::to_value(response).unwrap_or(Value::Null))
    }

    async fn estimate_cost(
        &self,
        user: &str,
        config: &Config,
        arguments: Value,
    ) -> Result<Value, AppError> {
        let args: EstimateCostArgs = parse_args(arguments)?;
        let pipeline = self.pipeline().await;
        let use_rerank = args.use_rerank.unwrap_or(true);
        self.estimate_payload(user, config, &pipeline, &args.query, use_rerank)
    }

    fn estimate_payload(
        &self,
        user: &str,
        config: &Config,
        pipeline: &SearchPipeline,
        query: &str,
        use_rerank: bool,
    ) -> Result<Value, AppError> {
        if !config.system.enable_cost_estimation {
            return Err(AppError::Other("cost estimation is disabled".to_string()));
        }
        Ok(estimate_json(&pipeline.estimate(user, query, use_rerank)))
    }

    async fn update_config(&self, user: &str, arguments: Value) -> Result<Value, AppError> {
        let args: UpdateConfigArgs = parse_args(arguments)?;

        // Held until the new pipeline is in place, so updates apply one at a time and the
        // store never gets ahead of the pipeline.
        let mut slot = self.pipeline.write().await;
        let (next, pipeline) = self.config.try_update(args.updates, |current, candidate| {
            self.build_pipeline(current, candidate, &slot)
        })?;
        *slot = Arc::new(pipeline);
        drop(slot);

        tracing::info!(provider = %next.providers.primary, "pipeline rebuilt");
        self.log.log(
            LogEvent::new(user, LogType::System)
                .method("update_config")
                .result(json!({ "status": "success" })),
        );

        Ok(json!({
            "status": "success",
            "message": "Configuration updated",
            "config": next.to_value(),
        }))
    }

    /// Build the pipeline for a candidate snapshot. The index is rebuilt only when its own
    /// section changed.
    fn build_pipeline(
        &self,
        current: &Config,
        next: &Config,
        active: &SearchPipeline,
    ) -> Result<SearchPipeline, AppError> {
        let provider = create_provider(&next.providers)?;

        let index_unchanged = current.qdrant == next.qdrant
            && current.providers.timeout_secs == next.providers.timeout_secs;
        let retriever = if index_unchanged {
            active.retriever().clone()
        } else {
            build_retriever(next, &self.fallback)?
        };

        Ok(SearchPipeline::new(provider, retriever, next, self.log.clone()))
    }

    async fn import_documents(&self, user: &str, arguments: Value) -> Result<Value, AppError> {
        let args: ImportDocumentsArgs = parse_args(arguments)?;
        let pipeline = self.pipeline().await;
        let summary = pipeline.import_documents(user, args.documents).await?;
        Ok(serde_json::to_value(summary).unwrap_or(Value::Null))
    }
}

fn build_retriever(
    config: &Config,
    fallback: &Arc<FallbackMatcher>,
) -> Result<Retriever, AppError> {
    Ok(match create_index(config)? {
        Some(index) => Retriever::Index(index),
        None => {
            tracing::info!("vector index disabled, using keyword fallback");
            Retriever::Fallback(Arc::clone(fallback))
        }
    })
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> Result<T, AppError> {
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    serde_json::from_value(arguments).map_err(|e| AppError::InvalidArguments(e.to_string()))
}

/// Costs are rendered as fixed six-decimal strings.
pub fn estimate_json(estimate: &CostEstimate) -> Value {
    json!({
        "embeddingTokens": estimate.embedding_tokens,
        "embeddingCost": format!("{:.6}", estimate.embedding_cost),
        "rerankCost": format!("{:.6}", estimate.rerank_cost),
        "totalCost": format!("{:.6}", estimate.total_cost),
        "provider": estimate.provider,
    })
}
