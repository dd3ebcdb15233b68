//! Query orchestration: embed, retrieve, rerank, threshold, account, log.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use super::cost::CostModel;
use super::event_log::EventLog;
use super::fallback::FallbackMatcher;
use super::filter_builder::{build_payload_filter, payload_match_conditions};
use super::provider::EmbeddingProvider;
use super::vector_store::RetrievalIndex;
use crate::error::{IndexError, SearchError};
use crate::models::{
    Config, CostEstimate, Document, FieldCondition, LogEvent, LogType, PayloadFilter,
    SearchRequest, SearchResponse, SearchResult,
};
use crate::utils::truncate_chars;

const REQUEST_QUERY_CHARS: usize = 200;
const ESTIMATE_QUERY_CHARS: usize = 50;

/// Where candidates come from.
#[derive(Clone)]
pub enum Retriever {
    Index(Arc<dyn RetrievalIndex>),
    /// Degraded mode when no vector index is configured.
    Fallback(Arc<FallbackMatcher>),
}

impl Retriever {
    pub fn index(&self) -> Option<&Arc<dyn RetrievalIndex>> {
        match self {
            Retriever::Index(index) => Some(index),
            Retriever::Fallback(_) => None,
        }
    }
}

/// Result of [`SearchPipeline::import_documents`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported: usize,
    pub tokens: u64,
    pub cost_estimate: f64,
}

/// One pipeline per configuration snapshot. Holds no per-query state, so a single
/// instance serves concurrent searches.
pub struct SearchPipeline {
    provider: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    cost: CostModel,
    log: EventLog,
    payload_conditions: Vec<FieldCondition>,
    batch_size: usize,
    log_search_queries: bool,
    log_cost_estimates: bool,
}

impl SearchPipeline {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        retriever: Retriever,
        config: &Config,
        log: EventLog,
    ) -> Self {
        Self {
            provider,
            retriever,
            cost: CostModel::from_config(config),
            log,
            payload_conditions: payload_match_conditions(&config.filters.payload).collect(),
            batch_size: (config.search.batch_size as usize).max(1),
            log_search_queries: config.logging.log_search_queries,
            log_cost_estimates: config.logging.log_cost_estimates,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub async fn search(
        &self,
        user_id: &str,
        request: &SearchRequest,
    ) -> Result<SearchResponse, SearchError> {
        if let Err(e) = validate_request(request) {
            self.log_error(user_id, "search", &e, "validate");
            return Err(e);
        }

        if self.log_search_queries {
            self.log.log(
                LogEvent::new(user_id, LogType::SearchRequest)
                    .method("search")
                    .params(json!({
                        "query": truncate_chars(&request.query, REQUEST_QUERY_CHARS),
                        "topK": request.top_k,
                        "scoreThreshold": request.score_threshold,
                        "useRerank": request.use_rerank,
                        "filters": request.filters,
                    })),
            );
        }

        let started = Instant::now();

        let embedding = match self.provider.embed(&request.query).await {
            Ok(embedding) => embedding,
            Err(e) => {
                let e = SearchError::from(e);
                self.log_error(user_id, "search", &e, "embed");
                return Err(e);
            }
        };

        let limit = u64::from(request.top_k) * 2;
        let candidates = match self.retrieve(request, embedding.vector, limit).await {
            Ok(candidates) => candidates,
            Err(e) => {
                let e = SearchError::from(e);
                self.log_error(user_id, "search", &e, "retrieve");
                return Err(e);
            }
        };

        let mut rerank_used = false;
        let ranked = if request.use_rerank && !candidates.is_empty() {
            match self.rerank(&request.query, candidates).await {
                Ok(reranked) => {
                    rerank_used = true;
                    reranked
                }
                Err(e) => {
                    self.log_error(user_id, "search", &e, "rerank");
                    return Err(e);
                }
            }
        } else {
            candidates
        };

        let results: Vec<SearchResult> = ranked
            .into_iter()
            .filter(|r| r.score >= request.score_threshold)
            .take(request.top_k as usize)
            .collect();

        let embedding_cost = self.cost.embedding_cost(embedding.tokens);
        let (rerank_cost, rerank_tokens) = if rerank_used {
            (
                self.cost.rerank_floor_cost(),
                u64::from(self.cost.min_tokens_for_rerank()),
            )
        } else {
            (0.0, 0)
        };
        let total_cost = embedding_cost + rerank_cost;
        let tokens = embedding.tokens + rerank_tokens;

        if self.cost.exceeds_threshold(total_cost) {
            tracing::warn!(cost = total_cost, "search cost exceeds configured threshold");
        }

        let response = SearchResponse::new(
            results,
            total_cost,
            tokens,
            rerank_used,
            self.provider.kind(),
        );

        let mut result = json!({ "resultCount": response.total });
        let mut event = LogEvent::new(user_id, LogType::SearchResult).method("search");
        if self.log_cost_estimates {
            result["costEstimate"] = json!(total_cost);
            result["tokens"] = json!(tokens);
            event = event.cost(total_cost, tokens);
        }
        self.log.log(event.result(result).metadata(json!({
            "embeddingProvider": self.provider.kind(),
            "rerankUsed": rerank_used,
            "processingTime": started.elapsed().as_millis() as u64,
        })));

        tracing::debug!(
            results = response.total,
            rerank_used,
            cost = total_cost,
            "search complete"
        );

        Ok(response)
    }

    async fn retrieve(
        &self,
        request: &SearchRequest,
        vector: Vec<f32>,
        limit: u64,
    ) -> Result<Vec<SearchResult>, IndexError> {
        match &self.retriever {
            Retriever::Index(index) => {
                let filter = self.compile_filter(request);
                index.search(vector, limit, filter.as_ref()).await
            }
            Retriever::Fallback(matcher) => {
                if !request.filters.is_empty() {
                    tracing::debug!("filters are not applied in fallback mode");
                }
                Ok(matcher.search(&request.query, limit as usize))
            }
        }
    }

    fn compile_filter(&self, request: &SearchRequest) -> Option<PayloadFilter> {
        let mut must = build_payload_filter(&request.filters)
            .map(|f| f.must)
            .unwrap_or_default();
        must.extend(self.payload_conditions.iter().cloned());

        if must.is_empty() {
            None
        } else {
            Some(PayloadFilter { must })
        }
    }

    /// Scores and order come from the reranker; id and metadata come from the candidate
    /// the reranked item points at.
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let documents: Vec<String> = candidates.iter().map(|c| c.content.clone()).collect();
        let reranked = self.provider.rerank(query, &documents).await?;

        let results = reranked
            .items
            .into_iter()
            .filter_map(|item| {
                let Some(candidate) = candidates.get(item.index) else {
                    tracing::warn!(index = item.index, "reranker returned unknown index");
                    return None;
                };
                Some(SearchResult {
                    id: candidate.id.clone(),
                    score: item.score,
                    content: item.content,
                    metadata: candidate.metadata.clone(),
                })
            })
            .collect();

        Ok(results)
    }

    /// Pre-flight estimate from query length alone.
    pub fn estimate(&self, user_id: &str, query: &str, use_rerank: bool) -> CostEstimate {
        let estimate = self.cost.estimate(query, use_rerank);

        self.log.log(
            LogEvent::new(user_id, LogType::System)
                .method("estimate_cost")
                .params(json!({
                    "query": truncate_chars(query, ESTIMATE_QUERY_CHARS),
                    "useRerank": use_rerank,
                }))
                .metadata(json!({
                    "embeddingTokens": estimate.embedding_tokens,
                    "embeddingCost": estimate.embedding_cost,
                    "rerankCost": estimate.rerank_cost,
                })),
        );

        estimate
    }

    /// Embed and store documents in batches of `search.batchSize`. Without an index the
    /// documents go to the fallback matcher unembedded.
    pub async fn import_documents(
        &self,
        user_id: &str,
        documents: Vec<Document>,
    ) -> Result<ImportSummary, SearchError> {
        let total = documents.len();
        let mut imported = 0;
        let mut tokens = 0u64;

        match &self.retriever {
            Retriever::Fallback(matcher) => {
                imported = total;
                matcher.add_documents(documents);
            }
            Retriever::Index(index) => {
                for (batch_no, batch) in documents.chunks(self.batch_size).enumerate() {
                    for document in batch {
                        let outcome = async {
                            let embedding = self.provider.embed(&document.content).await?;
                            index.upsert(document, embedding.vector).await?;
                            Ok::<u64, SearchError>(embedding.tokens)
                        }
                        .await;

                        match outcome {
                            Ok(used) => {
                                tokens += used;
                                imported += 1;
                            }
                            Err(e) => {
                                self.log_error(user_id, "import_documents", &e, &document.id);
                                return Err(e);
                            }
                        }
                    }
                    tracing::info!(batch = batch_no + 1, imported, total, "imported batch");
                }
            }
        }

        let cost_estimate = self.cost.embedding_cost(tokens);
        let mut event = LogEvent::new(user_id, LogType::DocumentImport)
            .method("import_documents")
            .result(json!({ "imported": imported }));
        if self.log_cost_estimates {
            event = event.cost(cost_estimate, tokens);
        }
        self.log.log(event);

        Ok(ImportSummary {
            imported,
            tokens,
            cost_estimate,
        })
    }

    fn log_error(&self, user_id: &str, method: &str, error: &SearchError, stage: &str) {
        tracing::error!(method, stage, error = %error, "request failed");
        self.log.log(
            LogEvent::new(user_id, LogType::Error)
                .method(method)
                .error(error.to_string())
                .stack(format!("{error:?}"))
                .metadata(json!({ "stage": stage })),
        );
    }
}

fn validate_request(request: &SearchRequest) -> Result<(), SearchError> {
    if request.query.trim().is_empty() {
        return Err(SearchError::InvalidQuery("query must not be empty".to_string()));
    }
    if request.top_k == 0 {
        return Err(SearchError::InvalidQuery("topK must be at least 1".to_string()));
    }
    if !(0.0..=1.0).contains(&request.score_threshold) {
        return Err(SearchError::InvalidQuery(format!(
            "scoreThreshold must be between 0 and 1, got {}",
            request.score_threshold
        )));
    }
    Ok(())
}
