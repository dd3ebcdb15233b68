use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, Embedding, HttpTransport, Reranked, RerankedItem, require_key};
use crate::error::ProviderError;
use crate::models::{ProviderKind, VoyageConfig};
use crate::services::cost::estimate_tokens;

/// Voyage AI embeddings with native reranking.
pub struct VoyageProvider {
    api_key: Option<String>,
    embedding_model: String,
    rerank_model: String,
    base_url: String,
    transport: HttpTransport,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Deserialize, Default)]
struct Usage {
    total_tokens: Option<u64>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [String],
    model: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    #[serde(alias = "results")]
    data: Vec<RerankData>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct RerankData {
    index: usize,
    relevance_score: f64,
}

impl VoyageProvider {
    pub(crate) fn new(config: &VoyageConfig, transport: HttpTransport) -> Self {
        Self {
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            rerank_model: config.rerank_model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        require_key(ProviderKind::Voyage, self.api_key.as_deref())
    }
}

#[async_trait]
impl EmbeddingProvider for VoyageProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Voyage
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        let key = self.key()?;
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbedRequest {
            input: text,
            model: &self.embedding_model,
        };

        let response: EmbedResponse = self.transport.post_json(&url, key, &request).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: ProviderKind::Voyage,
                message: "response contained no embedding".to_string(),
            })?;

        Ok(Embedding {
            vector,
            tokens: response
                .usage
                .total_tokens
                .unwrap_or_else(|| estimate_tokens(text)),
        })
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Reranked, ProviderError> {
        let key = self.key()?;
        if documents.is_empty() {
            return Ok(Reranked {
                items: Vec::new(),
                tokens: 0,
            });
        }

        let url = format!("{}/rerank", self.base_url);
        let request = RerankRequest {
            query,
            documents,
            model: &self.rerank_model,
            top_k: documents.len(),
        };

        let response: RerankResponse = self.transport.post_json(&url, key, &request).await?;

        let mut items = Vec::with_capacity(response.data.len());
        for entry in response.data {
            let content = documents
                .get(entry.index)
                .ok_or_else(|| ProviderError::InvalidResponse {
                    provider: ProviderKind::Voyage,
                    message: format!("rerank index {} out of range", entry.index),
                })?;
            items.push(RerankedItem::new(
                entry.index,
                entry.relevance_score,
                content.clone(),
            ));
        }
        items.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(Reranked {
            items,
            tokens: response
                .usage
                .total_tokens
                .unwrap_or_else(|| estimate_tokens(query)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::models::ProvidersConfig;
    use crate::services::provider::test_support::serve;
    use crate::utils::retry::RetryConfig;

    fn provider(base_url: &str, api_key: Option<&str>) -> VoyageProvider {
        let config = VoyageConfig {
            api_key: api_key.map(String::from),
            base_url: base_url.to_string(),
            ..Default::default()
        };
        let transport = HttpTransport::new(ProviderKind::Voyage, &ProvidersConfig::default())
            .unwrap()
            .with_retry(RetryConfig::new(3).with_initial_delay(Duration::from_millis(1)));
        VoyageProvider::new(&config, transport)
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let server = serve(vec![(200, "{}".into())]).await;
        let voyage = provider(&server.base_url, None);

        let err = voyage.embed("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
        let err = voyage.rerank("q", &["a".into()]).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { .. }));
        assert_eq!(server.hits(), 0);
    }

    #[tokio::test]
    async fn test_embed_parses_vector_and_usage() {
        let body = r#"{"data":[{"embedding":[0.1,0.2,0.3],"index":0}],"usage":{"total_tokens":7}}"#;
        let server = serve(vec![(200, body.into())]).await;
        let voyage = provider(&format!("{}/", server.base_url), Some("key"));

        let embedding = voyage.embed("refund policy").await.unwrap();
        assert_eq!(embedding.vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedding.tokens, 7);

        let sent: serde_json::Value =
            serde_json::from_str(&server.bodies.lock().await[0]).unwrap();
        assert_eq!(sent["input"], "refund policy");
        assert_eq!(sent["model"], "voyage-large-2");
    }

    #[tokio::test]
    async fn test_embed_rejects_empty_data() {
        let server = serve(vec![(200, r#"{"data":[]}"#.into())]).await;
        let voyage = provider(&server.base_url, Some("key"));

        let err = voyage.embed("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_upstream_error_not_retried() {
        let server = serve(vec![(401, r#"{"detail":"bad key"}"#.into())]).await;
        let voyage = provider(&server.base_url, Some("key"));

        let err = voyage.embed("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::Upstream { .. }));
        assert!(err.to_string().contains("401"));
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let ok = r#"{"data":[{"embedding":[1.0]}],"usage":{"total_tokens":1}}"#;
        let server = serve(vec![(503, "{}".into()), (200, ok.into())]).await;
        let voyage = provider(&server.base_url, Some("key"));

        let embedding = voyage.embed("x").await.unwrap();
        assert_eq!(embedding.vector, vec![1.0]);
        assert_eq!(server.hits(), 2);
    }

    #[tokio::test]
    async fn test_rerank_orders_by_score_and_keeps_index() {
        let body = r#"{"data":[{"index":0,"relevance_score":0.2},{"index":1,"relevance_score":0.9}]}"#;
        let server = serve(vec![(200, body.into())]).await;
        let voyage = provider(&server.base_url, Some("key"));

        let docs = vec!["first".to_string(), "second".to_string()];
        let reranked = voyage.rerank("refund policy", &docs).await.unwrap();

        assert_eq!(reranked.items.len(), 2);
        assert_eq!(reranked.items[0].index, 1);
        assert_eq!(reranked.items[0].id, "doc_1");
        assert_eq!(reranked.items[0].content, "second");
        assert_eq!(reranked.tokens, estimate_tokens("refund policy"));
    }

    #[tokio::test]
    async fn test_rerank_accepts_results_field() {
        let body = r#"{"results":[{"index":0,"relevance_score":0.4}],"usage":{"total_tokens":12}}"#;
        let server = serve(vec![(200, body.into())]).await;
        let voyage = provider(&server.base_url, Some("key"));

        let reranked = voyage.rerank("q", &["only".to_string()]).await.unwrap();
        assert_eq!(reranked.items[0].score, 0.4);
        assert_eq!(reranked.tokens, 12);
    }

    #[tokio::test]
    async fn test_rerank_out_of_range_index() {
        let body = r#"{"data":[{"index":5,"relevance_score":0.4}]}"#;
        let server = serve(vec![(200, body.into())]).await;
        let voyage = provider(&server.base_url, Some("key"));

        let err = voyage.rerank("q", &["only".to_string()]).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse { .. }));
    }
}
