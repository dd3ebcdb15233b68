use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    Embedding, EmbeddingProvider, HttpTransport, NEUTRAL_RERANK_SCORE, Reranked, RerankedItem,
    require_key,
};
use crate::error::ProviderError;
use crate::models::{MistralConfig, ProviderKind};
use crate::services::cost::estimate_tokens;

/// Mistral embeddings. Mistral has no rerank endpoint, so `rerank` returns a neutral
/// ranking in input order.
pub struct MistralProvider {
    api_key: Option<String>,
    embedding_model: String,
    base_url: String,
    transport: HttpTransport,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
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
    prompt_tokens: Option<u64>,
    total_tokens: Option<u64>,
}

impl MistralProvider {
    pub(crate) fn new(config: &MistralConfig, transport: HttpTransport) -> Self {
        Self {
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            transport,
        }
    }

    fn key(&self) -> Result<&str, ProviderError> {
        require_key(ProviderKind::Mistral, self.api_key.as_deref())
    }
}

#[async_trait]
impl EmbeddingProvider for MistralProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Mistral
    }

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError> {
        let key = self.key()?;
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: [text],
        };

        let response: EmbedResponse = self.transport.post_json(&url, key, &request).await?;
        let vector = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: ProviderKind::Mistral,
                message: "response contained no embedding".to_string(),
            })?;

        let tokens = response
            .usage
            .prompt_tokens
            .or(response.usage.total_tokens)
            .unwrap_or_else(|| estimate_tokens(text));

        Ok(Embedding { vector, tokens })
    }

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Reranked, ProviderError> {
        self.key()?;

        let items = documents
            .iter()
            .enumerate()
            .map(|(index, content)| RerankedItem::new(index, NEUTRAL_RERANK_SCORE, content.clone()))
            .collect();

        let joined = documents.join(" ");
        let tokens = estimate_tokens(query) + estimate_tokens(&joined);

        Ok(Reranked { items, tokens })
    }
}
