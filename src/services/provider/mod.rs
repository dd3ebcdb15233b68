//! Embedding and rerank providers.
//!
//! Each provider variant owns its credential and request shaping. The variant is chosen
//! once by [`create_provider`]; switching providers means building a new one.

mod mistral;
mod voyage;

pub use mistral::MistralProvider;
pub use voyage::VoyageProvider;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::ProviderError;
use crate::models::{ProviderKind, ProvidersConfig};
use crate::utils::retry::{RetryConfig, with_retry};

/// Score assigned by providers without native reranking.
pub const NEUTRAL_RERANK_SCORE: f64 = 0.5;

/// Embedding vector plus the tokens billed for it.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub tokens: u64,
}

/// One reranked document. `index` points into the documents passed to `rerank`.
#[derive(Debug, Clone, PartialEq)]
pub struct RerankedItem {
    pub index: usize,
    pub id: String,
    pub score: f64,
    pub content: String,
}

impl RerankedItem {
    pub fn new(index: usize, score: f64, content: impl Into<String>) -> Self {
        Self {
            index,
            id: format!("doc_{index}"),
            score,
            content: content.into(),
        }
    }
}

/// Reranked documents, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct Reranked {
    pub items: Vec<RerankedItem>,
    pub tokens: u64,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn embed(&self, text: &str) -> Result<Embedding, ProviderError>;

    async fn rerank(&self, query: &str, documents: &[String]) -> Result<Reranked, ProviderError>;
}

/// Build the provider selected by `providers.primary`.
pub fn create_provider(
    config: &ProvidersConfig,
) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let transport = HttpTransport::new(config.primary, config)?;
    let provider: Arc<dyn EmbeddingProvider> = match config.primary {
        ProviderKind::Voyage => Arc::new(VoyageProvider::new(&config.voyage, transport)),
        ProviderKind::Mistral => Arc::new(MistralProvider::new(&config.mistral, transport)),
    };
    Ok(provider)
}

/// JSON-over-HTTP transport shared by the provider variants.
///
/// Requests carry a bounded timeout and transient failures are retried here, so the
/// search pipeline never retries on its own.
#[derive(Debug, Clone)]
pub(crate) struct HttpTransport {
    client: Client,
    provider: ProviderKind,
    retry: RetryConfig,
}

impl HttpTransport {
    pub(crate) fn new(
        provider: ProviderKind,
        config: &ProvidersConfig,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Connection {
                provider,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            provider,
            retry: RetryConfig::new(config.max_retries),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) async fn post_json<B, R>(
        &self,
        url: &str,
        api_key: &str,
        body: &B,
    ) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        with_retry(&self.retry, || self.post_once(url, api_key, body)).await
    }

    async fn post_once<B, R>(&self, url: &str, api_key: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let provider = self.provider;
        let response = self
            .client
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout { provider }
                } else {
                    ProviderError::Connection {
                        provider,
                        message: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream {
                provider,
                message: format!("status {}: {}", status.as_u16(), body),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                provider,
                message: e.to_string(),
            })
    }
}

/// Credentials are checked before any request is built.
pub(crate) fn require_key(
    provider: ProviderKind,
    api_key: Option<&str>,
) -> Result<&str, ProviderError> {
    api_key
        .filter(|k| !k.trim().is_empty())
        .ok_or(ProviderError::MissingCredential { provider })
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Minimal HTTP responder for exercising providers without the network.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    pub struct MockServer {
        pub base_url: String,
        pub hits: Arc<AtomicUsize>,
        pub bodies: Arc<tokio::sync::Mutex<Vec<String>>>,
    }

    impl MockServer {
        pub fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    /// Serve the given `(status, body)` responses in order, one per connection.
    /// The last response repeats once the list is exhausted.
    pub async fn serve(responses: Vec<(u16, String)>) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let bodies = Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let task_hits = Arc::clone(&hits);
        let task_bodies = Arc::clone(&bodies);
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let n = task_hits.fetch_add(1, Ordering::SeqCst);
                let (status, body) = responses
                    .get(n)
                    .or_else(|| responses.last())
                    .cloned()
                    .unwrap_or((500, String::new()));

                let request_body = read_request(&mut stream).await;
                task_bodies.lock().await.push(request_body);

                let reply = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        MockServer {
            base_url: format!("http://{addr}"),
            hits,
            bodies,
        }
    }

    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];

        loop {
            let Ok(n) = stream.read(&mut chunk).await else {
                break;
            };
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let text = String::from_utf8_lossy(&buf);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text[..header_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if buf.len() >= header_end + 4 + content_length {
                    return String::from_utf8_lossy(&buf[header_end + 4..]).into_owned();
                }
            }
        }

        String::new()
    }
}
