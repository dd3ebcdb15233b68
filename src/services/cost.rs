//! Token and dollar cost estimation for embedding and rerank calls.

use std::collections::HashMap;

use crate::models::{Config, CostEstimate, ProviderKind};

pub const FALLBACK_EMBEDDING_COST_PER_MILLION: f64 = 0.10;
pub const FALLBACK_RERANK_COST_PER_THOUSAND: f64 = 1.00;

/// Stateless once built: all inputs come from the config snapshot at construction.
#[derive(Debug, Clone)]
pub struct CostModel {
    embedding_cost_per_million: HashMap<ProviderKind, f64>,
    rerank_cost_per_thousand: HashMap<ProviderKind, f64>,
    provider: ProviderKind,
    min_tokens_for_rerank: u32,
    threshold: f64,
}

impl CostModel {
    pub fn new(
        embedding_cost_per_million: HashMap<ProviderKind, f64>,
        rerank_cost_per_thousand: HashMap<ProviderKind, f64>,
        provider: ProviderKind,
        min_tokens_for_rerank: u32,
    ) -> Self {
        Self {
            embedding_cost_per_million,
            rerank_cost_per_thousand,
            provider,
            min_tokens_for_rerank,
            threshold: f64::INFINITY,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let embedding = &config.cost.embedding_cost_per_million;
        let rerank = &config.cost.rerank_cost_per_thousand;

        Self {
            embedding_cost_per_million: HashMap::from([
                (ProviderKind::Voyage, embedding.voyage),
                (ProviderKind::Mistral, embedding.mistral),
            ]),
            rerank_cost_per_thousand: HashMap::from([
                (ProviderKind::Voyage, rerank.voyage),
                (ProviderKind::Mistral, rerank.mistral),
            ]),
            provider: config.providers.primary,
            min_tokens_for_rerank: config.search.min_tokens_for_rerank,
            threshold: config.cost.threshold,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// Token floor used to price every rerank call.
    pub fn min_tokens_for_rerank(&self) -> u32 {
        self.min_tokens_for_rerank
    }

    /// Coarse heuristic: one token per four characters, rounded up.
    pub fn estimate_tokens(&self, text: &str) -> u64 {
        estimate_tokens(text)
    }

    pub fn embedding_cost(&self, tokens: u64) -> f64 {
        let per_million = self
            .embedding_cost_per_million
            .get(&self.provider)
            .copied()
            .unwrap_or(FALLBACK_EMBEDDING_COST_PER_MILLION);
        (tokens as f64 / 1_000_000.0) * per_million
    }

    pub fn rerank_cost(&self, tokens: u64) -> f64 {
        let per_thousand = self
            .rerank_cost_per_thousand
            .get(&self.provider)
            .copied()
            .unwrap_or(FALLBACK_RERANK_COST_PER_THOUSAND);
        (tokens as f64 / 1_000.0) * per_thousand
    }

    /// Rerank priced at the token floor rather than the real payload size.
    pub fn rerank_floor_cost(&self) -> f64 {
        self.rerank_cost(u64::from(self.min_tokens_for_rerank))
    }

    pub fn estimate(&self, query: &str, use_rerank: bool) -> CostEstimate {
        let embedding_tokens = self.estimate_tokens(query);
        let embedding_cost = self.embedding_cost(embedding_tokens);
        let rerank_cost = if use_rerank {
            self.rerank_floor_cost()
        } else {
            0.0
        };

        CostEstimate {
            embedding_tokens,
            embedding_cost,
            rerank_cost,
            total_cost: embedding_cost + rerank_cost,
            provider: self.provider,
        }
    }

    pub fn exceeds_threshold(&self, cost: f64) -> bool {
        cost > self.threshold
    }
}

pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(provider: ProviderKind) -> CostModel {
        CostModel::from_config(&Config {
            providers: crate::models::ProvidersConfig {
                primary: provider,
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("refund policy"), 4);
    }

    #[test]
    fn test_embedding_cost_uses_provider_rate() {
        let voyage = model(ProviderKind::Voyage);
        assert!((voyage.embedding_cost(1_000_000) - 0.10).abs() < 1e-12);

        let mistral = model(ProviderKind::Mistral);
        assert!((mistral.embedding_cost(1_000_000) - 0.15).abs() < 1e-12);
        assert!((mistral.rerank_cost(1_000) - 0.80).abs() < 1e-12);
    }

    #[test]
    fn test_missing_provider_falls_back() {
        let model = CostModel::new(HashMap::new(), HashMap::new(), ProviderKind::Mistral, 100);
        assert!((model.embedding_cost(1_000_000) - FALLBACK_EMBEDDING_COST_PER_MILLION).abs() < 1e-12);
        assert!((model.rerank_cost(1_000) - FALLBACK_RERANK_COST_PER_THOUSAND).abs() < 1e-12);
    }

    #[test]
    fn test_costs_monotonic() {
        let model = model(ProviderKind::Voyage);
        let mut previous = (0.0, 0.0);
        for tokens in [0u64, 1, 7, 100, 4_096, 1_000_000, 50_000_000] {
            let current = (model.embedding_cost(tokens), model.rerank_cost(tokens));
            assert!(current.0 >= previous.0);
            assert!(current.1 >= previous.1);
            previous = current;
        }
    }

    #[test]
    fn test_estimate_total_is_sum() {
        for provider in [ProviderKind::Voyage, ProviderKind::Mistral] {
            let model = model(provider);
            for use_rerank in [true, false] {
                let estimate = model.estimate("what is the refund policy?", use_rerank);
                assert_eq!(
                    estimate.total_cost,
                    estimate.embedding_cost + estimate.rerank_cost
                );
                assert_eq!(estimate.provider, provider);
            }
        }
    }

    #[test]
    fn test_rerank_priced_at_floor() {
        let model = model(ProviderKind::Voyage);
        let estimate = model.estimate("short", true);
        assert!((estimate.rerank_cost - 0.1).abs() < 1e-12);
        assert_eq!(model.estimate("short", false).rerank_cost, 0.0);
    }

    #[test]
    fn test_threshold() {
        let model = model(ProviderKind::Voyage);
        assert!(!model.exceeds_threshold(0.01));
        assert!(model.exceeds_threshold(0.06));
    }
}
