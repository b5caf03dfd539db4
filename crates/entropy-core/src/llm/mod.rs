//! Provider call, prompt-prefix caching, token/cost accounting.

pub mod cache;
pub mod provider;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::config::LLMServiceConfig;
use crate::error::Result;

pub use cache::PromptCache;
pub use provider::{ChatMessage, HttpLLMProvider, LLMProvider, ProposedToolCall, ProviderResponse, TokenUsage};

/// Result of one `LLMClient::call`: the text, any proposed tool
/// calls, and the computed cost/token accounting.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub text: String,
    pub tool_calls: Vec<ProposedToolCall>,
    pub cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Bit representation trick to store an `f64` cumulative cost in an
/// `AtomicU64`.
#[derive(Debug, Default)]
struct AtomicCost(AtomicU64);

impl AtomicCost {
    fn add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let current_f = f64::from_bits(current);
            let new_f = current_f + delta;
            match self.0.compare_exchange_weak(
                current,
                new_f.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Wraps an `LLMProvider` with prompt-prefix caching and a
/// deterministic per-model cost table.
pub struct LLMClient {
    provider: Arc<dyn LLMProvider>,
    config: LLMServiceConfig,
    prompt_cache: PromptCache,
    cumulative_cost: AtomicCost,
}

impl LLMClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: LLMServiceConfig) -> Self {
        Self {
            provider,
            config,
            prompt_cache: PromptCache::new(),
            cumulative_cost: AtomicCost::default(),
        }
    }

    pub fn cumulative_cost(&self) -> f64 {
        self.cumulative_cost.load()
    }

    /// `call(system, messages, model, temperature, tools?)`. `cache_system_prompt` flags the leading system message
    /// as cacheable; a call on an already-warm prefix pays the
    /// discounted input-token rate.
    pub async fn call(
        &self,
        system: &str,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
        tools: &[(String, Value)],
        cache_system_prompt: bool,
    ) -> Result<CallOutcome> {
        let was_warm = cache_system_prompt && self.prompt_cache.is_warm(system);

        let response = self
            .provider
            .complete(system, messages, model, temperature, tools, cache_system_prompt)
            .await?;

        if cache_system_prompt {
            self.prompt_cache.mark_cacheable(system);
        }

        let cost = self.compute_cost(model, &response.usage, was_warm);
        self.cumulative_cost.add(cost);

        Ok(CallOutcome {
            text: response.text,
            tool_calls: response.tool_calls,
            cost,
            tokens_in: response.usage.input_tokens,
            tokens_out: response.usage.output_tokens,
        })
    }

    fn compute_cost(&self, model: &str, usage: &TokenUsage, prefix_was_warm: bool) -> f64 {
        let pricing = self.config.cost_for(model);
        let input_rate = if prefix_was_warm {
            pricing.input_per_token * self.config.prompt_cache_discount
        } else {
            pricing.input_per_token
        };
        usage.input_tokens as f64 * input_rate + usage.output_tokens as f64 * pricing.output_per_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProvider {
        usage: TokenUsage,
        text: String,
    }

    #[async_trait]
    impl LLMProvider for FixedProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
            _model: &str,
            _temperature: f64,
            _tools: &[(String, Value)],
            _cache_system_prompt: bool,
        ) -> Result<ProviderResponse> {
            Ok(ProviderResponse {
                text: self.text.clone(),
                tool_calls: Vec::new(),
                usage: self.usage,
            })
        }
    }

    #[tokio::test]
    async fn repeated_cacheable_call_is_cheaper() {
        let provider = Arc::new(FixedProvider {
            usage: TokenUsage { input_tokens: 1000, output_tokens: 100 },
            text: "hi".into(),
        });
        let config = LLMServiceConfig::default();
        let client = LLMClient::new(provider, config.clone());

        let first = client
            .call("system prompt", &[], &config.cheap_model, 0.4, &[], true)
            .await
            .unwrap();
        let second = client
            .call("system prompt", &[], &config.cheap_model, 0.4, &[], true)
            .await
            .unwrap();

        assert!(second.cost < first.cost);
    }

    #[tokio::test]
    async fn cost_accumulates_across_calls() {
        let provider = Arc::new(FixedProvider {
            usage: TokenUsage { input_tokens: 500, output_tokens: 50 },
            text: "hi".into(),
        });
        let config = LLMServiceConfig::default();
        let client = LLMClient::new(provider, config.clone());

        let a = client.call("s", &[], &config.cheap_model, 0.4, &[], false).await.unwrap();
        let b = client.call("s", &[], &config.cheap_model, 0.4, &[], false).await.unwrap();

        assert!((client.cumulative_cost() - (a.cost + b.cost)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn uncacheable_calls_never_discount() {
        let provider = Arc::new(FixedProvider {
            usage: TokenUsage { input_tokens: 1000, output_tokens: 100 },
            text: "hi".into(),
        });
        let config = LLMServiceConfig::default();
        let client = LLMClient::new(provider, config.clone());

        let first = client.call("s", &[], &config.cheap_model, 0.1, &[], false).await.unwrap();
        let second = client.call("s", &[], &config.cheap_model, 0.1, &[], false).await.unwrap();
        assert_eq!(first.cost, second.cost);
    }
}
