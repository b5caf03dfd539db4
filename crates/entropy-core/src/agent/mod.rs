//! Tool-using agent loop.
//!
//! An LLM-driven planner whose proposed actions are executed by a
//! step interpreter: each step is a tool call against the `ToolBelt`
//! rather than a fixed workflow-step enum.

use chrono::Utc;
use serde_json::Value;

use crate::data::{Turn, ToolInvocation};
use crate::llm::{ChatMessage, LLMClient};
use crate::tools::{ToolBelt, ToolName};

/// Default step budget.
pub const N_MAX_STEPS: u32 = 6;

/// The three agent kinds share one loop and differ only in
/// configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    Generalist,
    MarketSpecialist,
    NewsSpecialist,
}

impl AgentKind {
    pub fn temperature(self) -> f64 {
        match self {
            Self::Generalist => 0.4,
            Self::MarketSpecialist => 0.1,
            Self::NewsSpecialist => 0.6,
        }
    }

    pub fn cache_system_prompt(self) -> bool {
        matches!(self, Self::Generalist)
    }

    pub fn tools(self) -> &'static [ToolName] {
        match self {
            Self::Generalist => ToolName::for_generalist(),
            Self::MarketSpecialist => ToolName::for_market_specialist(),
            Self::NewsSpecialist => ToolName::for_news_specialist(),
        }
    }

    pub fn model<'a>(self, config: &'a crate::config::LLMServiceConfig) -> &'a str {
        match self {
            Self::Generalist => &config.cheap_model,
            Self::NewsSpecialist => &config.mid_model,
            Self::MarketSpecialist => &config.expensive_model,
        }
    }
}

/// Outcome of running an agent to completion (final text + the tool
/// turns it produced along the way + total cost).
pub struct AgentRun {
    pub text: String,
    pub tool_turns: Vec<Turn>,
    pub cost: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub step_budget_exceeded: bool,
}

/// Runs one configured agent loop to completion.
pub struct Agent<'a> {
    client: &'a LLMClient,
    toolbelt: &'a ToolBelt,
    kind: AgentKind,
    model: String,
}

impl<'a> Agent<'a> {
    pub fn new(client: &'a LLMClient, toolbelt: &'a ToolBelt, kind: AgentKind, model: impl Into<String>) -> Self {
        Self {
            client,
            toolbelt,
            kind,
            model: model.into(),
        }
    }

    pub async fn run(&self, system_prompt: &str, mut messages: Vec<ChatMessage>) -> AgentRun {
        let tool_schemas: Vec<(String, Value)> = self
            .kind
            .tools()
            .iter()
            .map(|t| (t.as_str().to_string(), ToolBelt::schema_for(*t)))
            .collect();

        let mut tool_turns = Vec::new();
        let mut total_cost = 0.0;
        let mut total_tokens_in = 0;
        let mut total_tokens_out = 0;
        let mut last_text = String::new();

        for step in 0..N_MAX_STEPS {
            let outcome = match self
                .client
                .call(
                    system_prompt,
                    &messages,
                    &self.model,
                    self.kind.temperature(),
                    &tool_schemas,
                    self.kind.cache_system_prompt(),
                )
                .await
            {
                Ok(o) => o,
                Err(_) => {
                    // Upstream unavailable: the agent never
                    // raises; it surfaces a message turn and stops.
                    last_text = "the analysis service is temporarily unavailable".to_string();
                    break;
                }
            };

            total_cost += outcome.cost;
            total_tokens_in += outcome.tokens_in;
            total_tokens_out += outcome.tokens_out;
            last_text = outcome.text.clone();

            if outcome.tool_calls.is_empty() {
                return AgentRun {
                    text: last_text,
                    tool_turns,
                    cost: total_cost,
                    tokens_in: total_tokens_in,
                    tokens_out: total_tokens_out,
                    step_budget_exceeded: false,
                };
            }

            messages.push(ChatMessage::assistant(outcome.text));

            for call in outcome.tool_calls {
                let Some(tool_name) = self.kind.tools().iter().copied().find(|t| t.as_str() == call.name) else {
                    continue;
                };
                let result = self.toolbelt.call(tool_name, call.arguments.clone()).await;
                let turn = Turn::tool(
                    ToolInvocation {
                        tool_name: result.tool_name.clone(),
                        arguments: result.arguments.clone(),
                        result: result.result.clone(),
                    },
                    Utc::now(),
                );
                tool_turns.push(turn);
                messages.push(ChatMessage::user(format!(
                    "tool result for {}: {}",
                    result.tool_name, result.result
                )));
            }

            if step + 1 == N_MAX_STEPS {
                // Step budget exceeded: synthesize a
                // note and return the last produced text.
                return AgentRun {
                    text: format!("{last_text}\n\n(step budget exceeded)"),
                    tool_turns,
                    cost: total_cost,
                    tokens_in: total_tokens_in,
                    tokens_out: total_tokens_out,
                    step_budget_exceeded: true,
                };
            }
        }

        AgentRun {
            text: last_text,
            tool_turns,
            cost: total_cost,
            tokens_in: total_tokens_in,
            tokens_out: total_tokens_out,
            step_budget_exceeded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LLMServiceConfig, RetrievalConfig};
    use crate::llm::provider::{LLMProvider, ProposedToolCall, ProviderResponse, TokenUsage};
    use crate::market::quotes::StubQuotesSource;
    use crate::market::MarketDataTools;
    use crate::retrieval::{HashingEmbedder, LexicalIndex, SemanticIndex};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn toolbelt() -> ToolBelt {
        ToolBelt::new(
            Arc::new(LexicalIndex::empty()),
            Arc::new(SemanticIndex::empty()),
            RetrievalConfig::default(),
            Arc::new(HashingEmbedder),
            Arc::new(MarketDataTools::new(Arc::new(StubQuotesSource::new(HashMap::new())))),
        )
    }

    struct ScriptedProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
            _model: &str,
            _temperature: f64,
            _tools: &[(String, Value)],
            _cache_system_prompt: bool,
        ) -> crate::error::Result<ProviderResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Ok(ProviderResponse {
                    text: "let me check the price".into(),
                    tool_calls: vec![ProposedToolCall {
                        name: "get_price".into(),
                        arguments: serde_json::json!({"ticker": "AAPL"}),
                    }],
                    usage: TokenUsage { input_tokens: 100, output_tokens: 20 },
                })
            } else {
                Ok(ProviderResponse {
                    text: "AAPL is trading flat today".into(),
                    tool_calls: vec![],
                    usage: TokenUsage { input_tokens: 120, output_tokens: 30 },
                })
            }
        }
    }

    struct LoopingProvider;

    #[async_trait]
    impl LLMProvider for LoopingProvider {
        async fn complete(
            &self,
            _system: &str,
            _messages: &[ChatMessage],
            _model: &str,
            _temperature: f64,
            _tools: &[(String, Value)],
            _cache_system_prompt: bool,
        ) -> crate::error::Result<ProviderResponse> {
            Ok(ProviderResponse {
                text: "still thinking".into(),
                tool_calls: vec![ProposedToolCall {
                    name: "get_price".into(),
                    arguments: serde_json::json!({"ticker": "AAPL"}),
                }],
                usage: TokenUsage { input_tokens: 10, output_tokens: 5 },
            })
        }
    }

    #[tokio::test]
    async fn completes_after_tool_round() {
        let provider = Arc::new(ScriptedProvider { calls: AtomicUsize::new(0) });
        let client = LLMClient::new(provider, LLMServiceConfig::default());
        let belt = toolbelt();
        let agent = Agent::new(&client, &belt, AgentKind::Generalist, "claude-haiku");

        let run = agent.run("be helpful", vec![ChatMessage::user("AAPL price?")]).await;
        assert_eq!(run.text, "AAPL is trading flat today");
        assert_eq!(run.tool_turns.len(), 1);
        assert!(!run.step_budget_exceeded);
        assert!(run.cost > 0.0);
    }

    #[tokio::test]
    async fn step_budget_is_enforced() {
        let provider = Arc::new(LoopingProvider);
        let client = LLMClient::new(provider, LLMServiceConfig::default());
        let belt = toolbelt();
        let agent = Agent::new(&client, &belt, AgentKind::MarketSpecialist, "claude-opus");

        let run = agent.run("be thorough", vec![ChatMessage::user("dig deeper")]).await;
        assert!(run.step_budget_exceeded);
        assert!(run.text.contains("step budget exceeded"));
        assert_eq!(run.tool_turns.len() as u32, N_MAX_STEPS);
    }
}
