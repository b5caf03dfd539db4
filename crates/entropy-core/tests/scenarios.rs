//! End-to-end scenarios for `Orchestrator::process_query`, seeded
//! with deterministic provider/quotes-source test doubles so no
//! network access is required.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use entropy_core::config::{Config, LLMServiceConfig, PoolConfig, RetrievalConfig};
use entropy_core::data::Bar;
use entropy_core::llm::provider::{LLMProvider, ProposedToolCall, ProviderResponse, TokenUsage};
use entropy_core::llm::{ChatMessage, LLMClient};
use entropy_core::market::quotes::StubQuotesSource;
use entropy_core::market::MarketDataTools;
use entropy_core::retrieval::{HashingEmbedder, LexicalIndex, SemanticIndex};
use entropy_core::{Document, Orchestrator, ToolBelt};
use serde_json::Value;

/// Emits a canned reply, optionally preceded by a single round of
/// tool calls on its first invocation.
struct ScriptedProvider {
    calls: AtomicUsize,
    first_tool_call: Option<(&'static str, Value)>,
    final_text: &'static str,
    delay: Duration,
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
    ) -> entropy_core::Result<ProviderResponse> {
        tokio::time::sleep(self.delay).await;
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            if let Some((name, args)) = &self.first_tool_call {
                return Ok(ProviderResponse {
                    text: "let me check".into(),
                    tool_calls: vec![ProposedToolCall { name: name.to_string(), arguments: args.clone() }],
                    usage: TokenUsage { input_tokens: 150, output_tokens: 30 },
                });
            }
        }
        Ok(ProviderResponse {
            text: self.final_text.to_string(),
            tool_calls: vec![],
            usage: TokenUsage { input_tokens: 200, output_tokens: 50 },
        })
    }
}

fn stub_market() -> Arc<MarketDataTools> {
    let mut bars = HashMap::new();
    bars.insert(
        "AAPL".to_string(),
        vec![
            Bar { date: Utc::now(), open: 188.0, high: 191.0, low: 187.5, close: 189.0, volume: 1_000_000 },
            Bar { date: Utc::now(), open: 189.0, high: 192.0, low: 188.0, close: 190.12, volume: 1_100_000 },
        ],
    );
    Arc::new(MarketDataTools::new(Arc::new(StubQuotesSource::new(bars))))
}

fn news_docs() -> Vec<Document> {
    vec![
        Document {
            id: "d1".into(),
            title: "AAPL quarterly earnings beat estimates".into(),
            body: "Apple reported strong quarterly earnings driven by services revenue".into(),
            published_at: Utc::now(),
            tickers: vec!["AAPL".into()],
            publisher: "wire".into(),
            link: "https://example.com/d1".into(),
        },
        Document {
            id: "d2".into(),
            title: "MSFT cloud growth accelerates".into(),
            body: "Microsoft posted accelerating cloud revenue growth this quarter".into(),
            published_at: Utc::now(),
            tickers: vec!["MSFT".into()],
            publisher: "wire".into(),
            link: "https://example.com/d2".into(),
        },
    ]
}

fn build_orchestrator(provider: Arc<dyn LLMProvider>, timeout_seconds: u64) -> Orchestrator {
    let config = Config {
        llm: LLMServiceConfig::default(),
        pool: PoolConfig { max_workers: 4, ttl_seconds: 300, timeout_seconds, queue_depth: 32 },
        retrieval: RetrievalConfig::default(),
    };
    let embedder = Arc::new(HashingEmbedder);
    let docs = news_docs();
    let lexical = Arc::new(LexicalIndex::build(docs.clone()));
    let semantic = Arc::new(SemanticIndex::build(docs, embedder.as_ref()));
    let llm = Arc::new(LLMClient::new(provider, config.llm.clone()));
    let toolbelt = Arc::new(ToolBelt::new(lexical, semantic, config.retrieval.clone(), embedder, stub_market()));
    Orchestrator::new(config, llm, toolbelt)
}

#[tokio::test]
async fn simple_price_query_uses_generalist_only() {
    let provider = Arc::new(ScriptedProvider {
        calls: AtomicUsize::new(0),
        first_tool_call: Some(("get_price", serde_json::json!({"ticker": "AAPL"}))),
        final_text: "AAPL is trading at $190.12, up roughly 0.6% today",
        delay: Duration::ZERO,
    });
    let orchestrator = build_orchestrator(provider, 30);

    let resp = orchestrator.process_query("What is AAPL's current price?", "s1").await;
    assert_eq!(resp.agent, "generalist");
    assert!(resp.response.contains('$'));
    assert!(resp.cost_usd > 0.0);
}

#[tokio::test]
async fn technical_jargon_routes_through_market_specialist() {
    let provider = Arc::new(ScriptedProvider {
        calls: AtomicUsize::new(0),
        first_tool_call: None,
        final_text: "AAPL's RSI sits at 58 and MACD is turning positive",
        delay: Duration::ZERO,
    });
    let orchestrator = build_orchestrator(provider, 30);

    let resp = orchestrator.process_query("Show me AAPL's RSI and MACD", "s1").await;
    assert_eq!(resp.agent, "generalist+market_data");
    assert!(resp.cost_usd > 0.0);
}

#[tokio::test]
async fn prefetch_is_consumed_by_a_later_followup() {
    let provider = Arc::new(ScriptedProvider {
        calls: AtomicUsize::new(0),
        first_tool_call: None,
        final_text: "TSLA moved on delivery numbers",
        delay: Duration::ZERO,
    });
    let orchestrator = build_orchestrator(provider, 30);

    let first = orchestrator.process_query("What moved TSLA today?", "s1").await;
    assert!(first.prefetch_active);

    // Give the pre-fetch worker a moment to finish before the follow-up.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = orchestrator.process_query("Why did it move?", "s1").await;
    assert_eq!(second.agent, "generalist+news");
}

#[tokio::test]
async fn dissatisfaction_followup_routes_to_news_specialist() {
    let provider = Arc::new(ScriptedProvider {
        calls: AtomicUsize::new(0),
        first_tool_call: None,
        final_text: "Here is more detail on NVDA",
        delay: Duration::ZERO,
    });
    let orchestrator = build_orchestrator(provider, 30);

    let _ = orchestrator.process_query("Tell me about NVDA", "s1").await;
    let second = orchestrator.process_query("That's not enough detail", "s1").await;
    assert_eq!(second.agent, "generalist+news");
}

#[tokio::test]
async fn retriever_filter_only_returns_matching_tickers() {
    let provider = Arc::new(ScriptedProvider {
        calls: AtomicUsize::new(0),
        first_tool_call: None,
        final_text: "unused".into(),
        delay: Duration::ZERO,
    });
    let orchestrator = build_orchestrator(provider, 30);
    let diag = orchestrator.diagnostic("AAPL earnings news").await;
    assert!(diag.retrieval.tickers_found.iter().all(|t| t != "MSFT"));
}

#[tokio::test]
async fn specialist_timeout_falls_back_to_anchor_answer() {
    let provider = Arc::new(ScriptedProvider {
        calls: AtomicUsize::new(0),
        first_tool_call: None,
        final_text: "AAPL's RSI and MACD are both favorable",
        delay: Duration::from_millis(1500),
    });
    let orchestrator = build_orchestrator(provider, 1);

    let resp = orchestrator.process_query("Show me AAPL's RSI and MACD", "s1").await;
    assert_eq!(resp.agent, "generalist");
    assert!(resp.response.contains("deeper analysis"));
}
