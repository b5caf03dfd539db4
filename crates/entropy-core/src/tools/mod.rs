//! Uniform tool façade presented to agents.
//!
//! A name -> handler dispatch registry, called directly in-process
//! rather than over JSON-RPC or HTTP framing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::market::MarketDataTools;
use crate::retrieval::{EmbeddingFn, HybridRetriever, LexicalIndex, SemanticIndex};
use crate::config::RetrievalConfig;

/// Closed set of tools an agent may call. Each tool has a name, a JSON-shaped argument schema (see
/// [`ToolBelt::schema_for`]), and a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    SearchNews,
    GetPrice,
    GetFundamentals,
    GetHistory,
    PriceChange,
    ComparePerformance,
    TopPerformers,
    Technicals,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SearchNews => "search_news",
            Self::GetPrice => "get_price",
            Self::GetFundamentals => "get_fundamentals",
            Self::GetHistory => "get_history",
            Self::PriceChange => "price_change",
            Self::ComparePerformance => "compare_performance",
            Self::TopPerformers => "top_performers",
            Self::Technicals => "get_technicals",
        }
    }

    /// Tools available to each agent kind.
    pub fn for_generalist() -> &'static [ToolName] {
        &[Self::SearchNews, Self::GetPrice, Self::GetFundamentals]
    }

    pub fn for_market_specialist() -> &'static [ToolName] {
        &[
            Self::GetPrice,
            Self::GetFundamentals,
            Self::GetHistory,
            Self::PriceChange,
            Self::ComparePerformance,
            Self::TopPerformers,
            Self::Technicals,
        ]
    }

    pub fn for_news_specialist() -> &'static [ToolName] {
        &[Self::SearchNews]
    }
}

/// Tools with "boundary marker" log discipline: these
/// two emit `[BOUNDARY: Src→Dst]` around entry/exit for diagnostic
/// tracing.
fn is_boundary_tool(name: ToolName) -> bool {
    matches!(name, ToolName::SearchNews | ToolName::GetPrice)
}

/// One tool call's fully-resolved result, ready to become a `Turn`'s
/// `ToolInvocation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_name: String,
    pub arguments: Value,
    pub result: Value,
}

/// Shared, stateless-beyond-the-underlying-indexes façade.
pub struct ToolBelt {
    lexical: Arc<LexicalIndex>,
    semantic: Arc<SemanticIndex>,
    retrieval_config: RetrievalConfig,
    embedder: Arc<dyn EmbeddingFn>,
    market: Arc<MarketDataTools>,
}

impl ToolBelt {
    pub fn new(
        lexical: Arc<LexicalIndex>,
        semantic: Arc<SemanticIndex>,
        retrieval_config: RetrievalConfig,
        embedder: Arc<dyn EmbeddingFn>,
        market: Arc<MarketDataTools>,
    ) -> Self {
        Self {
            lexical,
            semantic,
            retrieval_config,
            embedder,
            market,
        }
    }

    /// JSON schema for a tool's arguments, as an agent's LLM call
    /// would need to see it to emit a matching tool call.
    pub fn schema_for(name: ToolName) -> Value {
        match name {
            ToolName::SearchNews => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "k": {"type": "integer", "default": 5},
                    "tickers": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["query"]
            }),
            ToolName::GetPrice => json!({
                "type": "object",
                "properties": {"ticker": {"type": "string"}},
                "required": ["ticker"]
            }),
            ToolName::GetFundamentals => json!({
                "type": "object",
                "properties": {"ticker": {"type": "string"}},
                "required": ["ticker"]
            }),
            ToolName::GetHistory => json!({
                "type": "object",
                "properties": {
                    "ticker": {"type": "string"},
                    "period": {"type": "string"}
                },
                "required": ["ticker", "period"]
            }),
            ToolName::PriceChange => json!({
                "type": "object",
                "properties": {
                    "ticker": {"type": "string"},
                    "period": {"type": "string"}
                },
                "required": ["ticker", "period"]
            }),
            ToolName::ComparePerformance | ToolName::TopPerformers => json!({
                "type": "object",
                "properties": {
                    "tickers": {"type": "array", "items": {"type": "string"}},
                    "period": {"type": "string"}
                },
                "required": ["tickers", "period"]
            }),
            ToolName::Technicals => json!({
                "type": "object",
                "properties": {"ticker": {"type": "string"}},
                "required": ["ticker"]
            }),
        }
    }

    /// Execute a named tool call against JSON arguments. Never raises
    /// — malformed arguments resolve
    /// to a `null`/empty result rather than an error.
    pub async fn call(&self, name: ToolName, arguments: Value) -> ToolCallResult {
        if is_boundary_tool(name) {
            tracing::info!("[BOUNDARY: Agent→ToolBelt] entering {}", name.as_str());
        }

        let result = match name {
            ToolName::SearchNews => self.search_news(&arguments).await,
            ToolName::GetPrice => self.get_price(&arguments).await,
            ToolName::GetFundamentals => self.get_fundamentals(&arguments).await,
            ToolName::GetHistory => self.get_history(&arguments).await,
            ToolName::PriceChange => self.price_change(&arguments).await,
            ToolName::ComparePerformance => self.compare_performance(&arguments).await,
            ToolName::TopPerformers => self.top_performers(&arguments).await,
            ToolName::Technicals => self.technicals(&arguments).await,
        };

        if is_boundary_tool(name) {
            tracing::info!("[BOUNDARY: ToolBelt→Agent] leaving {}", name.as_str());
        }

        ToolCallResult {
            tool_name: name.as_str().to_string(),
            arguments,
            result,
        }
    }

    async fn search_news(&self, args: &Value) -> Value {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return json!({ "hits": [] });
        };
        let k = args.get("k").and_then(Value::as_u64).unwrap_or(5) as usize;
        let tickers: Option<Vec<String>> = args.get("tickers").and_then(|v| {
            v.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
        });

        let retriever = HybridRetriever::new(&self.lexical, &self.semantic, self.retrieval_config.clone());
        let hits = retriever
            .search(query, k, tickers.as_deref(), self.embedder.as_ref())
            .await;

        let docs: Vec<Value> = hits
            .iter()
            .filter_map(|h| {
                self.lexical
                    .document(&h.document_id)
                    .or_else(|| self.semantic.document(&h.document_id))
            })
            .map(|d| {
                json!({
                    "id": d.id,
                    "title": d.title,
                    "tickers": d.tickers,
                    "publisher": d.publisher,
                    "link": d.link,
                })
            })
            .collect();

        json!({ "hits": docs })
    }

    async fn get_price(&self, args: &Value) -> Value {
        let Some(ticker) = args.get("ticker").and_then(Value::as_str) else {
            return Value::Null;
        };
        serde_json::to_value(self.market.get_price(ticker).await).unwrap_or(Value::Null)
    }

    async fn get_fundamentals(&self, args: &Value) -> Value {
        let Some(ticker) = args.get("ticker").and_then(Value::as_str) else {
            return Value::Null;
        };
        serde_json::to_value(self.market.get_fundamentals(ticker).await).unwrap_or(Value::Null)
    }

    async fn get_history(&self, args: &Value) -> Value {
        let (Some(ticker), Some(period)) = (
            args.get("ticker").and_then(Value::as_str),
            args.get("period").and_then(Value::as_str),
        ) else {
            return json!({ "bars": [] });
        };
        let bars = self.market.get_history(ticker, period).await;
        json!({ "bars": bars })
    }

    async fn price_change(&self, args: &Value) -> Value {
        let (Some(ticker), Some(period)) = (
            args.get("ticker").and_then(Value::as_str),
            args.get("period").and_then(Value::as_str),
        ) else {
            return Value::Null;
        };
        json!({ "percent_change": self.market.price_change(ticker, period).await })
    }

    fn tickers_from(args: &Value) -> Vec<String> {
        args.get("tickers")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|t| t.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    async fn compare_performance(&self, args: &Value) -> Value {
        let tickers = Self::tickers_from(args);
        let period = args.get("period").and_then(Value::as_str).unwrap_or("1mo");
        let readings = self.market.compare_performance(&tickers, period).await;
        json!({ "readings": readings.iter().map(|r| json!({"ticker": r.ticker, "percent_change": r.percent_change})).collect::<Vec<_>>() })
    }

    async fn top_performers(&self, args: &Value) -> Value {
        let tickers = Self::tickers_from(args);
        let period = args.get("period").and_then(Value::as_str).unwrap_or("1mo");
        let n = args.get("n").and_then(Value::as_u64).unwrap_or(3) as usize;
        let readings = self.market.top_performers(&tickers, period, n).await;
        json!({ "readings": readings.iter().map(|r| json!({"ticker": r.ticker, "percent_change": r.percent_change})).collect::<Vec<_>>() })
    }

    async fn technicals(&self, args: &Value) -> Value {
        let Some(ticker) = args.get("ticker").and_then(Value::as_str) else {
            return Value::Null;
        };
        serde_json::to_value(self.market.technicals(ticker).await).unwrap_or(Value::Null)
    }
}

/// Retrieval leg of the `/diagnostic/{query}` trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalDiagnostic {
    pub success: bool,
    pub num_results: usize,
    pub tickers_found: Vec<String>,
    pub sample_titles: Vec<String>,
}

/// Market-data leg of the `/diagnostic/{query}` trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDiagnostic {
    pub success: bool,
    pub ticker_extracted: Option<String>,
    pub data_available: bool,
    pub current_price: Option<f64>,
}

impl ToolBelt {
    pub async fn diagnostic_retrieval(&self, query: &str) -> RetrievalDiagnostic {
        let retriever = HybridRetriever::new(&self.lexical, &self.semantic, self.retrieval_config.clone());
        let hits = retriever.search(query, 5, None, self.embedder.as_ref()).await;

        let mut tickers_found = std::collections::BTreeSet::new();
        let mut sample_titles = Vec::new();
        for hit in &hits {
            if let Some(doc) = self.lexical.document(&hit.document_id).or_else(|| self.semantic.document(&hit.document_id)) {
                tickers_found.extend(doc.tickers.iter().cloned());
                sample_titles.push(doc.title.clone());
            }
        }

        RetrievalDiagnostic {
            success: !hits.is_empty(),
            num_results: hits.len(),
            tickers_found: tickers_found.into_iter().collect(),
            sample_titles,
        }
    }

    pub async fn diagnostic_market(&self, query: &str) -> MarketDiagnostic {
        let ticker = crate::policy::extract_ticker(query);
        match &ticker {
            Some(t) => {
                let price = self.market.get_price(t).await;
                MarketDiagnostic {
                    success: price.price.is_some(),
                    ticker_extracted: ticker.clone(),
                    data_available: price.price.is_some(),
                    current_price: price.price,
                }
            }
            None => MarketDiagnostic {
                success: false,
                ticker_extracted: None,
                data_available: false,
                current_price: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Bar;
    use crate::market::quotes::StubQuotesSource;
    use crate::retrieval::HashingEmbedder;
    use chrono::Utc;
    use std::collections::HashMap;

    fn empty_belt() -> ToolBelt {
        ToolBelt::new(
            Arc::new(LexicalIndex::empty()),
            Arc::new(SemanticIndex::empty()),
            RetrievalConfig::default(),
            Arc::new(HashingEmbedder),
            Arc::new(MarketDataTools::new(Arc::new(StubQuotesSource::new(HashMap::new())))),
        )
    }

    #[tokio::test]
    async fn malformed_arguments_never_panic() {
        let belt = empty_belt();
        let result = belt.call(ToolName::GetPrice, json!({})).await;
        assert_eq!(result.result, Value::Null);
    }

    #[tokio::test]
    async fn unknown_ticker_yields_absent_price_field() {
        let mut map = HashMap::new();
        map.insert(
            "AAPL".to_string(),
            vec![Bar { date: Utc::now(), open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1 }],
        );
        let belt = ToolBelt::new(
            Arc::new(LexicalIndex::empty()),
            Arc::new(SemanticIndex::empty()),
            RetrievalConfig::default(),
            Arc::new(HashingEmbedder),
            Arc::new(MarketDataTools::new(Arc::new(StubQuotesSource::new(map)))),
        );
        let result = belt.call(ToolName::GetPrice, json!({"ticker": "ZZZZ"})).await;
        assert_eq!(result.result["price"], Value::Null);
    }

    #[tokio::test]
    async fn empty_indexes_search_news_returns_empty_hits() {
        let belt = empty_belt();
        let result = belt.call(ToolName::SearchNews, json!({"query": "earnings"})).await;
        assert_eq!(result.result["hits"].as_array().unwrap().len(), 0);
    }
}
