//! Abstraction over the external quotes source.
//!
//! A `reqwest`-backed default implementation sits behind a trait so a
//! deterministic test double can stand in during tests.

use async_trait::async_trait;

use crate::data::Bar;

/// Raw upstream access. Implementations never panic; transport
/// failures surface as `None`/empty.
#[async_trait]
pub trait QuotesSource: Send + Sync {
    async fn latest_bar(&self, ticker: &str) -> Option<Bar>;
    async fn history(&self, ticker: &str, bars: usize) -> Vec<Bar>;
    async fn fundamentals_raw(&self, ticker: &str) -> Option<FundamentalsRaw>;
}

#[derive(Debug, Clone)]
pub struct FundamentalsRaw {
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub eps: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
}

/// `reqwest`-backed default implementation. The concrete wire format
/// of the upstream quotes API is out of core scope; this
/// implementation targets a generic JSON bars endpoint and is meant
/// to be adapted to whatever quotes vendor the deployment wires in.
pub struct HttpQuotesSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpQuotesSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl QuotesSource for HttpQuotesSource {
    async fn latest_bar(&self, ticker: &str) -> Option<Bar> {
        let url = format!("{}/v1/bars/{}/latest", self.base_url, ticker);
        let resp = self.client.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.json::<Bar>().await.ok()
    }

    async fn history(&self, ticker: &str, bars: usize) -> Vec<Bar> {
        let url = format!("{}/v1/bars/{}?limit={}", self.base_url, ticker, bars);
        let Ok(resp) = self.client.get(url).send().await else {
            return Vec::new();
        };
        if !resp.status().is_success() {
            return Vec::new();
        }
        resp.json::<Vec<Bar>>().await.unwrap_or_default()
    }

    async fn fundamentals_raw(&self, ticker: &str) -> Option<FundamentalsRaw> {
        #[derive(serde::Deserialize)]
        struct Wire {
            market_cap: Option<f64>,
            pe_ratio: Option<f64>,
            eps: Option<f64>,
            dividend_yield: Option<f64>,
            sector: Option<String>,
        }
        let url = format!("{}/v1/fundamentals/{}", self.base_url, ticker);
        let resp = self.client.get(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let wire: Wire = resp.json().await.ok()?;
        Some(FundamentalsRaw {
            market_cap: wire.market_cap,
            pe_ratio: wire.pe_ratio,
            eps: wire.eps,
            dividend_yield: wire.dividend_yield,
            sector: wire.sector,
        })
    }
}

/// In-memory deterministic stub used by tests and the diagnostic
/// endpoint's dry-run mode: a fixed map of ticker -> synthetic price
/// history, never reaching the network.
pub struct StubQuotesSource {
    pub bars: std::collections::HashMap<String, Vec<Bar>>,
}

impl StubQuotesSource {
    pub fn new(bars: std::collections::HashMap<String, Vec<Bar>>) -> Self {
        Self { bars }
    }
}

#[async_trait]
impl QuotesSource for StubQuotesSource {
    async fn latest_bar(&self, ticker: &str) -> Option<Bar> {
        self.bars.get(ticker).and_then(|b| b.last().copied())
    }

    async fn history(&self, ticker: &str, bars: usize) -> Vec<Bar> {
        self.bars
            .get(ticker)
            .map(|b| {
                let start = b.len().saturating_sub(bars);
                b[start..].to_vec()
            })
            .unwrap_or_default()
    }

    async fn fundamentals_raw(&self, ticker: &str) -> Option<FundamentalsRaw> {
        self.bars.get(ticker)?;
        Some(FundamentalsRaw {
            market_cap: Some(1.0e12),
            pe_ratio: Some(28.5),
            eps: Some(6.1),
            dividend_yield: Some(0.005),
            sector: Some("Technology".to_string()),
        })
    }
}
