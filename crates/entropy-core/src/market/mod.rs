//! Thin query layer over an external quotes source; returns typed
//! snapshots.

pub mod indicators;
pub mod quotes;

use std::sync::Arc;

use futures::future::join_all;

use crate::data::{Fundamentals, Period, PriceSnapshot, TechnicalReading};
use quotes::QuotesSource;

/// A single (ticker, closing-price) observation, used by the
/// analytical helpers (`compare_performance`, `top_performers`).
#[derive(Debug, Clone)]
pub struct PerformanceReading {
    pub ticker: String,
    pub percent_change: Option<f64>,
}

/// Uniform query layer the `ToolBelt` exposes to agents. Every method
/// returns a typed value or is internally `Option`-guarded: it never
/// raises.
pub struct MarketDataTools {
    source: Arc<dyn QuotesSource>,
}

impl MarketDataTools {
    pub fn new(source: Arc<dyn QuotesSource>) -> Self {
        Self { source }
    }

    pub async fn get_price(&self, ticker: &str) -> PriceSnapshot {
        let Some(bar) = self.source.latest_bar(ticker).await else {
            return PriceSnapshot {
                ticker: ticker.to_string(),
                ..Default::default()
            };
        };
        let history = self.source.history(ticker, 2).await;
        let prev_close = history
            .iter()
            .rev()
            .nth(1)
            .map(|b| b.close)
            .unwrap_or(bar.close);
        let change = bar.close - prev_close;
        let change_percent = if prev_close != 0.0 {
            Some(change / prev_close * 100.0)
        } else {
            None
        };
        PriceSnapshot {
            ticker: ticker.to_string(),
            price: Some(bar.close),
            change: Some(change),
            change_percent,
            volume: Some(bar.volume),
            as_of: Some(bar.date),
        }
    }

    pub async fn get_fundamentals(&self, ticker: &str) -> Fundamentals {
        let Some(raw) = self.source.fundamentals_raw(ticker).await else {
            return Fundamentals {
                ticker: ticker.to_string(),
                ..Default::default()
            };
        };
        Fundamentals {
            ticker: ticker.to_string(),
            market_cap: raw.market_cap,
            pe_ratio: raw.pe_ratio,
            eps: raw.eps,
            dividend_yield: raw.dividend_yield,
            sector: raw.sector,
        }
    }

    /// Returns *absent* (empty) for an unknown period string, never
    /// an error.
    pub async fn get_history(&self, ticker: &str, period: &str) -> Vec<crate::data::Bar> {
        let Some(period) = Period::parse(period) else {
            return Vec::new();
        };
        self.source
            .history(ticker, period.approx_trading_days())
            .await
    }

    pub async fn price_change(&self, ticker: &str, period: &str) -> Option<f64> {
        let bars = self.get_history(ticker, period).await;
        percent_change(&bars)
    }

    /// Fetches every ticker's change concurrently rather than one round
    /// trip at a time — the upstream quotes source is the latency floor
    /// here, not CPU, so fan-out pays off even for a handful of tickers.
    pub async fn compare_performance(&self, tickers: &[String], period: &str) -> Vec<PerformanceReading> {
        let futures = tickers.iter().map(|ticker| async move {
            PerformanceReading {
                ticker: ticker.clone(),
                percent_change: self.price_change(ticker, period).await,
            }
        });
        join_all(futures).await
    }

    /// Top performers by percent change over `period`, descending,
    /// tickers with absent data sorted last. Absent-safe: never
    /// panics on an empty or all-absent input.
    pub async fn top_performers(&self, tickers: &[String], period: &str, n: usize) -> Vec<PerformanceReading> {
        let mut readings = self.compare_performance(tickers, period).await;
        readings.sort_by(|a, b| match (a.percent_change, b.percent_change) {
            (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(std::cmp::Ordering::Equal),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        readings.truncate(n);
        readings
    }

    pub async fn returns(&self, ticker: &str, start: chrono::DateTime<chrono::Utc>, end: chrono::DateTime<chrono::Utc>) -> Option<f64> {
        let bars = self.source.history(ticker, Period::Max.approx_trading_days()).await;
        let in_range: Vec<_> = bars.into_iter().filter(|b| b.date >= start && b.date <= end).collect();
        percent_change(&in_range)
    }

    /// Bundles all indicator readings for one ticker (used by the
    /// MarketSpecialist tool surface). `None` fields reflect
    /// per-indicator insufficient history; the method itself never
    /// returns `None` as a whole.
    pub async fn technicals(&self, ticker: &str) -> TechnicalReading {
        let bars = self.source.history(ticker, Period::Y1.approx_trading_days()).await;
        TechnicalReading {
            ticker: ticker.to_string(),
            sma: indicators::sma(&bars, 50),
            ema: indicators::ema(&bars, 20),
            rsi: indicators::rsi(&bars, 14),
            macd: indicators::macd(&bars),
            golden_cross: indicators::golden_cross(&bars),
        }
    }
}

fn percent_change(bars: &[crate::data::Bar]) -> Option<f64> {
    let first = bars.first()?;
    let last = bars.last()?;
    if first.close == 0.0 {
        return None;
    }
    Some((last.close - first.close) / first.close * 100.0)
}
