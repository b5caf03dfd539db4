//! Pure technical-analysis functions over a price history.
//!
//! Standard closed-form formulas, kept deterministic and
//! side-effect-free like the rest of the scoring functions in this
//! crate (`retrieval::hybrid::HybridRetriever::fuse`).

use crate::data::{Bar, MacdReading};

/// Simple moving average over the last `window` closes. `None` on
/// insufficient history.
pub fn sma(bars: &[Bar], window: usize) -> Option<f64> {
    if bars.len() < window || window == 0 {
        return None;
    }
    let closes = &bars[bars.len() - window..];
    Some(closes.iter().map(|b| b.close).sum::<f64>() / window as f64)
}

/// Full EMA series seeded by an SMA of the first `window` closes.
fn ema_series(bars: &[Bar], window: usize) -> Option<Vec<f64>> {
    if bars.len() < window || window == 0 {
        return None;
    }
    let multiplier = 2.0 / (window as f64 + 1.0);
    let seed = bars[..window].iter().map(|b| b.close).sum::<f64>() / window as f64;
    let mut series = vec![seed];
    for bar in &bars[window..] {
        let prev = *series.last().unwrap();
        series.push((bar.close - prev) * multiplier + prev);
    }
    Some(series)
}

/// Exponential moving average, latest value only.
pub fn ema(bars: &[Bar], window: usize) -> Option<f64> {
    ema_series(bars, window).and_then(|s| s.last().copied())
}

/// Relative strength index over `window` periods (Wilder's smoothing).
pub fn rsi(bars: &[Bar], window: usize) -> Option<f64> {
    if bars.len() < window + 1 || window == 0 {
        return None;
    }
    let changes: Vec<f64> = bars.windows(2).map(|w| w[1].close - w[0].close).collect();
    let relevant = &changes[changes.len() - window..];

    let avg_gain = relevant.iter().filter(|c| **c > 0.0).sum::<f64>() / window as f64;
    let avg_loss = relevant.iter().filter(|c| **c < 0.0).map(|c| -c).sum::<f64>() / window as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

/// MACD: 12/26 EMA difference, signalled by a 9-period EMA of that
/// difference. `None` when there isn't enough history for the 26-EMA.
pub fn macd(bars: &[Bar]) -> Option<MacdReading> {
    const FAST: usize = 12;
    const SLOW: usize = 26;
    const SIGNAL: usize = 9;

    let fast_series = ema_series(bars, FAST)?;
    let slow_series = ema_series(bars, SLOW)?;

    // Align both series to the same tail length (slow starts later).
    let offset = SLOW - FAST;
    if fast_series.len() <= offset {
        return None;
    }
    let macd_line: Vec<f64> = fast_series[offset..]
        .iter()
        .zip(slow_series.iter())
        .map(|(f, s)| f - s)
        .collect();

    if macd_line.len() < SIGNAL {
        return None;
    }
    let signal_seed = macd_line[..SIGNAL].iter().sum::<f64>() / SIGNAL as f64;
    let multiplier = 2.0 / (SIGNAL as f64 + 1.0);
    let mut signal = signal_seed;
    for &v in &macd_line[SIGNAL..] {
        signal = (v - signal) * multiplier + signal;
    }

    let macd_val = *macd_line.last().unwrap();
    Some(MacdReading {
        macd: macd_val,
        signal,
        histogram: macd_val - signal,
    })
}

/// Whether the 50-day SMA has crossed above the 200-day SMA. Requires at least 200 bars; `None` otherwise.
pub fn golden_cross(bars: &[Bar]) -> Option<bool> {
    if bars.len() < 200 {
        return None;
    }
    let sma50 = sma(bars, 50)?;
    let sma200 = sma(bars, 200)?;
    Some(sma50 > sma200)
}
