//! Deterministic synthetic market data for paper runs.
//!
//! Produces a slow oscillating walk per symbol so the whole pipeline can be
//! exercised without any exchange connectivity. The walk advances one step
//! per snapshot request.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use perpbot_core::domain::Candle;
use perpbot_core::error::SnapshotUnavailable;
use perpbot_core::traits::SnapshotProvider;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

const CANDLE_SPACING_MINUTES: i64 = 5;

pub struct SyntheticSnapshots {
    base_prices: HashMap<String, f64>,
    step: AtomicU64,
    last_close: Mutex<HashMap<String, Decimal>>,
}

impl SyntheticSnapshots {
    #[must_use]
    pub fn new(symbols: &[String]) -> Self {
        // Spread the base prices so symbols do not move in lockstep.
        let base_prices = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), 100.0 * (i as f64 + 1.0)))
            .collect();
        Self {
            base_prices,
            step: AtomicU64::new(0),
            last_close: Mutex::new(HashMap::new()),
        }
    }

    /// The most recent close served for `symbol`, if any snapshot was taken.
    #[must_use]
    pub fn latest_close(&self, symbol: &str) -> Option<Decimal> {
        self.last_close.lock().unwrap().get(symbol).copied()
    }

    fn close_at(base: f64, k: u64) -> f64 {
        let k = k as f64;
        // Two superimposed cycles: a fast oscillation that trips the RSI and
        // a slow drift that moves the averages.
        base * (1.0 + 0.02 * (k * 0.35).sin() + 0.008 * (k * 0.05).sin())
    }

    fn volume_at(k: u64) -> f64 {
        let k = k as f64;
        1000.0 * (1.0 + 0.6 * (k * 0.7).sin().abs())
    }
}

#[async_trait]
impl SnapshotProvider for SyntheticSnapshots {
    async fn candles(
        &self,
        symbol: &str,
        count: usize,
    ) -> Result<Vec<Candle>, SnapshotUnavailable> {
        let base = *self
            .base_prices
            .get(symbol)
            .ok_or_else(|| SnapshotUnavailable {
                symbol: symbol.to_string(),
                reason: "symbol not configured".to_string(),
            })?;

        let end = self.step.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let mut candles = Vec::with_capacity(count);
        for i in 0..count {
            let k = end + i as u64;
            let close = Self::close_at(base, k);
            let prev = if k == 0 { close } else { Self::close_at(base, k - 1) };
            let (high, low) = if close >= prev { (close, prev) } else { (prev, close) };
            let age = (count - 1 - i) as i64;
            candles.push(Candle {
                symbol: symbol.to_string(),
                timestamp: now - Duration::minutes(CANDLE_SPACING_MINUTES * age),
                open: to_decimal(prev),
                high: to_decimal(high),
                low: to_decimal(low),
                close: to_decimal(close),
                volume: to_decimal(Self::volume_at(k)),
            });
        }
        if let Some(last) = candles.last() {
            self.last_close
                .lock()
                .unwrap()
                .insert(symbol.to_string(), last.close);
        }
        Ok(candles)
    }
}

fn to_decimal(v: f64) -> Decimal {
    Decimal::try_from(v).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn serves_requested_count_in_ascending_order() {
        let provider = SyntheticSnapshots::new(&["BTCUSDT".to_string()]);
        let candles = provider.candles("BTCUSDT", 60).await.unwrap();
        assert_eq!(candles.len(), 60);
        for pair in candles.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn walk_advances_between_requests() {
        let provider = SyntheticSnapshots::new(&["BTCUSDT".to_string()]);
        let first = provider.candles("BTCUSDT", 10).await.unwrap();
        let second = provider.candles("BTCUSDT", 10).await.unwrap();
        assert_ne!(
            first.last().unwrap().close,
            second.last().unwrap().close,
            "consecutive snapshots should not be identical"
        );
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let provider = SyntheticSnapshots::new(&["BTCUSDT".to_string()]);
        assert!(provider.candles("DOGEUSDT", 10).await.is_err());
    }
}
