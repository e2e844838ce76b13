//! Indicator calculator.
//!
//! Every function here is a pure function of an ordered candle slice; there
//! is no hidden state between ticks. `compute` refuses to work on partial
//! windows: fewer candles than the configured lookback is `InsufficientData`,
//! never a silently degraded `IndicatorSet`.

use chrono::Timelike;
use perpbot_core::config::StrategyConfig;
use perpbot_core::domain::{Candle, IndicatorSet};
use perpbot_core::error::EngineError;
use rust_decimal::Decimal;

/// Computes the indicator set for the most recent candle of `candles`.
///
/// `candles` must be ordered by timestamp ascending and belong to a single
/// symbol.
///
/// # Errors
/// `EngineError::InsufficientData` when the slice is shorter than
/// `config.required_lookback()`.
pub fn compute(candles: &[Candle], config: &StrategyConfig) -> Result<IndicatorSet, EngineError> {
    let needed = config.required_lookback();
    if candles.len() < needed {
        return Err(EngineError::InsufficientData {
            needed,
            got: candles.len(),
        });
    }

    let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
    let last = candles.last().expect("length checked above");

    Ok(IndicatorSet {
        symbol: last.symbol.clone(),
        timestamp: last.timestamp,
        close: last.close,
        rsi: rsi(&closes, config.rsi_period),
        ma_fast: sma(&closes, config.ma_fast_period),
        ma_slow: sma(&closes, config.ma_slow_period),
        adx: adx(candles, config.adx_period),
        relative_volume: relative_volume(candles, config.stat_window),
        volatility: volatility(&closes, config.stat_window),
    })
}

/// Simple arithmetic mean of the last `period` values.
#[must_use]
pub fn sma(values: &[Decimal], period: usize) -> Decimal {
    let window = &values[values.len() - period..];
    let sum: Decimal = window.iter().sum();
    sum / Decimal::from(period)
}

/// Relative Strength Index over the last `period` deltas, using a simple
/// rolling mean of gains and losses.
#[must_use]
pub fn rsi(closes: &[Decimal], period: usize) -> f64 {
    let window = &closes[closes.len() - period - 1..];
    let mut gain = 0.0f64;
    let mut loss = 0.0f64;
    for pair in window.windows(2) {
        let delta = to_f64(pair[1] - pair[0]);
        if delta > 0.0 {
            gain += delta;
        } else {
            loss -= delta;
        }
    }
    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;

    if avg_loss == 0.0 {
        // No down-moves in the window: fully overbought (flat windows too).
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

/// Average Directional Index: true range and directional movement smoothed by
/// rolling means, then a rolling mean of the directional index.
#[must_use]
pub fn adx(candles: &[Candle], period: usize) -> f64 {
    let n = candles.len();
    // One bar of warmup for the previous close, then two rolling means.
    debug_assert!(n >= 2 * period + 1);

    let mut tr = Vec::with_capacity(n - 1);
    let mut dm_plus = Vec::with_capacity(n - 1);
    let mut dm_minus = Vec::with_capacity(n - 1);
    for pair in candles.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        let high = to_f64(cur.high);
        let low = to_f64(cur.low);
        let prev_close = to_f64(prev.close);
        let prev_high = to_f64(prev.high);
        let prev_low = to_f64(prev.low);

        let range = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());
        tr.push(range);

        let up = high - prev_high;
        let down = prev_low - low;
        dm_plus.push(if up > down && up > 0.0 { up } else { 0.0 });
        dm_minus.push(if down > up && down > 0.0 { down } else { 0.0 });
    }

    let rolling_mean = |series: &[f64], end: usize| -> f64 {
        series[end - period..end].iter().sum::<f64>() / period as f64
    };

    let mut dx = Vec::new();
    for end in period..=tr.len() {
        let tr_s = rolling_mean(&tr, end);
        if tr_s == 0.0 {
            dx.push(0.0);
            continue;
        }
        let di_plus = 100.0 * rolling_mean(&dm_plus, end) / tr_s;
        let di_minus = 100.0 * rolling_mean(&dm_minus, end) / tr_s;
        let sum = di_plus + di_minus;
        dx.push(if sum == 0.0 {
            0.0
        } else {
            100.0 * (di_plus - di_minus).abs() / sum
        });
    }

    let tail = &dx[dx.len() - period..];
    tail.iter().sum::<f64>() / period as f64
}

/// Current volume divided by the mean volume of the trailing `window`
/// candles (current candle included).
#[must_use]
pub fn relative_volume(candles: &[Candle], window: usize) -> f64 {
    let tail = &candles[candles.len() - window..];
    let avg: f64 = tail.iter().map(|c| to_f64(c.volume)).sum::<f64>() / window as f64;
    if avg == 0.0 {
        return 0.0;
    }
    to_f64(candles[candles.len() - 1].volume) / avg
}

/// Sample standard deviation of close-to-close returns over the last
/// `window` returns.
#[must_use]
pub fn volatility(closes: &[Decimal], window: usize) -> f64 {
    let tail = &closes[closes.len() - window - 1..];
    let returns: Vec<f64> = tail
        .windows(2)
        .map(|p| {
            let prev = to_f64(p[0]);
            if prev == 0.0 {
                0.0
            } else {
                (to_f64(p[1]) - prev) / prev
            }
        })
        .collect();
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    var.sqrt()
}

/// True when `hour` falls within the configured trading session.
#[must_use]
pub fn session_allowed(config: &StrategyConfig, now: chrono::DateTime<chrono::Utc>) -> bool {
    match &config.allowed_hours {
        None => true,
        Some(hours) => hours.contains(&now.hour()),
    }
}

fn to_f64(d: Decimal) -> f64 {
    d.try_into().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let close = Decimal::try_from(*c).unwrap();
                Candle {
                    symbol: "XRPUSDT".to_string(),
                    timestamp: start + Duration::minutes(5 * i as i64),
                    open: close,
                    high: close + dec!(0.5),
                    low: close - dec!(0.5),
                    close,
                    volume: dec!(1000),
                }
            })
            .collect()
    }

    #[test]
    fn insufficient_data_never_yields_partial_set() {
        let config = StrategyConfig::default();
        for len in [0, 1, 10, config.required_lookback() - 1] {
            let candles = candles_from_closes(&vec![100.0; len]);
            let err = compute(&candles, &config).unwrap_err();
            match err {
                EngineError::InsufficientData { needed, got } => {
                    assert_eq!(needed, config.required_lookback());
                    assert_eq!(got, len);
                }
                other => panic!("expected InsufficientData, got {other}"),
            }
        }
    }

    #[test]
    fn exactly_lookback_candles_is_enough() {
        let config = StrategyConfig::default();
        let candles = candles_from_closes(&vec![100.0; config.required_lookback()]);
        assert!(compute(&candles, &config).is_ok());
    }

    #[test]
    fn sma_is_arithmetic_mean() {
        let values = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        assert_eq!(sma(&values, 2), dec!(3.5));
        assert_eq!(sma(&values, 4), dec!(2.5));
    }

    #[test]
    fn rsi_extremes() {
        // Monotonically rising closes: no losses, RSI pegs at 100.
        let rising: Vec<Decimal> = (0..20).map(Decimal::from).collect();
        assert!((rsi(&rising, 14) - 100.0).abs() < 1e-9);

        // Monotonically falling closes: no gains, RSI at 0.
        let falling: Vec<Decimal> = (0..20).rev().map(Decimal::from).collect();
        assert!(rsi(&falling, 14).abs() < 1e-9);
    }

    #[test]
    fn rsi_balanced_moves_near_fifty() {
        // Alternating +1/-1 deltas: equal average gain and loss.
        let mut closes = vec![dec!(100)];
        for i in 0..20 {
            let last = *closes.last().unwrap();
            closes.push(if i % 2 == 0 { last + dec!(1) } else { last - dec!(1) });
        }
        let value = rsi(&closes, 14);
        assert!((value - 50.0).abs() < 8.0, "rsi {value} too far from 50");
    }

    #[test]
    fn relative_volume_flags_spikes() {
        let mut candles = candles_from_closes(&vec![100.0; 30]);
        candles.last_mut().unwrap().volume = dec!(3000);
        let ratio = relative_volume(&candles, 20);
        // 3000 / ((19 * 1000 + 3000) / 20) = 3000 / 1100
        assert!((ratio - 3000.0 / 1100.0).abs() < 1e-9);
    }

    #[test]
    fn volatility_zero_for_flat_series() {
        let closes = vec![dec!(100); 30];
        assert!(volatility(&closes, 20).abs() < 1e-12);
    }

    #[test]
    fn volatility_positive_for_choppy_series() {
        let closes: Vec<Decimal> = (0..30)
            .map(|i| if i % 2 == 0 { dec!(100) } else { dec!(102) })
            .collect();
        assert!(volatility(&closes, 20) > 0.005);
    }

    #[test]
    fn adx_high_in_sustained_trend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + f64::from(i)).collect();
        let candles = candles_from_closes(&closes);
        let value = adx(&candles, 14);
        assert!(value > 25.0, "trending ADX {value} should exceed 25");
    }

    #[test]
    fn session_filter_uses_utc_hour() {
        let mut config = StrategyConfig::default();
        config.allowed_hours = Some(vec![8, 9, 10]);
        let inside = Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 3, 1, 3, 0, 0).unwrap();
        assert!(session_allowed(&config, inside));
        assert!(!session_allowed(&config, outside));

        config.allowed_hours = None;
        assert!(session_allowed(&config, outside));
    }
}
