//! Signal evaluator.
//!
//! Maps one `IndicatorSet` plus the configured thresholds to a directional
//! signal. Evaluation is deterministic: identical inputs (including the
//! evaluation clock) always produce the same output. Every enabled filter is
//! a hard AND; confidence is an additive score reported for observability
//! and never overrides a failed filter.

use crate::indicators::session_allowed;
use chrono::{DateTime, Utc};
use perpbot_core::config::{RsiThresholds, StrategyConfig};
use perpbot_core::domain::{Direction, IndicatorSet, Signal};

pub struct SignalEvaluator {
    config: StrategyConfig,
}

impl SignalEvaluator {
    #[must_use]
    pub const fn new(config: StrategyConfig) -> Self {
        Self { config }
    }

    /// Evaluates the indicator set against the policy.
    ///
    /// `open_direction` is the direction of the symbol's current non-terminal
    /// position, if any; a signal opposing it is suppressed unless
    /// `reverse_on_signal` is configured, to avoid flip-flopping.
    #[must_use]
    pub fn evaluate(
        &self,
        indicators: &IndicatorSet,
        open_direction: Option<Direction>,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        let direction = self.base_direction(indicators)?;

        if let Some(open) = open_direction {
            if open == direction.opposite() && !self.config.reverse_on_signal {
                tracing::debug!(
                    symbol = %indicators.symbol,
                    ?direction,
                    "signal suppressed: conflicts with open position"
                );
                return None;
            }
        }

        let mut confidence: f64 = 0.3;
        let mut triggers = vec![self.base_trigger(direction)];

        let trend_ok = match self.config.adx_threshold {
            Some(threshold) => indicators.adx >= threshold,
            None => true,
        };
        if !trend_ok {
            return None;
        }
        if self.config.adx_threshold.is_some() {
            confidence += 0.2;
            triggers.push(format!("adx {:.1}", indicators.adx));
        }

        let volume_ok = match self.config.relative_volume_threshold {
            Some(threshold) => indicators.relative_volume >= threshold,
            None => true,
        };
        if !volume_ok {
            return None;
        }
        if self.config.relative_volume_threshold.is_some() {
            confidence += 0.2;
            triggers.push(format!("relative volume {:.2}x", indicators.relative_volume));
        }

        let volatility_ok = match self.config.max_volatility {
            Some(ceiling) => indicators.volatility <= ceiling,
            None => true,
        };
        if !volatility_ok {
            return None;
        }
        confidence += 0.15;

        if !session_allowed(&self.config, now) {
            return None;
        }
        confidence += 0.1;

        // Trending regime bonus: strong trend with contained volatility.
        if trend_ok && volatility_ok && self.config.adx_threshold.is_some() {
            confidence += 0.05;
        }

        Some(Signal {
            symbol: indicators.symbol.clone(),
            timestamp: indicators.timestamp,
            direction,
            price: indicators.close,
            confidence: confidence.min(1.0),
            triggers,
        })
    }

    /// The RSI + slow-MA base condition, before any filters.
    fn base_direction(&self, indicators: &IndicatorSet) -> Option<Direction> {
        let above_slow_ma = indicators.close > indicators.ma_slow;
        let below_slow_ma = indicators.close < indicators.ma_slow;

        match self.config.rsi_thresholds {
            RsiThresholds::Reversal { oversold, overbought } => {
                if indicators.rsi <= oversold && above_slow_ma {
                    Some(Direction::Long)
                } else if indicators.rsi >= overbought && below_slow_ma {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
            RsiThresholds::Momentum { long_above, short_below } => {
                if indicators.rsi >= long_above && above_slow_ma {
                    Some(Direction::Long)
                } else if indicators.rsi <= short_below && below_slow_ma {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
        }
    }

    fn base_trigger(&self, direction: Direction) -> String {
        match (direction, &self.config.rsi_thresholds) {
            (Direction::Long, RsiThresholds::Reversal { .. }) => {
                "rsi oversold + price above slow ma".to_string()
            }
            (Direction::Short, RsiThresholds::Reversal { .. }) => {
                "rsi overbought + price below slow ma".to_string()
            }
            (Direction::Long, RsiThresholds::Momentum { .. }) => {
                "rsi momentum + price above slow ma".to_string()
            }
            (Direction::Short, RsiThresholds::Momentum { .. }) => {
                "rsi momentum + price below slow ma".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn long_setup() -> IndicatorSet {
        IndicatorSet {
            symbol: "XRPUSDT".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            close: dec!(105),
            rsi: 30.0,
            ma_fast: dec!(101),
            ma_slow: dec!(100),
            adx: 30.0,
            relative_volume: 1.5,
            volatility: 0.01,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn long_signal_when_all_filters_pass() {
        let evaluator = SignalEvaluator::new(StrategyConfig::default());
        let signal = evaluator.evaluate(&long_setup(), None, now()).unwrap();
        assert_eq!(signal.direction, Direction::Long);
        assert!(signal.confidence > 0.9);
        assert!(!signal.triggers.is_empty());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let evaluator = SignalEvaluator::new(StrategyConfig::default());
        let a = evaluator.evaluate(&long_setup(), None, now());
        let b = evaluator.evaluate(&long_setup(), None, now());
        match (a, b) {
            (Some(x), Some(y)) => {
                assert_eq!(x.direction, y.direction);
                assert!((x.confidence - y.confidence).abs() < f64::EPSILON);
                assert_eq!(x.triggers, y.triggers);
            }
            other => panic!("expected two identical signals, got {other:?}"),
        }
    }

    #[test]
    fn every_enabled_filter_is_a_hard_and() {
        let evaluator = SignalEvaluator::new(StrategyConfig::default());

        let mut weak_trend = long_setup();
        weak_trend.adx = 20.0;
        assert!(evaluator.evaluate(&weak_trend, None, now()).is_none());

        let mut thin_volume = long_setup();
        thin_volume.relative_volume = 1.0;
        assert!(evaluator.evaluate(&thin_volume, None, now()).is_none());

        let mut too_volatile = long_setup();
        too_volatile.volatility = 0.10;
        assert!(evaluator.evaluate(&too_volatile, None, now()).is_none());

        let mut wrong_side_of_ma = long_setup();
        wrong_side_of_ma.close = dec!(99);
        wrong_side_of_ma.ma_slow = dec!(100);
        assert!(evaluator.evaluate(&wrong_side_of_ma, None, now()).is_none());
    }

    #[test]
    fn disabled_filters_are_skipped() {
        let mut config = StrategyConfig::default();
        config.adx_threshold = None;
        config.relative_volume_threshold = None;
        config.max_volatility = None;
        let evaluator = SignalEvaluator::new(config);

        let mut indicators = long_setup();
        indicators.adx = 5.0;
        indicators.relative_volume = 0.2;
        indicators.volatility = 0.5;
        let signal = evaluator.evaluate(&indicators, None, now()).unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn short_is_the_mirror_condition() {
        let evaluator = SignalEvaluator::new(StrategyConfig::default());
        let mut indicators = long_setup();
        indicators.rsi = 70.0;
        indicators.close = dec!(95);
        indicators.ma_slow = dec!(100);
        let signal = evaluator.evaluate(&indicators, None, now()).unwrap();
        assert_eq!(signal.direction, Direction::Short);
    }

    #[test]
    fn opposite_open_position_suppresses_signal() {
        let evaluator = SignalEvaluator::new(StrategyConfig::default());
        let suppressed = evaluator.evaluate(&long_setup(), Some(Direction::Short), now());
        assert!(suppressed.is_none());

        // Same-direction position does not suppress; the position book's
        // idempotency guard handles the duplicate.
        let same = evaluator.evaluate(&long_setup(), Some(Direction::Long), now());
        assert!(same.is_some());
    }

    #[test]
    fn reversal_config_allows_opposing_signal() {
        let mut config = StrategyConfig::default();
        config.reverse_on_signal = true;
        let evaluator = SignalEvaluator::new(config);
        let signal = evaluator.evaluate(&long_setup(), Some(Direction::Short), now());
        assert_eq!(signal.unwrap().direction, Direction::Long);
    }

    #[test]
    fn momentum_variant_inverts_rsi_logic() {
        let mut config = StrategyConfig::default();
        config.rsi_thresholds = RsiThresholds::momentum_default();
        let evaluator = SignalEvaluator::new(config);

        // RSI 30 no longer qualifies for a long under momentum thresholds.
        assert!(evaluator.evaluate(&long_setup(), None, now()).is_none());

        let mut momentum_long = long_setup();
        momentum_long.rsi = 65.0;
        let signal = evaluator.evaluate(&momentum_long, None, now()).unwrap();
        assert_eq!(signal.direction, Direction::Long);
    }

    #[test]
    fn session_filter_blocks_out_of_hours_entries() {
        let mut config = StrategyConfig::default();
        config.allowed_hours = Some(vec![14, 15]);
        let evaluator = SignalEvaluator::new(config);
        assert!(evaluator.evaluate(&long_setup(), None, now()).is_none());

        let in_session = Utc.with_ymd_and_hms(2026, 3, 1, 14, 5, 0).unwrap();
        assert!(evaluator.evaluate(&long_setup(), None, in_session).is_some());
    }
}
