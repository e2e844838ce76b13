use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable bot configuration, validated once at startup and passed
/// explicitly to each component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Symbols traded independently by the monitoring loop.
    pub symbols: Vec<String>,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub schedule: ScheduleConfig,
    pub execution: ExecutionConfig,
}

/// RSI entry thresholds. The source strategy shipped two revisions with
/// opposite RSI logic; both are kept as explicitly named variants rather
/// than guessing which is correct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum RsiThresholds {
    /// Mean-reversion entries: long when RSI <= `oversold`, short when
    /// RSI >= `overbought`.
    Reversal { oversold: f64, overbought: f64 },
    /// Momentum entries: long when RSI >= `long_above`, short when
    /// RSI <= `short_below`.
    Momentum { long_above: f64, short_below: f64 },
}

impl RsiThresholds {
    #[must_use]
    pub const fn reversal_default() -> Self {
        Self::Reversal {
            oversold: 35.0,
            overbought: 65.0,
        }
    }

    #[must_use]
    pub const fn momentum_default() -> Self {
        Self::Momentum {
            long_above: 62.0,
            short_below: 39.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub rsi_period: usize,
    pub ma_fast_period: usize,
    pub ma_slow_period: usize,
    pub adx_period: usize,
    /// Trailing window for relative volume and volatility.
    pub stat_window: usize,
    pub rsi_thresholds: RsiThresholds,
    /// Minimum ADX for the trend-strength filter; `None` disables it.
    pub adx_threshold: Option<f64>,
    /// Minimum current/average volume ratio; `None` disables it.
    pub relative_volume_threshold: Option<f64>,
    /// Volatility ceiling (stddev of returns); `None` disables it.
    pub max_volatility: Option<f64>,
    /// Allowed UTC hours for new entries; `None` trades around the clock.
    pub allowed_hours: Option<Vec<u32>>,
    /// When set, an opposite signal against an open position requests a
    /// close instead of being suppressed.
    pub reverse_on_signal: bool,
}

impl StrategyConfig {
    /// Minimum candle history the indicator calculator needs. ADX smooths
    /// rolling means twice, so it dominates for typical settings.
    #[must_use]
    pub fn required_lookback(&self) -> usize {
        [
            self.rsi_period + 1,
            self.ma_fast_period,
            self.ma_slow_period,
            2 * self.adx_period + 1,
            self.stat_window + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            ma_fast_period: 50,
            ma_slow_period: 53,
            adx_period: 14,
            stat_window: 20,
            rsi_thresholds: RsiThresholds::reversal_default(),
            adx_threshold: Some(25.0),
            relative_volume_threshold: Some(1.3),
            max_volatility: Some(0.03),
            allowed_hours: None,
            reverse_on_signal: false,
        }
    }
}

/// How the notional size of a new position is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PositionSizing {
    /// Fixed margin in quote currency; notional = margin * leverage.
    FixedMargin { margin: Decimal },
    /// Percentage of current account equity used as margin.
    EquityPct { pct: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub sizing: PositionSizing,
    pub leverage: u8,
    /// Per-trade worst-case loss as a fraction of equity (0.01 = 1%).
    pub max_risk_per_trade_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_positions: usize,
    /// Daily realized-loss halt threshold in quote currency.
    pub daily_loss_limit: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            sizing: PositionSizing::EquityPct { pct: 0.10 },
            leverage: 5,
            max_risk_per_trade_pct: 0.01,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.03,
            max_positions: 3,
            daily_loss_limit: Decimal::from(100),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Tick interval while no position is open or pending.
    pub idle_interval_secs: u64,
    /// Tick interval while any position is non-terminal.
    pub active_interval_secs: u64,
    /// Candles fetched per tick; must cover the strategy lookback.
    pub candle_count: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            idle_interval_secs: 300,
            active_interval_secs: 60,
            candle_count: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Maximum attempts for transient gateway failures.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Per-call gateway timeout.
    pub gateway_timeout_ms: u64,
    pub paper_commission_rate: f64,
    pub paper_slippage_bps: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            gateway_timeout_ms: 10_000,
            paper_commission_rate: 0.001,
            paper_slippage_bps: 5.0,
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "XRPUSDT".to_string(), "ETHUSDT".to_string()],
            strategy: StrategyConfig::default(),
            risk: RiskConfig::default(),
            schedule: ScheduleConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl BotConfig {
    /// Validates the whole configuration, reporting every violation at once.
    ///
    /// # Errors
    /// Returns `EngineError::Config` listing each failed check.
    pub fn validate(&self) -> crate::error::Result<()> {
        let mut problems = Vec::new();

        if self.symbols.is_empty() {
            problems.push("at least one symbol is required".to_string());
        }
        if self.strategy.rsi_period == 0 {
            problems.push("rsi_period must be positive".to_string());
        }
        if self.strategy.ma_fast_period == 0 || self.strategy.ma_slow_period == 0 {
            problems.push("moving average periods must be positive".to_string());
        }
        if self.strategy.stat_window == 0 {
            problems.push("stat_window must be positive".to_string());
        }
        if let Some(hours) = &self.strategy.allowed_hours {
            if hours.iter().any(|h| *h > 23) {
                problems.push("allowed_hours entries must be 0-23".to_string());
            }
            if hours.is_empty() {
                problems.push("allowed_hours must not be empty when set".to_string());
            }
        }
        if self.risk.leverage == 0 || self.risk.leverage > 50 {
            problems.push("leverage must be between 1 and 50".to_string());
        }
        if !(0.0..1.0).contains(&self.risk.max_risk_per_trade_pct)
            || self.risk.max_risk_per_trade_pct == 0.0
        {
            problems.push("max_risk_per_trade_pct must be in (0, 1)".to_string());
        }
        if !(0.0..1.0).contains(&self.risk.stop_loss_pct) || self.risk.stop_loss_pct == 0.0 {
            problems.push("stop_loss_pct must be in (0, 1)".to_string());
        }
        if !(0.0..1.0).contains(&self.risk.take_profit_pct) || self.risk.take_profit_pct == 0.0 {
            problems.push("take_profit_pct must be in (0, 1)".to_string());
        }
        if self.risk.max_positions == 0 {
            problems.push("max_positions must be positive".to_string());
        }
        if self.risk.daily_loss_limit <= Decimal::ZERO {
            problems.push("daily_loss_limit must be positive".to_string());
        }
        match &self.risk.sizing {
            PositionSizing::FixedMargin { margin } if *margin <= Decimal::ZERO => {
                problems.push("fixed margin must be positive".to_string());
            }
            PositionSizing::EquityPct { pct } if !(*pct > 0.0 && *pct <= 1.0) => {
                problems.push("equity pct must be in (0, 1]".to_string());
            }
            _ => {}
        }
        if self.schedule.candle_count < self.strategy.required_lookback() {
            problems.push(format!(
                "candle_count {} is below the strategy lookback {}",
                self.schedule.candle_count,
                self.strategy.required_lookback()
            ));
        }
        if self.schedule.idle_interval_secs == 0 || self.schedule.active_interval_secs == 0 {
            problems.push("schedule intervals must be positive".to_string());
        }
        if self.execution.max_attempts == 0 {
            problems.push("max_attempts must be positive".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(crate::error::EngineError::Config(problems.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        assert!(BotConfig::default().validate().is_ok());
    }

    #[test]
    fn lookback_dominated_by_ma_slow_for_defaults() {
        let strategy = StrategyConfig::default();
        // 53 slow MA beats 2*14+1 ADX and 21 stat window.
        assert_eq!(strategy.required_lookback(), 53);
    }

    #[test]
    fn candle_count_below_lookback_rejected() {
        let mut config = BotConfig::default();
        config.schedule.candle_count = 10;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("lookback"));
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut config = BotConfig::default();
        config.symbols.clear();
        config.risk.leverage = 0;
        config.risk.daily_loss_limit = dec!(-5);
        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("symbol"));
        assert!(msg.contains("leverage"));
        assert!(msg.contains("daily_loss_limit"));
    }

    #[test]
    fn both_threshold_variants_roundtrip_through_serde() {
        for thresholds in [
            RsiThresholds::reversal_default(),
            RsiThresholds::momentum_default(),
        ] {
            let json = serde_json::to_string(&thresholds).unwrap();
            let back: RsiThresholds = serde_json::from_str(&json).unwrap();
            match (thresholds, back) {
                (RsiThresholds::Reversal { oversold, .. }, RsiThresholds::Reversal { oversold: o2, .. }) => {
                    assert!((oversold - o2).abs() < f64::EPSILON);
                }
                (RsiThresholds::Momentum { long_above, .. }, RsiThresholds::Momentum { long_above: l2, .. }) => {
                    assert!((long_above - l2).abs() < f64::EPSILON);
                }
                _ => panic!("variant changed across serde roundtrip"),
            }
        }
    }
}
