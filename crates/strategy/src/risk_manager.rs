//! Risk manager: turns a qualifying signal into a sized order proposal or an
//! explicit rejection. Rejections are results, not exceptions; nothing here
//! talks to the exchange.

use chrono::{DateTime, Utc};
use perpbot_core::config::{PositionSizing, RiskConfig};
use perpbot_core::domain::{Direction, OrderProposal, Signal};
use perpbot_core::error::RejectReason;
use perpbot_core::risk_state::{RiskState, TradingSwitch};
use rust_decimal::Decimal;
use std::str::FromStr;

pub struct RiskManager {
    config: RiskConfig,
    stop_loss_pct: Decimal,
    take_profit_pct: Decimal,
    max_risk_pct: Decimal,
}

impl RiskManager {
    /// Creates a risk manager from the validated risk configuration.
    ///
    /// # Panics
    /// Panics if the configured percentages cannot be represented as
    /// `Decimal`; `BotConfig::validate` bounds them to (0, 1) first.
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        let stop_loss_pct = Decimal::from_str(&config.stop_loss_pct.to_string()).unwrap();
        let take_profit_pct = Decimal::from_str(&config.take_profit_pct.to_string()).unwrap();
        let max_risk_pct = Decimal::from_str(&config.max_risk_per_trade_pct.to_string()).unwrap();
        Self {
            config,
            stop_loss_pct,
            take_profit_pct,
            max_risk_pct,
        }
    }

    /// Evaluates a signal against the risk limits and produces a proposal.
    ///
    /// The caller must hold the `RiskState` lock for the whole call: on
    /// success an open-position slot has been reserved and must be released
    /// if the entry is later abandoned.
    ///
    /// # Errors
    /// `RejectReason` describing the limit that blocked the trade. No slot is
    /// reserved on rejection.
    pub fn propose(
        &self,
        signal: &Signal,
        account_equity: Decimal,
        state: &mut RiskState,
        switch: &TradingSwitch,
        now: DateTime<Utc>,
    ) -> Result<OrderProposal, RejectReason> {
        if !switch.is_enabled() {
            return Err(RejectReason::TradingDisabled);
        }
        if state.daily_loss_hit(self.config.daily_loss_limit, now) {
            return Err(RejectReason::DailyLossLimitReached);
        }
        if account_equity <= Decimal::ZERO {
            return Err(RejectReason::InsufficientEquity);
        }

        let margin = match &self.config.sizing {
            PositionSizing::FixedMargin { margin } => *margin,
            PositionSizing::EquityPct { pct } => {
                account_equity * Decimal::from_str(&pct.to_string()).unwrap_or(Decimal::ZERO)
            }
        };
        if margin > account_equity {
            return Err(RejectReason::InsufficientEquity);
        }

        let notional = margin * Decimal::from(self.config.leverage);
        let quantity = notional / signal.price;

        // Worst-case loss at the stop. Proposals over budget are rejected,
        // never clamped.
        let stop_distance = signal.price * self.stop_loss_pct;
        let max_risk_amount = stop_distance * quantity;
        let risk_budget = account_equity * self.max_risk_pct;
        if max_risk_amount > risk_budget {
            tracing::warn!(
                symbol = %signal.symbol,
                risk = %max_risk_amount,
                budget = %risk_budget,
                "proposal exceeds per-trade risk budget"
            );
            return Err(RejectReason::RiskBudgetExceeded);
        }

        if !state.try_reserve_slot(self.config.max_positions) {
            return Err(RejectReason::MaxPositionsReached);
        }

        let (stop_loss_price, take_profit_price) = match signal.direction {
            Direction::Long => (
                signal.price * (Decimal::ONE - self.stop_loss_pct),
                signal.price * (Decimal::ONE + self.take_profit_pct),
            ),
            Direction::Short => (
                signal.price * (Decimal::ONE + self.stop_loss_pct),
                signal.price * (Decimal::ONE - self.take_profit_pct),
            ),
        };

        Ok(OrderProposal {
            symbol: signal.symbol.clone(),
            direction: signal.direction,
            quantity,
            notional,
            leverage: self.config.leverage,
            entry_price: signal.price,
            stop_loss_price,
            take_profit_price,
            max_risk_amount,
            timestamp: signal.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal(price: Decimal, direction: Direction) -> Signal {
        Signal {
            symbol: "XRPUSDT".to_string(),
            timestamp: Utc::now(),
            direction,
            price,
            confidence: 1.0,
            triggers: vec!["test".to_string()],
        }
    }

    fn manager() -> RiskManager {
        RiskManager::new(RiskConfig::default())
    }

    #[test]
    fn scenario_equity_1000_risk_1pct_stop_2pct() {
        // Defaults: 10% equity margin, 5x leverage -> $500 notional.
        // Risk at the stop: 500 * 0.02 = $10 = exactly the 1% budget.
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);
        let proposal = manager()
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap();

        assert_eq!(proposal.notional, dec!(500));
        assert_eq!(proposal.quantity, dec!(5));
        assert_eq!(proposal.max_risk_amount, dec!(10));
        assert!(proposal.max_risk_amount <= dec!(1000) * dec!(0.01));
        assert_eq!(proposal.stop_loss_price, dec!(98));
        assert_eq!(proposal.take_profit_price, dec!(103));
    }

    #[test]
    fn over_budget_proposal_rejected_not_clamped() {
        let mut config = RiskConfig::default();
        // 50% margin at 5x -> 250% notional -> 5% risk at a 2% stop.
        config.sizing = PositionSizing::EquityPct { pct: 0.50 };
        let manager = RiskManager::new(config);
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);

        let err = manager
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap_err();
        assert_eq!(err, RejectReason::RiskBudgetExceeded);
        // No slot was reserved for the rejected proposal.
        assert_eq!(state.open_position_count, 0);
    }

    #[test]
    fn trading_disabled_blocks_entries() {
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(false);
        let err = manager()
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap_err();
        assert_eq!(err, RejectReason::TradingDisabled);
    }

    #[test]
    fn daily_loss_limit_halts_new_proposals() {
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);
        state.record_realized_pnl(dec!(-150), Utc::now());

        let err = manager()
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap_err();
        assert_eq!(err, RejectReason::DailyLossLimitReached);
    }

    #[test]
    fn max_positions_enforced_via_slot_reservation() {
        let mut config = RiskConfig::default();
        config.max_positions = 1;
        let manager = RiskManager::new(config);
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);

        assert!(manager
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .is_ok());
        let err = manager
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap_err();
        assert_eq!(err, RejectReason::MaxPositionsReached);
    }

    #[test]
    fn zero_equity_rejected() {
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);
        let err = manager()
            .propose(&signal(dec!(100), Direction::Long), Decimal::ZERO, &mut state, &switch, Utc::now())
            .unwrap_err();
        assert_eq!(err, RejectReason::InsufficientEquity);
    }

    #[test]
    fn fixed_margin_above_equity_rejected() {
        let mut config = RiskConfig::default();
        config.sizing = PositionSizing::FixedMargin { margin: dec!(5000) };
        let manager = RiskManager::new(config);
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);

        let err = manager
            .propose(&signal(dec!(100), Direction::Long), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap_err();
        assert_eq!(err, RejectReason::InsufficientEquity);
    }

    #[test]
    fn short_stop_and_take_profit_mirror_long() {
        let mut state = RiskState::new(Utc::now());
        let switch = TradingSwitch::new(true);
        let proposal = manager()
            .propose(&signal(dec!(100), Direction::Short), dec!(1000), &mut state, &switch, Utc::now())
            .unwrap();
        assert_eq!(proposal.stop_loss_price, dec!(102));
        assert_eq!(proposal.take_profit_price, dec!(97));
    }
}
