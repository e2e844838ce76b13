//! Process-wide risk counters and the trading kill switch.
//!
//! `RiskState` is shared behind one exclusive lock; every mutation goes
//! through it so the daily loss halt and the position-count cap hold even
//! when symbols are evaluated concurrently.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Global trading-enabled flag.
///
/// Checked before any new entry, never before an exit: open positions are
/// always allowed to close. Safe to flip from any thread.
#[derive(Debug, Clone, Default)]
pub struct TradingSwitch {
    enabled: Arc<AtomicBool>,
}

impl TradingSwitch {
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }
}

/// Daily risk counters, reset at the UTC day boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub realized_pnl_today: Decimal,
    pub open_position_count: usize,
    pub last_reset_at: DateTime<Utc>,
    trading_day: NaiveDate,
}

impl RiskState {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            realized_pnl_today: Decimal::ZERO,
            open_position_count: 0,
            last_reset_at: now,
            trading_day: now.date_naive(),
        }
    }

    /// Rolls the daily counters forward if `now` is past the UTC boundary.
    /// Open-position count survives the reset; only realized PnL is daily.
    pub fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today > self.trading_day {
            tracing::info!(
                pnl = %self.realized_pnl_today,
                day = %self.trading_day,
                "daily risk counters reset"
            );
            self.realized_pnl_today = Decimal::ZERO;
            self.trading_day = today;
            self.last_reset_at = now;
        }
    }

    /// True once today's realized loss has reached the limit. Trading halts
    /// for the remainder of the day.
    #[must_use]
    pub fn daily_loss_hit(&mut self, daily_loss_limit: Decimal, now: DateTime<Utc>) -> bool {
        self.roll_day(now);
        self.realized_pnl_today <= -daily_loss_limit
    }

    /// Reserves an open-position slot. Returns false when `max_positions`
    /// slots are already taken; the caller must not create a position then.
    #[must_use]
    pub fn try_reserve_slot(&mut self, max_positions: usize) -> bool {
        if self.open_position_count >= max_positions {
            return false;
        }
        self.open_position_count += 1;
        true
    }

    /// Releases a slot when a position reaches a terminal state. `Failed`
    /// positions release their slot too so the system does not wedge.
    pub fn release_slot(&mut self) {
        debug_assert!(self.open_position_count > 0, "slot release without reserve");
        self.open_position_count = self.open_position_count.saturating_sub(1);
    }

    /// Applies realized PnL from a closed trade to today's counter.
    pub fn record_realized_pnl(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.roll_day(now);
        self.realized_pnl_today += pnl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn slot_reservation_caps_open_positions() {
        let mut state = RiskState::new(at(1, 0));
        assert!(state.try_reserve_slot(2));
        assert!(state.try_reserve_slot(2));
        assert!(!state.try_reserve_slot(2));
        state.release_slot();
        assert!(state.try_reserve_slot(2));
    }

    #[test]
    fn daily_loss_halts_until_next_day() {
        let mut state = RiskState::new(at(1, 9));
        state.record_realized_pnl(dec!(-120), at(1, 10));
        assert!(state.daily_loss_hit(dec!(100), at(1, 11)));
        // Later the same day: still halted.
        assert!(state.daily_loss_hit(dec!(100), at(1, 23)));
        // Next UTC day: counters reset, trading allowed again.
        assert!(!state.daily_loss_hit(dec!(100), at(2, 0)));
        assert_eq!(state.realized_pnl_today, Decimal::ZERO);
    }

    #[test]
    fn open_count_survives_daily_reset() {
        let mut state = RiskState::new(at(1, 9));
        assert!(state.try_reserve_slot(3));
        state.roll_day(at(1, 9) + Duration::days(1));
        assert_eq!(state.open_position_count, 1);
    }

    #[test]
    fn trading_switch_flips_atomically() {
        let switch = TradingSwitch::new(true);
        let clone = switch.clone();
        clone.disable();
        assert!(!switch.is_enabled());
        switch.enable();
        assert!(clone.is_enabled());
    }
}
