//! Point-in-time status snapshot published on the loop's watch channel.

use chrono::{DateTime, Utc};
use perpbot_core::domain::{IndicatorSet, Position, TradeRecord};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub trading_enabled: bool,
    pub realized_pnl_today: Decimal,
    pub total_pnl: Decimal,
    pub open_position_count: usize,
    pub live_positions: Vec<Position>,
    /// Failed positions awaiting manual reconciliation.
    pub failed_positions: Vec<Position>,
    /// Most recent closed trades, newest last.
    pub recent_trades: Vec<TradeRecord>,
    /// Closed trades whose durable ledger write has not yet succeeded.
    pub pending_ledger_writes: usize,
    /// Last computed indicator set per symbol.
    pub indicators: HashMap<String, IndicatorSet>,
    pub generated_at: DateTime<Utc>,
}

impl EngineStatus {
    /// Initial value before the first cycle has run.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            trading_enabled: true,
            realized_pnl_today: Decimal::ZERO,
            total_pnl: Decimal::ZERO,
            open_position_count: 0,
            live_positions: Vec::new(),
            failed_positions: Vec::new(),
            recent_trades: Vec::new(),
            pending_ledger_writes: 0,
            indicators: HashMap::new(),
            generated_at: Utc::now(),
        }
    }

    /// True when nothing needs operator attention.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.failed_positions.is_empty() && self.pending_ledger_writes == 0
    }
}
