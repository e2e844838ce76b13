use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade direction for signals, proposals, and positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Sign multiplier for PnL arithmetic: +1 for long, -1 for short.
    #[must_use]
    pub fn sign(self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => -Decimal::ONE,
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

/// One OHLCV candle. Immutable once emitted; sequences are ordered by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Derived indicator values for the most recent candle of a series.
///
/// Recomputed every cycle and discarded; carries no persisted identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// Close of the most recent candle, kept alongside the derived values so
    /// the evaluator can compare price against the moving averages.
    pub close: Decimal,
    pub rsi: f64,
    pub ma_fast: Decimal,
    pub ma_slow: Decimal,
    pub adx: f64,
    pub relative_volume: f64,
    /// Standard deviation of close-to-close returns over the volatility window.
    pub volatility: f64,
}

/// A directional trade decision produced by the evaluator.
///
/// Consumed once by the risk manager within the same loop tick; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Last observed price, used for sizing and stop derivation.
    pub price: Decimal,
    /// Additive observability score in [0, 1]. Reported only; a failed hard
    /// filter is never bypassed by a high confidence.
    pub confidence: f64,
    /// Names of the indicator conditions that contributed to the decision.
    pub triggers: Vec<String>,
}

/// A sized order the risk manager approved for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderProposal {
    pub symbol: String,
    pub direction: Direction,
    /// Quantity in base units (notional / entry price).
    pub quantity: Decimal,
    /// Position value before leverage division.
    pub notional: Decimal,
    pub leverage: u8,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    /// Worst-case loss at the stop. Invariant: bounded by
    /// `equity * max_risk_per_trade_pct` at construction time.
    pub max_risk_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle states of a live position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Entry order submitted, fill not yet confirmed.
    Pending,
    /// Fill confirmed; stop-loss and take-profit active.
    Open,
    /// Exit order submitted, close fill not yet confirmed.
    ClosingRequested,
    Closed,
    /// Unrecoverable gateway error; flagged for manual reconciliation.
    Failed,
}

impl PositionStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// A leveraged futures position. The position book is the only writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    /// Set from the confirmed fill, not the proposal; may differ under slippage.
    pub entry_price: Decimal,
    pub size: Decimal,
    pub leverage: u8,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    /// Fees accumulated on entry and exit fills, deducted from realized PnL.
    pub fees: Decimal,
}

impl Position {
    /// Creates a `Pending` position from an approved proposal.
    #[must_use]
    pub fn pending(proposal: &OrderProposal) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: proposal.symbol.clone(),
            direction: proposal.direction,
            entry_price: proposal.entry_price,
            size: proposal.quantity,
            leverage: proposal.leverage,
            stop_loss_price: proposal.stop_loss_price,
            take_profit_price: proposal.take_profit_price,
            opened_at: proposal.timestamp,
            status: PositionStatus::Pending,
            fees: Decimal::ZERO,
        }
    }

    /// True when `price` has crossed the stop-loss level for this direction.
    #[must_use]
    pub fn stop_hit(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price <= self.stop_loss_price,
            Direction::Short => price >= self.stop_loss_price,
        }
    }

    /// True when `price` has crossed the take-profit level for this direction.
    #[must_use]
    pub fn take_profit_hit(&self, price: Decimal) -> bool {
        match self.direction {
            Direction::Long => price >= self.take_profit_price,
            Direction::Short => price <= self.take_profit_price,
        }
    }

    /// Realized PnL for an exit at `exit_price`, net of accumulated fees.
    #[must_use]
    pub fn realized_pnl(&self, exit_price: Decimal) -> Decimal {
        (exit_price - self.entry_price) * self.size * self.direction.sign() - self.fees
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
    /// Forced liquidation detected externally.
    Liquidation,
    /// Opposite signal while `reverse_on_signal` is enabled.
    Reversal,
}

/// Durable residue of a closed position. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub pnl: Decimal,
    pub fees: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    /// Builds the record for a position exiting at `exit_price`.
    #[must_use]
    pub fn from_exit(
        position: &Position,
        exit_price: Decimal,
        exit_reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            position_id: position.id,
            symbol: position.symbol.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            size: position.size,
            pnl: position.realized_pnl(exit_price),
            fees: position.fees,
            opened_at: position.opened_at,
            closed_at,
            exit_reason,
        }
    }
}

/// Opaque handle to an order accepted by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub order_id: String,
    pub symbol: String,
}

/// Fill state reported by the gateway for a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FillStatus {
    /// Order confirmed filled at `price` for `quantity` with `fee` charged.
    Filled {
        price: Decimal,
        quantity: Decimal,
        fee: Decimal,
        timestamp: DateTime<Utc>,
    },
    /// Order accepted but not yet filled.
    Working,
    /// Order cancelled or expired without a fill.
    Cancelled,
    /// The gateway has no record of the order. After an ambiguous submit this
    /// proves the order was never placed.
    Unknown,
}
