//! Contracts the engine consumes from external collaborators.
//!
//! The engine defines these interfaces; transports (exchange REST/WebSocket,
//! chat notifiers, durable storage) implement them elsewhere.

use crate::domain::{
    Candle, FillStatus, OrderHandle, OrderProposal, Position, Signal, TradeRecord,
};
use crate::error::{GatewayError, SnapshotUnavailable};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Supplies timestamped OHLCV candles per symbol, newest last.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Returns up to `count` most recent candles for `symbol`, ordered by
    /// timestamp ascending.
    async fn candles(&self, symbol: &str, count: usize) -> Result<Vec<Candle>, SnapshotUnavailable>;
}

/// Places and queries orders on the exchange.
///
/// Every call must carry its own timeout; callers do not hold position locks
/// across these awaits. `client_order_id` is chosen by the caller before the
/// first attempt so that an order whose submission outcome is ambiguous can
/// be found again by a reconciliation query.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Submits an entry order built from an approved proposal.
    async fn submit_order(
        &self,
        proposal: &OrderProposal,
        client_order_id: &str,
    ) -> Result<OrderHandle, GatewayError>;

    /// Reports the current fill state of a previously submitted order.
    /// Used both for fill confirmation and for reconciliation after an
    /// ambiguous submit; `FillStatus::Unknown` proves the order was never
    /// placed.
    async fn query_order(&self, handle: &OrderHandle) -> Result<FillStatus, GatewayError>;

    /// Submits a market order closing the given position.
    async fn close_position(
        &self,
        position: &Position,
        client_order_id: &str,
    ) -> Result<OrderHandle, GatewayError>;

    /// Current account equity in quote currency.
    async fn account_equity(&self) -> Result<Decimal, GatewayError>;
}

/// Events surfaced to the (external) notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotifyEvent {
    SignalGenerated(Signal),
    PositionOpened(Position),
    PositionClosed(TradeRecord),
    /// A position landed in `Failed` and needs manual reconciliation.
    PositionFailed { position: Position, reason: String },
    TradingHalted { reason: String, at: DateTime<Utc> },
    TradingResumed { at: DateTime<Utc> },
    SystemStatus { status: String, detail: String },
}

/// Fire-and-forget notification sink. Failures are logged by implementations
/// and must never block or fail trading logic.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: NotifyEvent);
}

/// Durable sink for closed trades.
///
/// At-least-once delivery is acceptable; `position_id` is the idempotency key.
/// A position is not considered fully closed until the append succeeds.
#[async_trait]
pub trait LedgerSink: Send + Sync {
    async fn append(&self, record: &TradeRecord) -> anyhow::Result<()>;
}

/// No-op notifier for tests and headless runs.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, event: NotifyEvent) {
        tracing::debug!(?event, "notification dropped (null notifier)");
    }
}
