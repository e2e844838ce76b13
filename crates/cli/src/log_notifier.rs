//! Notifier that routes engine events to the structured log.
//!
//! Stands in for an external chat transport; the event surface is identical
//! so swapping in a real transport is a drop-in change.

use async_trait::async_trait;
use perpbot_core::traits::{Notifier, NotifyEvent};

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotifyEvent) {
        match event {
            NotifyEvent::SignalGenerated(signal) => {
                tracing::info!(
                    symbol = %signal.symbol,
                    direction = ?signal.direction,
                    price = %signal.price,
                    confidence = signal.confidence,
                    "signal"
                );
            }
            NotifyEvent::PositionOpened(position) => {
                tracing::info!(
                    symbol = %position.symbol,
                    id = %position.id,
                    direction = ?position.direction,
                    entry = %position.entry_price,
                    size = %position.size,
                    "position opened"
                );
            }
            NotifyEvent::PositionClosed(record) => {
                tracing::info!(
                    symbol = %record.symbol,
                    id = %record.position_id,
                    pnl = %record.pnl,
                    reason = ?record.exit_reason,
                    "position closed"
                );
            }
            NotifyEvent::PositionFailed { position, reason } => {
                tracing::error!(
                    symbol = %position.symbol,
                    id = %position.id,
                    reason,
                    "position failed, manual reconciliation required"
                );
            }
            NotifyEvent::TradingHalted { reason, at } => {
                tracing::warn!(reason, %at, "trading halted");
            }
            NotifyEvent::TradingResumed { at } => {
                tracing::info!(%at, "trading resumed");
            }
            NotifyEvent::SystemStatus { status, detail } => {
                tracing::info!(status, detail, "system status");
            }
        }
    }
}
