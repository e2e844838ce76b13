//! Position lifecycle state machine.
//!
//! `PositionBook` is the single authoritative owner of every live position.
//! At most one position per symbol may be non-terminal; the entry guard is
//! keyed by symbol, not by generated id, because submit retries can race
//! before an id is durably recorded. Callers serialize access through one
//! exclusive lock and must not hold it across gateway calls.

use crate::domain::{
    Direction, ExitReason, OrderProposal, Position, PositionStatus, TradeRecord,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum PositionError {
    /// A non-terminal position already owns this symbol. Expected under
    /// signal races; the duplicate entry is rejected, not queued.
    #[error("duplicate entry rejected: {symbol} already has a live position")]
    DuplicateEntry { symbol: String },

    /// New entries for this symbol are halted after an invariant violation.
    #[error("entries blocked for {symbol}: {reason}")]
    EntriesBlocked { symbol: String, reason: String },

    /// A failed position awaits manual reconciliation before re-entry.
    #[error("{symbol} has a failed position awaiting reconciliation")]
    AwaitingReconciliation { symbol: String },

    #[error("invalid transition for {symbol}: {event} in state {state:?}")]
    InvalidTransition {
        symbol: String,
        state: PositionStatus,
        event: &'static str,
    },

    #[error("no live position for {symbol}")]
    NoLivePosition { symbol: String },
}

#[derive(Debug, Default)]
struct SymbolSlot {
    live: Option<Position>,
    /// Failed positions retained until acknowledged; never silently dropped.
    failed: Vec<Position>,
    /// Set when an invariant violation is detected for this symbol.
    blocked: Option<String>,
    /// Exit reason recorded when the close was requested.
    closing_reason: Option<ExitReason>,
}

/// Owns every position in the process, one slot per symbol.
#[derive(Debug, Default)]
pub struct PositionBook {
    slots: HashMap<String, SymbolSlot>,
}

impl PositionBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, symbol: &str) -> &mut SymbolSlot {
        self.slots.entry(symbol.to_string()).or_default()
    }

    /// Creates a `Pending` position from an approved proposal.
    ///
    /// # Errors
    /// Rejects the entry when the symbol already owns a non-terminal
    /// position, is blocked after an invariant violation, or holds an
    /// unreconciled failed position.
    pub fn open_pending(&mut self, proposal: &OrderProposal) -> Result<Position, PositionError> {
        let slot = self.slot_mut(&proposal.symbol);

        if let Some(reason) = &slot.blocked {
            return Err(PositionError::EntriesBlocked {
                symbol: proposal.symbol.clone(),
                reason: reason.clone(),
            });
        }
        if let Some(live) = &slot.live {
            if live.status.is_terminal() {
                // A terminal position left in the live slot means the book's
                // own bookkeeping broke. Halt entries for the symbol rather
                // than self-heal.
                let reason = format!("terminal position {} left in live slot", live.id);
                slot.blocked = Some(reason.clone());
                return Err(PositionError::EntriesBlocked {
                    symbol: proposal.symbol.clone(),
                    reason,
                });
            }
            return Err(PositionError::DuplicateEntry {
                symbol: proposal.symbol.clone(),
            });
        }
        if !slot.failed.is_empty() {
            return Err(PositionError::AwaitingReconciliation {
                symbol: proposal.symbol.clone(),
            });
        }

        let position = Position::pending(proposal);
        slot.live = Some(position.clone());
        tracing::info!(
            symbol = %position.symbol,
            id = %position.id,
            direction = ?position.direction,
            size = %position.size,
            "position pending"
        );
        Ok(position)
    }

    /// `Pending -> Open`: the gateway confirmed the entry fill.
    ///
    /// Entry price is taken from the fill, not the proposal; the stop-loss
    /// and take-profit levels are re-anchored to the actual fill price so
    /// their configured distances hold under slippage.
    ///
    /// # Errors
    /// Fails unless the symbol's live position is `Pending`.
    pub fn confirm_fill(
        &mut self,
        symbol: &str,
        fill_price: Decimal,
        fee: Decimal,
        at: DateTime<Utc>,
    ) -> Result<Position, PositionError> {
        let slot = self.slot_mut(symbol);
        let live = slot.live.as_mut().ok_or_else(|| PositionError::NoLivePosition {
            symbol: symbol.to_string(),
        })?;
        if live.status != PositionStatus::Pending {
            return Err(PositionError::InvalidTransition {
                symbol: symbol.to_string(),
                state: live.status,
                event: "confirm_fill",
            });
        }

        let sl_ratio = live.stop_loss_price / live.entry_price;
        let tp_ratio = live.take_profit_price / live.entry_price;
        live.entry_price = fill_price;
        live.stop_loss_price = fill_price * sl_ratio;
        live.take_profit_price = fill_price * tp_ratio;
        live.fees += fee;
        live.opened_at = at;
        live.status = PositionStatus::Open;
        tracing::info!(
            symbol,
            id = %live.id,
            entry = %live.entry_price,
            stop = %live.stop_loss_price,
            take_profit = %live.take_profit_price,
            "position open"
        );
        Ok(live.clone())
    }

    /// `Open -> ClosingRequested`: an exit was triggered by a stop/take-profit
    /// cross, a manual close, or a configured signal reversal.
    ///
    /// # Errors
    /// Fails unless the symbol's live position is `Open`.
    pub fn request_close(
        &mut self,
        symbol: &str,
        reason: ExitReason,
    ) -> Result<Position, PositionError> {
        let slot = self.slot_mut(symbol);
        let live = slot.live.as_mut().ok_or_else(|| PositionError::NoLivePosition {
            symbol: symbol.to_string(),
        })?;
        if live.status != PositionStatus::Open {
            return Err(PositionError::InvalidTransition {
                symbol: symbol.to_string(),
                state: live.status,
                event: "request_close",
            });
        }
        live.status = PositionStatus::ClosingRequested;
        slot.closing_reason = Some(reason);
        tracing::info!(symbol, id = %live.id, ?reason, "close requested");
        Ok(live.clone())
    }

    /// `ClosingRequested -> Closed`: the gateway confirmed the close fill.
    /// Returns the trade record to append to the ledger.
    ///
    /// # Errors
    /// Fails unless the symbol's live position is `ClosingRequested`.
    pub fn confirm_closed(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        fee: Decimal,
        at: DateTime<Utc>,
    ) -> Result<TradeRecord, PositionError> {
        let slot = self.slot_mut(symbol);
        let live = slot.live.as_mut().ok_or_else(|| PositionError::NoLivePosition {
            symbol: symbol.to_string(),
        })?;
        if live.status != PositionStatus::ClosingRequested {
            return Err(PositionError::InvalidTransition {
                symbol: symbol.to_string(),
                state: live.status,
                event: "confirm_closed",
            });
        }
        live.fees += fee;
        live.status = PositionStatus::Closed;
        let reason = slot.closing_reason.take().unwrap_or(ExitReason::Manual);
        let record = TradeRecord::from_exit(live, exit_price, reason, at);
        slot.live = None;
        tracing::info!(
            symbol,
            id = %record.position_id,
            pnl = %record.pnl,
            ?reason,
            "position closed"
        );
        Ok(record)
    }

    /// Removes a `Pending` position whose entry order provably never reached
    /// the exchange (a definitive rejection before placement). The symbol is
    /// immediately free for new entries; there is nothing to reconcile.
    ///
    /// # Errors
    /// Fails unless the symbol's live position is `Pending`.
    pub fn abandon_pending(&mut self, symbol: &str) -> Result<Position, PositionError> {
        let slot = self.slot_mut(symbol);
        match &slot.live {
            Some(live) if live.status == PositionStatus::Pending => {}
            Some(live) => {
                return Err(PositionError::InvalidTransition {
                    symbol: symbol.to_string(),
                    state: live.status,
                    event: "abandon_pending",
                });
            }
            None => {
                return Err(PositionError::NoLivePosition {
                    symbol: symbol.to_string(),
                });
            }
        }
        let live = slot.live.take().ok_or_else(|| PositionError::NoLivePosition {
            symbol: symbol.to_string(),
        })?;
        tracing::info!(symbol, id = %live.id, "pending entry abandoned, order never placed");
        Ok(live)
    }

    /// Any non-terminal state -> `Failed` on an unrecoverable gateway error.
    ///
    /// The position is retained, flagged for manual reconciliation; the
    /// caller releases its risk slot so the process does not wedge.
    ///
    /// # Errors
    /// Fails if the symbol has no live position.
    pub fn mark_failed(&mut self, symbol: &str, reason: &str) -> Result<Position, PositionError> {
        let slot = self.slot_mut(symbol);
        let mut live = slot.live.take().ok_or_else(|| PositionError::NoLivePosition {
            symbol: symbol.to_string(),
        })?;
        live.status = PositionStatus::Failed;
        slot.closing_reason = None;
        slot.failed.push(live.clone());
        tracing::error!(symbol, id = %live.id, reason, "position failed, awaiting reconciliation");
        Ok(live)
    }

    /// Clears a reconciled failed position, unblocking entries for the symbol.
    ///
    /// # Errors
    /// Fails when no failed position with that id exists.
    pub fn acknowledge_failed(&mut self, symbol: &str, id: Uuid) -> Result<(), PositionError> {
        let slot = self.slot_mut(symbol);
        let before = slot.failed.len();
        slot.failed.retain(|p| p.id != id);
        if slot.failed.len() == before {
            return Err(PositionError::NoLivePosition {
                symbol: symbol.to_string(),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn live(&self, symbol: &str) -> Option<&Position> {
        self.slots.get(symbol).and_then(|s| s.live.as_ref())
    }

    /// Direction of the symbol's non-terminal position, if any. Fed to the
    /// evaluator so it never proposes a conflicting direction.
    #[must_use]
    pub fn live_direction(&self, symbol: &str) -> Option<Direction> {
        self.live(symbol).map(|p| p.direction)
    }

    #[must_use]
    pub fn failed(&self, symbol: &str) -> &[Position] {
        self.slots.get(symbol).map_or(&[], |s| s.failed.as_slice())
    }

    /// True when any symbol holds a non-terminal position. Drives the loop's
    /// active/idle cadence.
    #[must_use]
    pub fn any_non_terminal(&self) -> bool {
        self.slots.values().any(|s| s.live.is_some())
    }

    #[must_use]
    pub fn entries_blocked(&self, symbol: &str) -> bool {
        self.slots.get(symbol).is_some_and(|s| s.blocked.is_some())
    }

    /// Snapshot of all live positions for the status surface.
    #[must_use]
    pub fn live_positions(&self) -> Vec<Position> {
        self.slots.values().filter_map(|s| s.live.clone()).collect()
    }

    /// Snapshot of all failed positions awaiting reconciliation.
    #[must_use]
    pub fn failed_positions(&self) -> Vec<Position> {
        self.slots.values().flat_map(|s| s.failed.iter().cloned()).collect()
    }
}
