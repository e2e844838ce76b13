//! Trade engine: one tick runs the full snapshot -> indicators -> signal ->
//! risk -> execution -> lifecycle pipeline for a symbol.
//!
//! Shared state (position book, risk counters, ledger) sits behind async
//! locks that are never held across a gateway call; a gateway await always
//! happens between lock scopes, and the state transition it justifies is
//! re-validated by the position book when the lock is reacquired.

use crate::status::EngineStatus;
use chrono::{DateTime, Utc};
use perpbot_core::config::BotConfig;
use perpbot_core::domain::{
    ExitReason, FillStatus, IndicatorSet, OrderHandle, PositionStatus, Signal, TradeRecord,
};
use perpbot_core::ledger::TradeLedger;
use perpbot_core::position::{PositionBook, PositionError};
use perpbot_core::risk_state::{RiskState, TradingSwitch};
use perpbot_core::traits::{
    ExecutionGateway, LedgerSink, Notifier, NotifyEvent, SnapshotProvider,
};
use perpbot_execution::workflow::{OrderWorkflow, WorkflowError};
use perpbot_strategy::indicators;
use perpbot_strategy::{RiskManager, SignalEvaluator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct Engine {
    config: BotConfig,
    snapshots: Arc<dyn SnapshotProvider>,
    gateway: Arc<dyn ExecutionGateway>,
    workflow: OrderWorkflow,
    evaluator: SignalEvaluator,
    risk_manager: RiskManager,
    notifier: Arc<dyn Notifier>,
    switch: TradingSwitch,
    book: Mutex<PositionBook>,
    risk_state: Mutex<RiskState>,
    ledger: Mutex<TradeLedger>,
    /// Orders submitted but not yet filled, keyed by symbol. Settled at the
    /// start of the next tick if the fill was still working.
    inflight: Mutex<HashMap<String, OrderHandle>>,
    /// Most recent indicator set per symbol, for the status surface.
    last_indicators: Mutex<HashMap<String, IndicatorSet>>,
    loss_halt_announced: AtomicBool,
}

impl Engine {
    #[must_use]
    pub fn new(
        config: BotConfig,
        snapshots: Arc<dyn SnapshotProvider>,
        gateway: Arc<dyn ExecutionGateway>,
        notifier: Arc<dyn Notifier>,
        ledger_sink: Arc<dyn LedgerSink>,
    ) -> Self {
        let workflow = OrderWorkflow::new(Arc::clone(&gateway), &config.execution);
        let evaluator = SignalEvaluator::new(config.strategy.clone());
        let risk_manager = RiskManager::new(config.risk.clone());
        Self {
            config,
            snapshots,
            gateway,
            workflow,
            evaluator,
            risk_manager,
            notifier,
            switch: TradingSwitch::new(true),
            book: Mutex::new(PositionBook::new()),
            risk_state: Mutex::new(RiskState::new(Utc::now())),
            ledger: Mutex::new(TradeLedger::new(ledger_sink)),
            inflight: Mutex::new(HashMap::new()),
            last_indicators: Mutex::new(HashMap::new()),
            loss_halt_announced: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    #[must_use]
    pub fn trading_switch(&self) -> TradingSwitch {
        self.switch.clone()
    }

    /// Validates configuration and probes the gateway once before the loop
    /// starts ticking.
    ///
    /// # Errors
    /// Fails when the configuration is invalid or the gateway is unreachable.
    pub async fn startup_check(&self) -> anyhow::Result<()> {
        self.config.validate()?;
        let equity = self.gateway.account_equity().await?;
        tracing::info!(
            %equity,
            symbols = ?self.config.symbols,
            "startup check passed"
        );
        self.notifier
            .notify(NotifyEvent::SystemStatus {
                status: "started".to_string(),
                detail: format!("equity {equity}, symbols {:?}", self.config.symbols),
            })
            .await;
        Ok(())
    }

    /// Runs one full monitoring cycle for `symbol`.
    ///
    /// Failures inside a tick are logged and end the tick; the loop stays up
    /// and the next tick starts from a fresh snapshot.
    pub async fn tick(&self, symbol: &str, now: DateTime<Utc>) {
        self.settle_inflight(symbol, now).await;

        let candles = match self
            .snapshots
            .candles(symbol, self.config.schedule.candle_count)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "snapshot unavailable, skipping tick");
                return;
            }
        };
        let indicators = match indicators::compute(&candles, &self.config.strategy) {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "indicator computation failed, skipping tick");
                return;
            }
        };
        let price = indicators.close;
        self.last_indicators
            .lock()
            .await
            .insert(symbol.to_string(), indicators.clone());

        // Protective exits come before any new decision.
        let exit = {
            let book = self.book.lock().await;
            book.live(symbol).and_then(|p| {
                if p.status != PositionStatus::Open {
                    return None;
                }
                if p.stop_hit(price) {
                    Some(ExitReason::StopLoss)
                } else if p.take_profit_hit(price) {
                    Some(ExitReason::TakeProfit)
                } else {
                    None
                }
            })
        };
        if let Some(reason) = exit {
            self.close_live(symbol, reason, now).await;
            return;
        }

        let open_direction = self.book.lock().await.live_direction(symbol);
        let Some(signal) = self.evaluator.evaluate(&indicators, open_direction, now) else {
            return;
        };
        tracing::info!(
            symbol,
            direction = ?signal.direction,
            confidence = signal.confidence,
            triggers = ?signal.triggers,
            "signal generated"
        );
        self.notifier
            .notify(NotifyEvent::SignalGenerated(signal.clone()))
            .await;

        if let Some(open) = open_direction {
            if open == signal.direction.opposite() {
                // Only reachable with reverse_on_signal set; the evaluator
                // suppresses the conflict otherwise. Close now, re-enter on a
                // later tick if the signal persists.
                self.close_live(symbol, ExitReason::Reversal, now).await;
                return;
            }
        }

        self.try_enter(symbol, &signal, now).await;
    }

    /// Requests a manual close of the symbol's open position.
    ///
    /// # Errors
    /// Fails when the symbol has no open position.
    pub async fn close_manual(&self, symbol: &str) -> Result<(), PositionError> {
        {
            let book = self.book.lock().await;
            let live = book.live(symbol).ok_or_else(|| PositionError::NoLivePosition {
                symbol: symbol.to_string(),
            })?;
            if live.status != PositionStatus::Open {
                return Err(PositionError::InvalidTransition {
                    symbol: symbol.to_string(),
                    state: live.status,
                    event: "close_manual",
                });
            }
        }
        self.close_live(symbol, ExitReason::Manual, Utc::now()).await;
        Ok(())
    }

    /// Clears a reconciled failed position.
    ///
    /// # Errors
    /// Fails when no failed position with that id exists.
    pub async fn acknowledge_failed(&self, symbol: &str, id: Uuid) -> Result<(), PositionError> {
        self.book.lock().await.acknowledge_failed(symbol, id)
    }

    pub async fn pause(&self, reason: &str) {
        self.switch.disable();
        tracing::warn!(reason, "trading paused");
        self.notifier
            .notify(NotifyEvent::TradingHalted {
                reason: reason.to_string(),
                at: Utc::now(),
            })
            .await;
    }

    pub async fn resume(&self) {
        self.switch.enable();
        tracing::info!("trading resumed");
        self.notifier
            .notify(NotifyEvent::TradingResumed { at: Utc::now() })
            .await;
    }

    /// Retries queued durable ledger writes. Called once per loop cycle.
    pub async fn flush_ledger(&self) {
        self.ledger.lock().await.flush().await;
    }

    /// Interval until the next cycle: short while anything is non-terminal.
    pub async fn tick_interval(&self) -> Duration {
        let active = self.book.lock().await.any_non_terminal();
        let secs = if active {
            self.config.schedule.active_interval_secs
        } else {
            self.config.schedule.idle_interval_secs
        };
        Duration::from_secs(secs)
    }

    pub async fn status(&self) -> EngineStatus {
        let (live_positions, failed_positions) = {
            let book = self.book.lock().await;
            (book.live_positions(), book.failed_positions())
        };
        let (realized_pnl_today, open_position_count) = {
            let state = self.risk_state.lock().await;
            (state.realized_pnl_today, state.open_position_count)
        };
        let (total_pnl, recent_trades, pending_ledger_writes) = {
            let ledger = self.ledger.lock().await;
            (ledger.total_pnl(), ledger.recent(10), ledger.pending_flush())
        };
        let indicators = self.last_indicators.lock().await.clone();
        EngineStatus {
            trading_enabled: self.switch.is_enabled(),
            realized_pnl_today,
            total_pnl,
            open_position_count,
            live_positions,
            failed_positions,
            recent_trades,
            pending_ledger_writes,
            indicators,
            generated_at: Utc::now(),
        }
    }

    async fn try_enter(&self, symbol: &str, signal: &Signal, now: DateTime<Utc>) {
        let equity = match self.gateway.account_equity().await {
            Ok(equity) => equity,
            Err(e) => {
                tracing::warn!(symbol, error = %e, "equity unavailable, entry skipped");
                return;
            }
        };

        // Holds the risk lock for the whole proposal so the slot reservation
        // and the limit checks are one atomic decision.
        let proposal = {
            let mut state = self.risk_state.lock().await;
            match self
                .risk_manager
                .propose(signal, equity, &mut state, &self.switch, now)
            {
                Ok(proposal) => proposal,
                Err(reason) => {
                    tracing::info!(symbol, %reason, "entry rejected by risk policy");
                    return;
                }
            }
        };

        let opened = self.book.lock().await.open_pending(&proposal);
        let position = match opened {
            Ok(position) => position,
            Err(e) => {
                // Duplicate or blocked symbol; hand the reserved slot back.
                tracing::debug!(symbol, error = %e, "entry skipped by position book");
                self.release_slot().await;
                return;
            }
        };
        tracing::debug!(symbol, id = %position.id, "submitting entry order");

        match self.workflow.submit_entry(&proposal).await {
            Ok(handle) => self.settle_entry(symbol, handle, now).await,
            Err(WorkflowError::Rejected(reason)) => {
                tracing::warn!(symbol, reason, "entry order rejected, abandoning");
                if let Err(e) = self.book.lock().await.abandon_pending(symbol) {
                    tracing::error!(symbol, error = %e, "abandon after rejection failed");
                }
                self.release_slot().await;
            }
            Err(WorkflowError::Unresolved(reason)) => {
                self.fail_position(symbol, &reason).await;
            }
        }
    }

    async fn settle_entry(&self, symbol: &str, handle: OrderHandle, _now: DateTime<Utc>) {
        match self.workflow.poll_fill(&handle).await {
            Ok(FillStatus::Filled {
                price,
                fee,
                timestamp,
                ..
            }) => {
                let confirmed = self.book.lock().await.confirm_fill(symbol, price, fee, timestamp);
                match confirmed {
                    Ok(position) => {
                        self.inflight.lock().await.remove(symbol);
                        self.notifier
                            .notify(NotifyEvent::PositionOpened(position))
                            .await;
                    }
                    Err(e) => self.fail_position(symbol, &e.to_string()).await,
                }
            }
            Ok(FillStatus::Working) => {
                tracing::debug!(symbol, order_id = %handle.order_id, "entry working, will poll next tick");
                self.inflight
                    .lock()
                    .await
                    .insert(symbol.to_string(), handle);
            }
            Ok(FillStatus::Cancelled) => {
                tracing::warn!(symbol, order_id = %handle.order_id, "entry cancelled before fill");
                self.inflight.lock().await.remove(symbol);
                if let Err(e) = self.book.lock().await.abandon_pending(symbol) {
                    tracing::error!(symbol, error = %e, "abandon after cancellation failed");
                }
                self.release_slot().await;
            }
            Ok(FillStatus::Unknown) => {
                self.fail_position(
                    symbol,
                    &format!("order {} disappeared after submission", handle.order_id),
                )
                .await;
            }
            Err(e) => self.fail_position(symbol, &e.to_string()).await,
        }
    }

    async fn close_live(&self, symbol: &str, reason: ExitReason, now: DateTime<Utc>) {
        let requested = self.book.lock().await.request_close(symbol, reason);
        let position = match requested {
            Ok(position) => position,
            Err(e) => {
                tracing::debug!(symbol, error = %e, "close not requested");
                return;
            }
        };

        match self.workflow.submit_close(&position).await {
            Ok(handle) => self.settle_close(symbol, handle, now).await,
            Err(WorkflowError::Rejected(r) | WorkflowError::Unresolved(r)) => {
                // Either way the exchange-side position state is unknown to
                // us; park it for manual reconciliation.
                self.fail_position(symbol, &r).await;
            }
        }
    }

    async fn settle_close(&self, symbol: &str, handle: OrderHandle, _now: DateTime<Utc>) {
        match self.workflow.poll_fill(&handle).await {
            Ok(FillStatus::Filled {
                price,
                fee,
                timestamp,
                ..
            }) => {
                let closed = self.book.lock().await.confirm_closed(symbol, price, fee, timestamp);
                match closed {
                    Ok(record) => {
                        self.inflight.lock().await.remove(symbol);
                        self.settle_pnl(&record, timestamp).await;
                        let durable = self.ledger.lock().await.append(record.clone()).await;
                        if !durable {
                            tracing::warn!(symbol, id = %record.position_id, "trade recorded, durable write pending");
                        }
                        self.notifier
                            .notify(NotifyEvent::PositionClosed(record))
                            .await;
                    }
                    Err(e) => self.fail_position(symbol, &e.to_string()).await,
                }
            }
            Ok(FillStatus::Working) => {
                tracing::debug!(symbol, order_id = %handle.order_id, "close working, will poll next tick");
                self.inflight
                    .lock()
                    .await
                    .insert(symbol.to_string(), handle);
            }
            Ok(FillStatus::Cancelled | FillStatus::Unknown) => {
                self.fail_position(
                    symbol,
                    &format!("close order {} lost without a fill", handle.order_id),
                )
                .await;
            }
            Err(e) => self.fail_position(symbol, &e.to_string()).await,
        }
    }

    /// Applies realized PnL to the daily counters, releases the risk slot,
    /// and announces a daily-loss halt the first time the limit is crossed.
    async fn settle_pnl(&self, record: &TradeRecord, now: DateTime<Utc>) {
        let halted = {
            let mut state = self.risk_state.lock().await;
            state.release_slot();
            state.record_realized_pnl(record.pnl, now);
            state.daily_loss_hit(self.config.risk.daily_loss_limit, now)
        };
        if halted {
            if !self.loss_halt_announced.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    pnl = %record.pnl,
                    limit = %self.config.risk.daily_loss_limit,
                    "daily loss limit reached, entries halted until the next UTC day"
                );
                self.notifier
                    .notify(NotifyEvent::TradingHalted {
                        reason: "daily loss limit reached".to_string(),
                        at: now,
                    })
                    .await;
            }
        } else {
            self.loss_halt_announced.store(false, Ordering::SeqCst);
        }
    }

    /// Settles an order that was still working at the end of a previous tick.
    async fn settle_inflight(&self, symbol: &str, now: DateTime<Utc>) {
        let handle = self.inflight.lock().await.get(symbol).cloned();
        let Some(handle) = handle else { return };
        let status = self.book.lock().await.live(symbol).map(|p| p.status);
        match status {
            Some(PositionStatus::Pending) => self.settle_entry(symbol, handle, now).await,
            Some(PositionStatus::ClosingRequested) => self.settle_close(symbol, handle, now).await,
            _ => {
                self.inflight.lock().await.remove(symbol);
            }
        }
    }

    async fn fail_position(&self, symbol: &str, reason: &str) {
        self.inflight.lock().await.remove(symbol);
        let failed = self.book.lock().await.mark_failed(symbol, reason);
        match failed {
            Ok(position) => {
                self.release_slot().await;
                self.notifier
                    .notify(NotifyEvent::PositionFailed {
                        position,
                        reason: reason.to_string(),
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!(symbol, error = %e, reason, "failure could not be recorded");
            }
        }
    }

    async fn release_slot(&self) {
        self.risk_state.lock().await.release_slot();
    }
}
