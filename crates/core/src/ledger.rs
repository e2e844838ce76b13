//! Append-only trade ledger.
//!
//! Holds the in-process record of closed trades and forwards each one to the
//! durable `LedgerSink`. Delivery is at-least-once: a failed sink write is
//! queued and retried every flush until it lands. `position_id` is the
//! idempotency key on both sides, so replays are harmless.

use crate::domain::TradeRecord;
use crate::traits::LedgerSink;
use rust_decimal::Decimal;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

pub struct TradeLedger {
    sink: Arc<dyn LedgerSink>,
    records: Vec<TradeRecord>,
    seen: HashSet<Uuid>,
    /// Records whose durable write has not yet succeeded.
    unflushed: VecDeque<TradeRecord>,
}

impl TradeLedger {
    #[must_use]
    pub fn new(sink: Arc<dyn LedgerSink>) -> Self {
        Self {
            sink,
            records: Vec::new(),
            seen: HashSet::new(),
            unflushed: VecDeque::new(),
        }
    }

    /// Appends a closed trade and attempts the durable write immediately.
    /// A duplicate `position_id` is ignored. Returns whether the record was
    /// durably written on this call; if not, it stays queued for `flush`.
    pub async fn append(&mut self, record: TradeRecord) -> bool {
        if !self.seen.insert(record.position_id) {
            tracing::debug!(id = %record.position_id, "duplicate ledger append ignored");
            return true;
        }
        self.records.push(record.clone());

        match self.sink.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id = %record.position_id, error = %e, "ledger sink write failed, queued for retry");
                self.unflushed.push_back(record);
                false
            }
        }
    }

    /// Retries queued durable writes. Called once per loop tick.
    pub async fn flush(&mut self) {
        let mut remaining = VecDeque::new();
        while let Some(record) = self.unflushed.pop_front() {
            if let Err(e) = self.sink.append(&record).await {
                tracing::warn!(id = %record.position_id, error = %e, "ledger flush retry failed");
                remaining.push_back(record);
            }
        }
        self.unflushed = remaining;
    }

    /// The most recent `n` records, newest last.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<TradeRecord> {
        let start = self.records.len().saturating_sub(n);
        self.records[start..].to_vec()
    }

    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.records.iter().map(|r| r.pnl).sum()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn pending_flush(&self) -> usize {
        self.unflushed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, ExitReason};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct RecordingSink {
        fail: AtomicBool,
        appended: Mutex<Vec<Uuid>>,
        calls: AtomicUsize,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                fail: AtomicBool::new(false),
                appended: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LedgerSink for RecordingSink {
        async fn append(&self, record: &TradeRecord) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("sink down");
            }
            self.appended.lock().unwrap().push(record.position_id);
            Ok(())
        }
    }

    fn record(pnl: Decimal) -> TradeRecord {
        TradeRecord {
            position_id: Uuid::new_v4(),
            symbol: "XRPUSDT".to_string(),
            direction: Direction::Long,
            entry_price: dec!(100),
            exit_price: dec!(98),
            size: dec!(1),
            pnl,
            fees: dec!(0.1),
            opened_at: Utc::now(),
            closed_at: Utc::now(),
            exit_reason: ExitReason::StopLoss,
        }
    }

    #[tokio::test]
    async fn append_writes_through_and_aggregates() {
        let sink = Arc::new(RecordingSink::new());
        let mut ledger = TradeLedger::new(sink.clone());
        assert!(ledger.append(record(dec!(-10))).await);
        assert!(ledger.append(record(dec!(15))).await);
        assert_eq!(ledger.total_pnl(), dec!(5));
        assert_eq!(sink.appended.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_position_id_ignored() {
        let sink = Arc::new(RecordingSink::new());
        let mut ledger = TradeLedger::new(sink.clone());
        let r = record(dec!(-10));
        ledger.append(r.clone()).await;
        ledger.append(r).await;
        assert_eq!(ledger.len(), 1);
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_write_retried_on_flush() {
        let sink = Arc::new(RecordingSink::new());
        sink.fail.store(true, Ordering::SeqCst);
        let mut ledger = TradeLedger::new(sink.clone());

        assert!(!ledger.append(record(dec!(-10))).await);
        assert_eq!(ledger.pending_flush(), 1);
        // PnL accounting does not wait for durability.
        assert_eq!(ledger.total_pnl(), dec!(-10));

        sink.fail.store(false, Ordering::SeqCst);
        ledger.flush().await;
        assert_eq!(ledger.pending_flush(), 0);
        assert_eq!(sink.appended.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn recent_returns_newest_records() {
        let sink = Arc::new(RecordingSink::new());
        let mut ledger = TradeLedger::new(sink);
        for pnl in [dec!(1), dec!(2), dec!(3)] {
            ledger.append(record(pnl)).await;
        }
        let recent = ledger.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].pnl, dec!(3));
    }
}
