//! Paper execution gateway.
//!
//! Simulates fills locally with configurable slippage and commission; makes
//! zero network calls, so it is impossible to execute a real trade through
//! it. Failures can be scripted per submit call, which the workflow tests
//! use to exercise the retry and reconciliation paths.

use async_trait::async_trait;
use chrono::Utc;
use perpbot_core::domain::{Direction, FillStatus, OrderHandle, OrderProposal, Position};
use perpbot_core::error::GatewayError;
use perpbot_core::traits::ExecutionGateway;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Scripted behavior for the next submit/close call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Return the error; the order is not recorded.
    Fail(GatewayError),
    /// Return the error, but record the order as placed and filled anyway.
    /// Models an ambiguous failure where the request actually landed.
    FailButPlace(GatewayError),
}

pub struct PaperGateway {
    commission_rate: Decimal,
    slippage_bps: Decimal,
    equity: Mutex<Decimal>,
    mark_prices: Mutex<HashMap<String, Decimal>>,
    orders: Mutex<HashMap<String, FillStatus>>,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    orders_placed: AtomicUsize,
}

impl PaperGateway {
    /// Creates a paper gateway.
    ///
    /// # Panics
    /// Panics if the rates cannot be represented as `Decimal`; they come
    /// from validated configuration.
    #[must_use]
    pub fn new(commission_rate: f64, slippage_bps: f64, equity: Decimal) -> Self {
        Self {
            commission_rate: Decimal::from_str(&commission_rate.to_string()).unwrap(),
            slippage_bps: Decimal::from_str(&slippage_bps.to_string()).unwrap(),
            equity: Mutex::new(equity),
            mark_prices: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            script: Mutex::new(VecDeque::new()),
            orders_placed: AtomicUsize::new(0),
        }
    }

    /// Sets the price the next fills for `symbol` execute around.
    pub fn set_mark_price(&self, symbol: &str, price: Decimal) {
        self.mark_prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn set_equity(&self, equity: Decimal) {
        *self.equity.lock().unwrap() = equity;
    }

    /// Queues a scripted outcome consumed by the next submit or close call.
    pub fn script(&self, outcome: ScriptedOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    /// Number of orders actually recorded on the simulated exchange.
    #[must_use]
    pub fn orders_placed(&self) -> usize {
        self.orders_placed.load(Ordering::SeqCst)
    }

    fn mark_price(&self, symbol: &str, fallback: Decimal) -> Decimal {
        self.mark_prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .unwrap_or(fallback)
    }

    fn fill_price(&self, base: Decimal, buying: bool) -> Decimal {
        let slip = base * self.slippage_bps / Decimal::from(10_000);
        if buying {
            base + slip
        } else {
            base - slip
        }
    }

    fn record_fill(&self, client_order_id: &str, price: Decimal, quantity: Decimal) {
        let fee = price * quantity * self.commission_rate;
        self.orders.lock().unwrap().insert(
            client_order_id.to_string(),
            FillStatus::Filled {
                price,
                quantity,
                fee,
                timestamp: Utc::now(),
            },
        );
        self.orders_placed.fetch_add(1, Ordering::SeqCst);
    }

    fn place(
        &self,
        client_order_id: &str,
        symbol: &str,
        base_price: Decimal,
        quantity: Decimal,
        buying: bool,
    ) -> Result<OrderHandle, GatewayError> {
        let handle = OrderHandle {
            order_id: client_order_id.to_string(),
            symbol: symbol.to_string(),
        };

        // Idempotent on client order id: a retried submit does not double-fill.
        if self.orders.lock().unwrap().contains_key(client_order_id) {
            return Ok(handle);
        }

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedOutcome::Fail(err)) => return Err(err),
            Some(ScriptedOutcome::FailButPlace(err)) => {
                let price = self.fill_price(base_price, buying);
                self.record_fill(client_order_id, price, quantity);
                return Err(err);
            }
            None => {}
        }

        let price = self.fill_price(base_price, buying);
        self.record_fill(client_order_id, price, quantity);
        Ok(handle)
    }
}

#[async_trait]
impl ExecutionGateway for PaperGateway {
    async fn submit_order(
        &self,
        proposal: &OrderProposal,
        client_order_id: &str,
    ) -> Result<OrderHandle, GatewayError> {
        let base = self.mark_price(&proposal.symbol, proposal.entry_price);
        let buying = proposal.direction == Direction::Long;
        self.place(client_order_id, &proposal.symbol, base, proposal.quantity, buying)
    }

    async fn query_order(&self, handle: &OrderHandle) -> Result<FillStatus, GatewayError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .get(&handle.order_id)
            .cloned()
            .unwrap_or(FillStatus::Unknown))
    }

    async fn close_position(
        &self,
        position: &Position,
        client_order_id: &str,
    ) -> Result<OrderHandle, GatewayError> {
        let base = self.mark_price(&position.symbol, position.entry_price);
        // Closing a long sells, closing a short buys.
        let buying = position.direction == Direction::Short;
        self.place(client_order_id, &position.symbol, base, position.size, buying)
    }

    async fn account_equity(&self) -> Result<Decimal, GatewayError> {
        Ok(*self.equity.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn proposal() -> OrderProposal {
        OrderProposal {
            symbol: "XRPUSDT".to_string(),
            direction: Direction::Long,
            quantity: dec!(10),
            notional: dec!(1000),
            leverage: 5,
            entry_price: dec!(100),
            stop_loss_price: dec!(98),
            take_profit_price: dec!(103),
            max_risk_amount: dec!(20),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn buy_fills_with_positive_slippage_and_commission() {
        let gateway = PaperGateway::new(0.001, 10.0, dec!(10000));
        let handle = gateway.submit_order(&proposal(), "c-1").await.unwrap();
        let status = gateway.query_order(&handle).await.unwrap();
        match status {
            FillStatus::Filled { price, quantity, fee, .. } => {
                assert_eq!(price, dec!(100.1));
                assert_eq!(quantity, dec!(10));
                assert_eq!(fee, dec!(100.1) * dec!(10) * dec!(0.001));
            }
            other => panic!("expected fill, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn resubmit_with_same_client_id_is_idempotent() {
        let gateway = PaperGateway::new(0.0, 0.0, dec!(10000));
        gateway.submit_order(&proposal(), "c-1").await.unwrap();
        gateway.submit_order(&proposal(), "c-1").await.unwrap();
        assert_eq!(gateway.orders_placed(), 1);
    }

    #[tokio::test]
    async fn unknown_order_query_returns_unknown() {
        let gateway = PaperGateway::new(0.0, 0.0, dec!(10000));
        let handle = OrderHandle {
            order_id: "missing".to_string(),
            symbol: "XRPUSDT".to_string(),
        };
        assert!(matches!(
            gateway.query_order(&handle).await.unwrap(),
            FillStatus::Unknown
        ));
    }

    #[tokio::test]
    async fn scripted_failure_consumed_once() {
        let gateway = PaperGateway::new(0.0, 0.0, dec!(10000));
        gateway.script(ScriptedOutcome::Fail(GatewayError::transient("rate limit")));
        assert!(gateway.submit_order(&proposal(), "c-1").await.is_err());
        assert_eq!(gateway.orders_placed(), 0);
        assert!(gateway.submit_order(&proposal(), "c-1").await.is_ok());
        assert_eq!(gateway.orders_placed(), 1);
    }
}
