//! Order submission workflow.
//!
//! Wraps a gateway call in timeout, classified retry and reconciliation so
//! that a single approved proposal produces at most one live order on the
//! exchange. The client order id is generated here, before the first
//! attempt, and reused across retries; after an ambiguous failure a
//! reconciliation query on that id decides whether the order landed.

use crate::retry::{AttemptOutcome, OrderAttempt, RetryPolicy};
use perpbot_core::config::ExecutionConfig;
use perpbot_core::domain::{FillStatus, OrderHandle, OrderProposal, Position};
use perpbot_core::error::GatewayError;
use perpbot_core::traits::ExecutionGateway;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// The exchange definitively rejected the order. Safe to treat the
    /// position as never opened.
    #[error("order rejected: {0}")]
    Rejected(String),
    /// Retries and reconciliation both failed; the order may or may not be
    /// live. The position must be parked in `Failed` for manual review.
    #[error("order state unresolved: {0}")]
    Unresolved(String),
}

enum OrderKind<'a> {
    Entry(&'a OrderProposal),
    Close(&'a Position),
}

impl OrderKind<'_> {
    fn symbol(&self) -> &str {
        match self {
            Self::Entry(p) => &p.symbol,
            Self::Close(p) => &p.symbol,
        }
    }
}

enum Reconciled {
    /// The order is on the books (working or filled).
    Placed,
    /// The exchange has never seen the client order id.
    NeverPlaced,
    /// The order reached the exchange but was cancelled.
    Dead,
}

pub struct OrderWorkflow {
    gateway: Arc<dyn ExecutionGateway>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl OrderWorkflow {
    #[must_use]
    pub fn new(gateway: Arc<dyn ExecutionGateway>, config: &ExecutionConfig) -> Self {
        Self {
            gateway,
            policy: RetryPolicy::from_config(config),
            call_timeout: Duration::from_millis(config.gateway_timeout_ms),
        }
    }

    /// Submits an entry order for an approved proposal.
    ///
    /// # Errors
    /// `Rejected` if the exchange refused the order, `Unresolved` if its
    /// state could not be established after retries and reconciliation.
    pub async fn submit_entry(
        &self,
        proposal: &OrderProposal,
    ) -> Result<OrderHandle, WorkflowError> {
        self.submit(OrderKind::Entry(proposal)).await
    }

    /// Submits a close order for a live position.
    ///
    /// # Errors
    /// Same contract as [`Self::submit_entry`].
    pub async fn submit_close(&self, position: &Position) -> Result<OrderHandle, WorkflowError> {
        self.submit(OrderKind::Close(position)).await
    }

    /// Queries the fill state of a submitted order, retrying transient
    /// failures.
    ///
    /// # Errors
    /// `Unresolved` if the gateway stayed unreachable.
    pub async fn poll_fill(&self, handle: &OrderHandle) -> Result<FillStatus, WorkflowError> {
        let mut attempt = OrderAttempt::new(self.policy);
        loop {
            match self.timed(self.gateway.query_order(handle)).await {
                Ok(status) => return Ok(status),
                Err(err) => match attempt.on_failure(&err) {
                    AttemptOutcome::Retry { after } => tokio::time::sleep(after).await,
                    AttemptOutcome::Reconcile => {
                        return Err(WorkflowError::Unresolved(format!(
                            "fill query for {} kept failing: {err}",
                            handle.order_id
                        )));
                    }
                    AttemptOutcome::Fail { reason } => {
                        return Err(WorkflowError::Unresolved(format!(
                            "fill query for {} rejected: {reason}",
                            handle.order_id
                        )));
                    }
                },
            }
        }
    }

    async fn submit(&self, kind: OrderKind<'_>) -> Result<OrderHandle, WorkflowError> {
        let client_order_id = Uuid::new_v4().to_string();
        let handle = OrderHandle {
            order_id: client_order_id.clone(),
            symbol: kind.symbol().to_string(),
        };

        // One reconciled "never placed" verdict earns one fresh submission
        // cycle. A second unresolved cycle gives up.
        for cycle in 0..2 {
            if let Some(returned) = self.submit_once(&kind, &client_order_id).await? {
                return Ok(returned);
            }

            match self.reconcile(&handle).await? {
                Reconciled::Placed => {
                    tracing::info!(
                        order_id = %handle.order_id,
                        symbol = %handle.symbol,
                        "reconciliation found order on the books"
                    );
                    return Ok(handle.clone());
                }
                Reconciled::Dead => {
                    return Err(WorkflowError::Rejected(format!(
                        "order {} was cancelled by the exchange",
                        handle.order_id
                    )));
                }
                Reconciled::NeverPlaced => {
                    tracing::warn!(
                        order_id = %handle.order_id,
                        cycle,
                        "order never reached the exchange, resubmitting"
                    );
                }
            }
        }

        Err(WorkflowError::Unresolved(format!(
            "order {} not placed after reconciled resubmission",
            handle.order_id
        )))
    }

    /// Drives one blind-retry cycle of the submit call. Returns the handle
    /// on success, `None` when the cycle ended in `Reconcile`.
    async fn submit_once(
        &self,
        kind: &OrderKind<'_>,
        client_order_id: &str,
    ) -> Result<Option<OrderHandle>, WorkflowError> {
        let mut attempt = OrderAttempt::new(self.policy);
        loop {
            let result = match kind {
                OrderKind::Entry(proposal) => {
                    self.timed(self.gateway.submit_order(proposal, client_order_id))
                        .await
                }
                OrderKind::Close(position) => {
                    self.timed(self.gateway.close_position(position, client_order_id))
                        .await
                }
            };
            match result {
                Ok(handle) => return Ok(Some(handle)),
                Err(err) => match attempt.on_failure(&err) {
                    AttemptOutcome::Retry { after } => tokio::time::sleep(after).await,
                    AttemptOutcome::Reconcile => return Ok(None),
                    AttemptOutcome::Fail { reason } => {
                        return Err(WorkflowError::Rejected(reason))
                    }
                },
            }
        }
    }

    async fn reconcile(&self, handle: &OrderHandle) -> Result<Reconciled, WorkflowError> {
        let mut attempt = OrderAttempt::new(self.policy);
        loop {
            match self.timed(self.gateway.query_order(handle)).await {
                Ok(FillStatus::Filled { .. } | FillStatus::Working) => {
                    return Ok(Reconciled::Placed)
                }
                Ok(FillStatus::Cancelled) => return Ok(Reconciled::Dead),
                Ok(FillStatus::Unknown) => return Ok(Reconciled::NeverPlaced),
                Err(err) => match attempt.on_failure(&err) {
                    AttemptOutcome::Retry { after } => tokio::time::sleep(after).await,
                    AttemptOutcome::Reconcile | AttemptOutcome::Fail { .. } => {
                        return Err(WorkflowError::Unresolved(format!(
                            "could not reconcile order {}: {err}",
                            handle.order_id
                        )));
                    }
                },
            }
        }
    }

    async fn timed<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::transient("gateway call timed out")),
        }
    }
}
