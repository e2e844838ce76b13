//! Error taxonomy for the trading engine.
//!
//! Indicator and evaluation errors are local to one symbol's tick and are
//! skipped; gateway errors affecting a live position always land the position
//! in a terminal or clearly-flagged state.

use thiserror::Error;

/// Why the risk manager declined to turn a signal into an order proposal.
///
/// Rejections are expected control flow, not faults; they are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RejectReason {
    MaxPositionsReached,
    DailyLossLimitReached,
    InsufficientEquity,
    TradingDisabled,
    /// Stop distance times size would exceed the per-trade risk budget.
    RiskBudgetExceeded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MaxPositionsReached => "max positions reached",
            Self::DailyLossLimitReached => "daily loss limit reached",
            Self::InsufficientEquity => "insufficient equity",
            Self::TradingDisabled => "trading disabled",
            Self::RiskBudgetExceeded => "per-trade risk budget exceeded",
        };
        f.write_str(s)
    }
}

/// Failures reported by (or inferred about) the execution gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Timeout, rate limit, or 5xx. Safe to retry with backoff.
    #[error("transient gateway error: {0}")]
    Transient(String),

    /// Invalid parameters or insufficient margin. Never retried.
    #[error("gateway rejected order: {0}")]
    Rejected(String),

    /// Connection dropped mid-request or unknown fill state. A reconciliation
    /// query must precede any further action.
    #[error("ambiguous gateway state: {0}")]
    Ambiguous(String),
}

impl GatewayError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn ambiguous(msg: impl Into<String>) -> Self {
        Self::Ambiguous(msg.into())
    }

    /// True for failures that may be retried blindly with backoff.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True when the outcome of the request is unknown and a reconciliation
    /// read is required before retrying.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous(_))
    }
}

/// Snapshot provider failure: candles are unavailable this tick.
#[derive(Debug, Clone, Error)]
#[error("market snapshot unavailable for {symbol}: {reason}")]
pub struct SnapshotUnavailable {
    pub symbol: String,
    pub reason: String,
}

/// Top-level engine error taxonomy.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Fewer candles than the required lookback; skip the tick for the symbol.
    #[error("insufficient data: need {needed} candles, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Risk manager declined the signal. Expected, not retried.
    #[error("risk rejected: {0}")]
    RiskRejected(RejectReason),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotUnavailable),

    /// Durable ledger write failed.
    #[error("ledger append failed: {0}")]
    Ledger(String),

    /// Programming-logic fault, e.g. two non-terminal positions for one
    /// symbol. Halts new entries for that symbol; never self-heals silently.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Errors that skip the current tick but leave the loop running.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::RiskRejected(_) | Self::Snapshot(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(GatewayError::transient("timeout").is_transient());
        assert!(!GatewayError::transient("timeout").is_ambiguous());
        assert!(!GatewayError::rejected("bad params").is_transient());
        assert!(GatewayError::ambiguous("connection reset").is_ambiguous());
    }

    #[test]
    fn recoverable_errors_skip_tick() {
        assert!(EngineError::InsufficientData { needed: 53, got: 10 }.is_recoverable());
        assert!(EngineError::RiskRejected(RejectReason::TradingDisabled).is_recoverable());
        assert!(!EngineError::InvariantViolation("two live positions".into()).is_recoverable());
        assert!(!EngineError::Gateway(GatewayError::rejected("margin")).is_recoverable());
    }

    #[test]
    fn display_includes_detail() {
        let err = EngineError::InsufficientData { needed: 53, got: 12 };
        assert!(err.to_string().contains("53"));
        assert!(err.to_string().contains("12"));

        let err = EngineError::RiskRejected(RejectReason::DailyLossLimitReached);
        assert!(err.to_string().contains("daily loss limit"));
    }
}
