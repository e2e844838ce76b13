pub mod config;
pub mod config_loader;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod position;
pub mod risk_state;
pub mod traits;

pub use config::{
    BotConfig, ExecutionConfig, PositionSizing, RiskConfig, RsiThresholds, ScheduleConfig,
    StrategyConfig,
};
pub use config_loader::ConfigLoader;
pub use domain::{
    Candle, Direction, ExitReason, FillStatus, IndicatorSet, OrderHandle, OrderProposal,
    Position, PositionStatus, Signal, TradeRecord,
};
pub use error::{EngineError, GatewayError, RejectReason, Result, SnapshotUnavailable};
pub use ledger::TradeLedger;
pub use position::{PositionBook, PositionError};
pub use risk_state::{RiskState, TradingSwitch};
pub use traits::{ExecutionGateway, LedgerSink, Notifier, NotifyEvent, NullNotifier, SnapshotProvider};
