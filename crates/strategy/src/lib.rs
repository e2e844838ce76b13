pub mod evaluator;
pub mod indicators;
pub mod risk_manager;

pub use evaluator::SignalEvaluator;
pub use risk_manager::RiskManager;
