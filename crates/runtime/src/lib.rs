//! Runtime wiring: the trade engine, the monitoring loop, and the status
//! surface it publishes.

pub mod engine;
pub mod status;
pub mod trading_loop;

pub use engine::Engine;
pub use status::EngineStatus;
pub use trading_loop::{LoopCommand, LoopHandle, TradingLoop};
