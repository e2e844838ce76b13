//! Long-running monitoring loop.
//!
//! Owns the cycle cadence and the operator control surface: commands arrive
//! on an mpsc channel, status snapshots go out on a watch channel. Each
//! cycle ticks every configured symbol concurrently; per-symbol failures are
//! contained by the engine and never stop the loop.

use crate::engine::Engine;
use crate::status::EngineStatus;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

#[derive(Debug)]
pub enum LoopCommand {
    /// Disable new entries. Open positions keep managing their exits.
    Pause,
    Resume,
    /// Manually close the symbol's open position.
    CloseSymbol { symbol: String },
    /// Clear a reconciled failed position, re-enabling entries for its symbol.
    AcknowledgeFailed { symbol: String, id: Uuid },
    Shutdown,
}

/// Operator-side handle to a running loop.
#[derive(Clone)]
pub struct LoopHandle {
    pub commands: mpsc::Sender<LoopCommand>,
    pub status: watch::Receiver<EngineStatus>,
}

pub struct TradingLoop {
    engine: Arc<Engine>,
    commands: mpsc::Receiver<LoopCommand>,
    status_tx: watch::Sender<EngineStatus>,
}

impl TradingLoop {
    #[must_use]
    pub fn new(engine: Arc<Engine>) -> (Self, LoopHandle) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (status_tx, status_rx) = watch::channel(EngineStatus::empty());
        (
            Self {
                engine,
                commands: command_rx,
                status_tx,
            },
            LoopHandle {
                commands: command_tx,
                status: status_rx,
            },
        )
    }

    /// Runs until `Shutdown` arrives or every command sender is dropped.
    ///
    /// # Errors
    /// Fails only when the startup check fails; runtime errors are contained
    /// per tick.
    pub async fn run(mut self) -> anyhow::Result<()> {
        self.engine.startup_check().await?;
        self.run_cycle().await;

        loop {
            let interval = self.engine.tick_interval().await;
            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle_command(command).await {
                        break;
                    }
                    self.publish_status().await;
                }
                () = tokio::time::sleep(interval) => {
                    self.run_cycle().await;
                }
            }
        }
        tracing::info!("trading loop stopped");
        Ok(())
    }

    /// Applies one operator command. Returns false on `Shutdown`.
    async fn handle_command(&self, command: LoopCommand) -> bool {
        match command {
            LoopCommand::Pause => self.engine.pause("operator pause").await,
            LoopCommand::Resume => self.engine.resume().await,
            LoopCommand::CloseSymbol { symbol } => {
                if let Err(e) = self.engine.close_manual(&symbol).await {
                    tracing::warn!(%symbol, error = %e, "manual close rejected");
                }
            }
            LoopCommand::AcknowledgeFailed { symbol, id } => {
                if let Err(e) = self.engine.acknowledge_failed(&symbol, id).await {
                    tracing::warn!(%symbol, %id, error = %e, "acknowledge rejected");
                }
            }
            LoopCommand::Shutdown => return false,
        }
        true
    }

    async fn run_cycle(&self) {
        let now = Utc::now();
        let mut tasks = Vec::with_capacity(self.engine.config().symbols.len());
        for symbol in &self.engine.config().symbols {
            let engine = Arc::clone(&self.engine);
            let symbol = symbol.clone();
            tasks.push(tokio::spawn(async move {
                engine.tick(&symbol, now).await;
            }));
        }
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "symbol tick panicked");
            }
        }
        self.engine.flush_ledger().await;
        self.publish_status().await;
    }

    async fn publish_status(&self) {
        let status = self.engine.status().await;
        // Receivers may all be gone during shutdown; nothing to do then.
        let _ = self.status_tx.send(status);
    }
}
