//! JSON-lines ledger sink: one closed trade per line, append-only.
//!
//! Replays are harmless downstream because `position_id` identifies each
//! record; consumers dedup on it.

use async_trait::async_trait;
use perpbot_core::domain::TradeRecord;
use perpbot_core::traits::LedgerSink;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub struct JsonlLedger {
    path: PathBuf,
}

impl JsonlLedger {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl LedgerSink for JsonlLedger {
    async fn append(&self, record: &TradeRecord) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
