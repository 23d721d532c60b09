use async_trait::async_trait;
use serde_json::Value;

/// Sink for the durable audit copy of committed ledger entries. The engine
/// itself never reads it back; it exists so an operator can reconcile the
/// in-memory state after the fact.
#[async_trait]
pub trait LedgerArchive: Send + Sync {
    async fn archive_entry(
        &self,
        entry: &Value,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
