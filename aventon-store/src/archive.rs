use crate::database::DbClient;
use async_trait::async_trait;
use aventon_core::repository::LedgerArchive;
use aventon_settlement::SettlementEvent;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

type ArchiveError = Box<dyn std::error::Error + Send + Sync>;

/// Write-behind ledger archive in Postgres. Inserts are keyed by
/// `operation_id`, so a replayed event is a no-op rather than a duplicate
/// row.
pub struct PgLedgerArchive {
    client: DbClient,
}

impl PgLedgerArchive {
    pub fn new(client: DbClient) -> Self {
        Self { client }
    }
}

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a str, ArchiveError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("archive event missing {key}").into())
}

#[async_trait]
impl LedgerArchive for PgLedgerArchive {
    async fn archive_entry(&self, event: &Value) -> Result<(), ArchiveError> {
        let entry = event
            .get("entry")
            .ok_or_else(|| ArchiveError::from("archive event missing entry"))?;

        let id = Uuid::parse_str(field(entry, "id")?)?;
        let operation_id = field(entry, "operation_id")?;
        let user_id = field(entry, "user_id")?;
        let entry_type = field(entry, "type")?;
        let amount_cents = entry
            .get("amount_cents")
            .and_then(Value::as_i64)
            .ok_or_else(|| ArchiveError::from("archive event missing amount_cents"))?;
        let currency = field(entry, "currency")?;
        let related_reservation = entry
            .get("related_reservation")
            .and_then(Value::as_str)
            .map(Uuid::parse_str)
            .transpose()?;
        let created_at = DateTime::parse_from_rfc3339(field(entry, "created_at")?)?.with_timezone(&Utc);
        let reservation_status = event.get("reservation_status").and_then(Value::as_str);

        sqlx::query(
            r#"
            INSERT INTO ledger_archive
                (id, operation_id, user_id, entry_type, amount_cents, currency,
                 related_reservation, reservation_status, created_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (operation_id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(operation_id)
        .bind(user_id)
        .bind(entry_type)
        .bind(amount_cents)
        .bind(currency)
        .bind(related_reservation)
        .bind(reservation_status)
        .bind(created_at)
        .bind(event.clone())
        .execute(&self.client.pool)
        .await?;
        Ok(())
    }
}

/// Drain the settlement feed into the archive until the engine shuts down.
/// A lagged receiver logs and keeps going; the in-memory ledger stays the
/// source of truth either way.
pub async fn run_archiver(
    mut feed: broadcast::Receiver<SettlementEvent>,
    archive: Arc<dyn LedgerArchive>,
) {
    loop {
        match feed.recv().await {
            Ok(event) => {
                let value = match serde_json::to_value(&event) {
                    Ok(value) => value,
                    Err(err) => {
                        tracing::error!(error = %err, "unserializable settlement event");
                        continue;
                    }
                };
                if let Err(err) = archive.archive_entry(&value).await {
                    tracing::error!(
                        operation_id = %event.entry.operation_id,
                        error = %err,
                        "ledger archive write failed"
                    );
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "archive feed lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("settlement feed closed; archiver stopping");
}
