use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    /// Bootstrap the archive table. The authoritative ledger lives in
    /// memory; this table is a write-behind copy for audit queries.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        info!("Ensuring archive schema...");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_archive (
                id UUID PRIMARY KEY,
                operation_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                amount_cents BIGINT NOT NULL,
                currency TEXT NOT NULL,
                related_reservation UUID,
                reservation_status TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS ledger_archive_user_idx ON ledger_archive (user_id, created_at)",
        )
        .execute(&self.pool)
        .await?;
        info!("Archive schema ready.");
        Ok(())
    }
}
