use aventon_settlement::SettlementCoordinator;
use aventon_store::app_config::BusinessRules;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::info;

/// Background sweep: auto-cancel PENDING reservations whose pickup time
/// plus grace has passed, and prune idempotency records past retention.
pub async fn start_expiry_worker(engine: Arc<SettlementCoordinator>, rules: BusinessRules) {
    let mut ticker = interval(Duration::from_secs(rules.expiry_sweep_seconds.max(1)));
    info!(
        grace_seconds = rules.pending_grace_seconds,
        sweep_seconds = rules.expiry_sweep_seconds,
        "Expiry worker started"
    );

    loop {
        ticker.tick().await;

        let expired = engine.expire_stale(rules.pending_grace_seconds).await;
        if !expired.is_empty() {
            info!(count = expired.len(), "Expired stale reservations");
        }

        let pruned = engine.prune_idempotency(rules.idempotency_retention_days).await;
        if pruned > 0 {
            info!(pruned, "Pruned idempotency records");
        }
    }
}
