use anyhow::Context;
use aventon_api::{
    app,
    state::{AppState, AuthConfig},
    worker,
};
use aventon_settlement::SettlementCoordinator;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aventon_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = aventon_store::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Aventon API on port {}", config.server.port);

    let engine = Arc::new(SettlementCoordinator::new(
        &config.business_rules.default_currency,
    ));

    // Optional Postgres archive: drain the settlement feed into the audit
    // table when a database is configured.
    if let Some(db) = &config.database {
        let client = aventon_store::DbClient::new(&db.url)
            .await
            .context("Failed to connect to Postgres")?;
        client
            .ensure_schema()
            .await
            .context("Failed to prepare archive schema")?;
        let archive = Arc::new(aventon_store::PgLedgerArchive::new(client));
        tokio::spawn(aventon_store::run_archiver(engine.subscribe(), archive));
        tracing::info!("Ledger archive enabled");
    }

    // Background expiry sweep
    tokio::spawn(worker::start_expiry_worker(
        engine.clone(),
        config.business_rules.clone(),
    ));

    let app_state = AppState {
        engine,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            expiration: config.auth.jwt_expiration_seconds,
        },
        business_rules: config.business_rules.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
