use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blud_audit_ledger::api::{self, ApiState};
use blud_audit_ledger::config::AppConfig;
use blud_audit_ledger::database::Database;
use blud_audit_ledger::AuditLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blud_audit_ledger=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting BLUD audit ledger");

    let config = AppConfig::load()?;
    info!("Configuration loaded");

    let database = Database::connect(&config.database_url, &config.database_options()).await?;
    database.run_migrations().await?;
    info!("Database migrations completed");

    let ledger = AuditLedger::with_max_attempts(database.clone(), config.append_max_attempts);
    let head = ledger.head().await?;
    match head {
        Some(entry) => info!("Ledger head at seq {} ({})", entry.seq, entry.hash),
        None => info!("Ledger is empty; next row links to genesis"),
    }

    let app = api::router(ApiState::new(ledger, config.api_token.clone()));

    let addr: SocketAddr = config.bind_address().parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    database.close().await;
    info!("Audit ledger stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
