mod api;
mod categories;
mod config;
mod dashboard;
mod digest;
mod firewall;
mod leases;
mod policy;
mod reconcile;
mod upsert;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::categories::CategoryTable;
use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::firewall::Iptables;
use crate::leases::LeaseFile;
use crate::policy::client::AdGuardClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("revive_dashboardd=info"))
        )
        .init();

    tracing::info!("Starting revive-dashboardd");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/revive/dashboard.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    let registry = AdGuardClient::new(&config.policy)?;
    tracing::info!("Filtering service at {}", config.policy.url);
    tracing::info!("Reading leases from {:?}", config.leases.path);

    let dashboard = Dashboard::new(
        Arc::new(LeaseFile::new(config.leases.path.clone())),
        Arc::new(Iptables::new(config.firewall.clone())),
        Arc::new(registry),
        config.firewall.assume_blocked_on_error,
    );

    let app_state = api::routes::AppState {
        dashboard: Arc::new(dashboard),
        categories: Arc::new(CategoryTable::new(config.categories.clone())),
    };
    let app = api::routes::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    let cancel = CancellationToken::new();
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");
    cancel.cancel();

    if let Err(e) = server_handle.await {
        tracing::error!("Server task failed: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
