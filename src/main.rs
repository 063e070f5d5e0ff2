use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use translation_store::api;
use translation_store::backup::{self, BackupScheduler, BackupSettings};
use translation_store::config::Config;
use translation_store::registry::AppRegistry;
use translation_store::security::{IdentityProvider, NoIdentity, TrustedHeaderIdentity};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_store=info".parse()?),
        )
        .init();

    info!("Starting translation store");

    let config = Config::from_env()?;
    if config.apps.is_empty() {
        anyhow::bail!("No apps configured, nothing to serve");
    }

    let registry = Arc::new(AppRegistry::open_all(&config.data_dir, &config.apps)?);
    info!("✓ Loaded {} apps from {}", registry.len(), config.data_dir.display());

    let backup_handle = match (config.backup_enabled(), &config.backup) {
        (true, Some(target_config)) => match backup::target_from_config(target_config) {
            Some(target) => {
                let settings = BackupSettings {
                    interval: config.backup_interval,
                    upload_timeout: target_config.upload_timeout(),
                    ..Default::default()
                };
                let scheduler = Arc::new(BackupScheduler::new(
                    Arc::clone(&registry),
                    target,
                    settings,
                ));
                Some(scheduler.start().await?)
            }
            None => None,
        },
        _ => None,
    };

    let identity: Arc<dyn IdentityProvider> = match &config.identity_header {
        Some(header) => {
            info!("Trusting user identity from header {}", header);
            Arc::new(TrustedHeaderIdentity::new(header.clone()))
        }
        None => Arc::new(NoIdentity),
    };

    let router = api::build_router(Arc::clone(&registry), identity);
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_addr))?;
    info!("✓ Listening on {}", config.http_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(handle) = backup_handle {
        if let Err(e) = handle.shutdown().await {
            warn!("Backup scheduler did not stop cleanly: {}", e);
        }
    }

    info!("Translation store stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
