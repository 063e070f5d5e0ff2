//! Compact binary - rewrites an app's translation log to its live state
//!
//! Drops deleted strings and superseded translations. Run it with the server
//! stopped; the server holds the log open for appends.
//!
//! Usage:
//!   cargo run --bin compact                  # Compact every configured app
//!   cargo run --bin compact -- SumatraPDF    # Compact one app
//!
//! Optional environment variables:
//! - CONFIG_PATH (defaults to config.json)
//! - DATA_DIR (defaults to data)

use anyhow::{Context, Result};
use tracing::info;
use translation_store::config::{AppConfig, Config};
use translation_store::registry::AppRegistry;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_store=info".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let selected: Vec<String> = std::env::args().skip(1).collect();
    let apps: Vec<AppConfig> = config
        .apps
        .iter()
        .filter(|app| selected.is_empty() || selected.iter().any(|s| s == app.name.trim()))
        .cloned()
        .collect();
    if apps.is_empty() {
        anyhow::bail!("No matching apps to compact (asked for {:?})", selected);
    }

    let registry = AppRegistry::open_all(&config.data_dir, &apps)?;
    for app in registry.apps() {
        let store = app.store()?;
        let size_before = std::fs::metadata(app.log_path())?.len();
        let report = store
            .compact()
            .with_context(|| format!("Failed to compact {}", app.name()))?;
        let size_after = std::fs::metadata(app.log_path())?.len();

        info!("Compacted {}", app.name());
        println!(
            "{}: {} -> {} records, {} -> {} bytes",
            app.name(),
            report.records_before,
            report.records_after,
            size_before,
            size_after
        );
    }

    Ok(())
}
