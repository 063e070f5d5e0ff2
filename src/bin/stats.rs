//! Stats binary - prints translation progress for every configured app
//!
//! Usage:
//!   cargo run --bin stats
//!
//! Optional environment variables:
//! - CONFIG_PATH (defaults to config.json)
//! - DATA_DIR (defaults to data)

use anyhow::Result;
use translation_store::config::Config;
use translation_store::registry::AppRegistry;

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("translation_store=warn".parse()?),
        )
        .init();

    let config = Config::from_env()?;
    let registry = AppRegistry::open_all(&config.data_dir, &config.apps)?;

    for app in registry.apps() {
        let store = app.store()?;
        let index = store.read();

        println!("{}", app.name());
        println!("  strings:      {}", index.strings_count());
        println!("  untranslated: {}", index.untranslated_count());
        println!("  edits:        {}", index.edits_count());
        println!("  languages:    {}", index.languages_count());
        for info in index.language_infos() {
            println!(
                "    {:<6} {:<28} {:>5} translated {:>5} missing {:>6} edits",
                info.code, info.name, info.translated, info.untranslated, info.edits
            );
        }
        let contributors = index.contributors();
        if !contributors.is_empty() {
            println!("  top contributors:");
            for (name, edits) in contributors.iter().take(10) {
                println!("    {:<20} {}", name, edits);
            }
        }
        println!();
    }

    Ok(())
}
