use std::sync::Arc;

use tracing::info;

use oxide_core::{config::Config, store::Database};

#[tokio::main]
async fn main() -> Result<(), oxide_core::Error> {
    let cfg = Arc::new(Config::load()?);
    oxide_core::logging::init("oxide", cfg.debug_mode)?;

    let db = Database::open(&cfg.database_path).await?;
    info!(path = %cfg.database_path.display(), "database ready");

    oxide_telegram::router::run_polling(cfg, db)
        .await
        .map_err(|e| oxide_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
