use std::sync::Arc;

use crb_core::{config::Config, store::MappingStore};

#[tokio::main]
async fn main() -> Result<(), crb_core::Error> {
    crb_core::logging::init("crb")?;

    let cfg = Arc::new(Config::load()?);

    let store = Arc::new(MappingStore::new(&cfg.mapping_file));
    store.initialize().await?;

    let result = crb_telegram::router::run(cfg, store.clone())
        .await
        .map_err(|e| crb_core::Error::External(format!("telegram bot failed: {e}")));

    store.close().await;
    tracing::info!("relay stopped");
    result
}
