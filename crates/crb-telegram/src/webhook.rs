//! Webhook mode: one HTTP server carries Telegram's POST endpoint plus the
//! liveness routes.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};
use teloxide::{
    dispatching::Dispatcher,
    dptree,
    prelude::*,
    update_listeners::webhooks::{self, Options},
};
use tracing::{error, info};

use crb_core::config::{Config, Url};

use crate::router::{error_handler, schema, AppState};

pub async fn serve(bot: Bot, url: Url, state: Arc<AppState>) -> anyhow::Result<()> {
    let cfg = state.cfg.clone();
    let addr = cfg.listen_addr;
    info!(%addr, path = url.path(), "starting in webhook mode");
    let options = webhook_options(&cfg, url);

    // Registers the webhook with Telegram (setWebhook).
    let (listener, stop_flag, telegram_routes) =
        webhooks::axum_to_router(bot.clone(), options).await?;
    let app = telegram_routes.merge(service_routes(state.clone()));

    let server = tokio::spawn(async move {
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .with_graceful_shutdown(stop_flag)
            .await
    });

    Dispatcher::builder(bot.clone(), schema())
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(listener, error_handler())
        .await;

    match server.await? {
        Ok(()) => info!("http server stopped"),
        Err(e) => error!(error = %e, "http server failed"),
    }

    bot.delete_webhook().await?;
    info!("webhook removed");
    Ok(())
}

fn webhook_options(cfg: &Config, url: Url) -> Options {
    let mut options = Options::new(cfg.listen_addr, url).drop_pending_updates();
    if let Some(secret) = &cfg.webhook_secret {
        options = options.secret_token(secret.clone());
    }
    options
}

fn service_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
}

async fn root() -> &'static str {
    "crb relay bot is running"
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mode": if state.cfg.uses_webhook() { "webhook" } else { "polling" },
        "mappings": state.store.count().await,
        "store_bytes": state.store.file_size().await,
    }))
}
