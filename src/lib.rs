pub(crate) mod api;
pub(crate) mod core;
pub(crate) mod db;
pub(crate) mod repositories;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use crate::core::config::{Settings, StorageBackend};
use crate::core::{state::AppState, telemetry};
use crate::store::{ExamStore, MemoryStore, PgStore};

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let db_pool = match settings.storage().backend {
        StorageBackend::Postgres => {
            let db_pool = db::init_pool(&settings).await?;
            db::run_migrations(&db_pool).await?;
            Some(db_pool)
        }
        StorageBackend::Memory => None,
    };

    let store: Arc<dyn ExamStore> = match &db_pool {
        Some(pool) => Arc::new(PgStore::new(pool.clone())),
        None => {
            tracing::warn!("Using in-memory exam storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(settings, db_pool, store);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        storage = state.settings().storage().backend.as_str(),
        "LMS exam API listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    if let Some(db) = state.db() {
        db.close().await;
        tracing::info!("Database pool closed");
    }

    Ok(())
}
