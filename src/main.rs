//! DetailDesk Worker - customer import and identity matching backend
//!
//! Serves the bulk-import pipeline (spreadsheet upload, identity
//! reconciliation, streamed progress) and phone-based event linking over
//! HTTP.

mod config;
mod db;
mod error;
mod handlers;
mod identity;
mod services;
mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::db::queries::customer::PgCustomerStore;
use crate::handlers::AppState;
use crate::services::importer::ImportRunner;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ./logs
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,detaildesk_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    info!("Starting DetailDesk Worker...");

    // Load configuration
    let config = config::Config::from_env()?;
    info!(
        "Configuration loaded (home country {}, progress every {} rows)",
        config.home_country.alpha2, config.progress_interval
    );

    // Connect to database
    let pool = db::create_pool(&config.database_url).await?;
    info!("Connected to PostgreSQL");

    // Run migrations
    db::run_migrations(&pool).await?;

    let store = Arc::new(PgCustomerStore::new(pool.clone()));
    let runner = Arc::new(ImportRunner::new(
        store,
        config.home_country,
        config.progress_interval,
    ));

    let state = AppState {
        pool,
        runner,
        home: config.home_country,
    };
    let app = handlers::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
