//! HTTP handlers

pub mod customers;
pub mod events;
pub mod import;
pub mod ping;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::Router;
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::identity::Country;
use crate::services::importer::ImportRunner;

/// Shared handler state. `account_id` path segments are trusted here; the
/// auth layer in front of this service has already verified them.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub runner: Arc<ImportRunner>,
    pub home: &'static Country,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(ping::health))
        .route(
            "/accounts/:account_id/imports/customers",
            post(import::upload_customers),
        )
        .route(
            "/accounts/:account_id/imports/:job_id/cancel",
            post(import::cancel_import),
        )
        .route(
            "/accounts/:account_id/imports/history",
            get(import::import_history),
        )
        .route(
            "/accounts/:account_id/imports/template",
            get(import::csv_template),
        )
        .route(
            "/accounts/:account_id/customers/:customer_id",
            get(customers::get_customer_profile),
        )
        .route(
            "/accounts/:account_id/customers/:customer_id/events/link",
            post(events::link_customer_events),
        )
        .route(
            "/accounts/:account_id/customers/:customer_id/notes/:note_id",
            patch(customers::update_note).delete(customers::delete_note),
        )
        // Spreadsheets with job history run well past the default 2 MB cap.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
