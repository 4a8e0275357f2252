//! Event linking handler
//!
//! The calendar system is an external collaborator: the caller ships the
//! candidate events in the request body and gets back the subset belonging
//! to the customer, split into upcoming and past.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::db::queries;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::services::event_linker::link_events;
use crate::types::{CalendarEvent, LinkedEvents};

/// POST /accounts/:account_id/customers/:customer_id/events/link
pub async fn link_customer_events(
    State(state): State<AppState>,
    Path((account_id, customer_id)): Path<(Uuid, Uuid)>,
    Json(events): Json<Vec<CalendarEvent>>,
) -> Result<Json<LinkedEvents>, ApiError> {
    let customer = queries::customer::get_customer(&state.pool, account_id, customer_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let linked = link_events(&customer.identity(), events, Utc::now(), state.home);
    Ok(Json(linked))
}
