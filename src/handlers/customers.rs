//! Customer profile handlers
//!
//! Read surface for the import results UI and the event linker, plus the
//! single-note edit/delete operations. Notes are append-only from the
//! import side; these two endpoints are the only way a note changes after
//! it is written.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::db::queries;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::types::{CustomerProfileResponse, UpdateNoteRequest};

/// GET /accounts/:account_id/customers/:customer_id
pub async fn get_customer_profile(
    State(state): State<AppState>,
    Path((account_id, customer_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<CustomerProfileResponse>, ApiError> {
    let customer = queries::customer::get_customer(&state.pool, account_id, customer_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    let notes = queries::customer::list_notes(&state.pool, customer.id).await?;

    Ok(Json(CustomerProfileResponse { customer, notes }))
}

/// PATCH /accounts/:account_id/customers/:customer_id/notes/:note_id
pub async fn update_note(
    State(state): State<AppState>,
    Path((account_id, customer_id, note_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(request): Json<UpdateNoteRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.body.trim().is_empty() {
        return Err(ApiError::BadRequest("note body must not be empty".to_string()));
    }

    let updated =
        queries::customer::update_note(&state.pool, account_id, customer_id, note_id, &request.body)
            .await?;
    if !updated {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "updated": true })))
}

/// DELETE /accounts/:account_id/customers/:customer_id/notes/:note_id
pub async fn delete_note(
    State(state): State<AppState>,
    Path((account_id, customer_id, note_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Json<Value>, ApiError> {
    let deleted =
        queries::customer::delete_note(&state.pool, account_id, customer_id, note_id).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "deleted": true })))
}
