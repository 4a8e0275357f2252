//! Customer import handlers
//!
//! The upload endpoint answers in one of two shapes: callers that accept
//! `text/event-stream` get progress frames as the batch runs; everyone else
//! gets a single JSON object equal to the terminal frame. Row failures are
//! data inside the stream, never transport failures — only whole-request
//! conditions (no file, unreadable format) produce a 4xx.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::stream::Stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;
use crate::services::cancellation::{CancelError, CANCELLATION};
use crate::services::import_history::{ImportHistoryResponse, IMPORT_HISTORY};
use crate::services::importer::ProgressSink;
use crate::services::row_parser::TEMPLATE_COLUMNS;
use crate::types::ImportEvent;

/// Lets the caller address the running job (e.g. to cancel it) without
/// widening the frame protocol.
const JOB_ID_HEADER: &str = "x-import-job-id";

const HISTORY_LIMIT: usize = 50;

/// POST /accounts/:account_id/imports/customers
pub async fn upload_customers(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut filename = "upload.csv".to_string();
    let mut data: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() == Some("file") {
            if let Some(name) = field.file_name() {
                filename = name.to_string();
            }
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?,
            );
        }
    }
    let data = data.ok_or(ApiError::MissingFile)?;

    let job_id = Uuid::new_v4();
    let started_at = Utc::now();

    // Whole-batch-fatal conditions surface here, before any row has been
    // persisted, so they can still be a plain 4xx.
    let prepared = match state.runner.prepare(job_id, account_id, &filename, &data) {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!("Import {} rejected: {}", job_id, e);
            IMPORT_HISTORY.record_failed(job_id, account_id, &filename, started_at, e.to_string());
            let frame = ImportEvent::Error { message: e.to_string() };
            return Ok((StatusCode::BAD_REQUEST, Json(frame)).into_response());
        }
    };

    info!(
        "Import {} accepted: '{}' ({} rows) for account {}",
        job_id,
        filename,
        prepared.total_rows(),
        account_id
    );

    if wants_event_stream(&headers) {
        let (sink, rx) = ProgressSink::channel(32);
        let runner = Arc::clone(&state.runner);
        tokio::spawn(async move {
            runner.run(prepared, &sink).await;
        });
        Ok(([(JOB_ID_HEADER, job_id.to_string())], progress_sse(rx)).into_response())
    } else {
        let terminal = state.runner.run(prepared, &ProgressSink::discard()).await;
        Ok(([(JOB_ID_HEADER, job_id.to_string())], Json(terminal)).into_response())
    }
}

/// Forward orchestrator frames onto the SSE body. Dropping this stream
/// (client disconnect) drops the receiver; the orchestrator sees the closed
/// channel and stops at the next row boundary.
fn progress_sse(
    mut rx: mpsc::Receiver<ImportEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = event.is_terminal();
            match serde_json::to_string(&event) {
                Ok(json) => yield Ok::<_, Infallible>(Event::default().data(json)),
                Err(e) => warn!("Failed to serialize progress frame: {}", e),
            }
            if terminal {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}

fn wants_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |accept| accept.contains("text/event-stream"))
}

/// POST /accounts/:account_id/imports/:job_id/cancel
pub async fn cancel_import(
    Path((account_id, job_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Value>, ApiError> {
    match CANCELLATION.cancel(&job_id, account_id) {
        Ok(true) => {
            info!("Import {} cancel requested by account {}", job_id, account_id);
            Ok(Json(json!({ "cancelled": true })))
        }
        Ok(false) => Err(ApiError::NotFound),
        Err(CancelError::NotOwner) => Err(ApiError::Forbidden),
    }
}

/// GET /accounts/:account_id/imports/history
pub async fn import_history(
    Path(account_id): Path<Uuid>,
) -> Json<ImportHistoryResponse> {
    Json(IMPORT_HISTORY.recent_for_account(account_id, HISTORY_LIMIT))
}

/// GET /accounts/:account_id/imports/template
pub async fn csv_template() -> impl IntoResponse {
    let body = format!("{}\n", TEMPLATE_COLUMNS.join(","));
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"customer-import-template.csv\"",
            ),
        ],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!wants_event_stream(&headers));

        headers.insert(header::ACCEPT, "application/json".parse().unwrap());
        assert!(!wants_event_stream(&headers));

        headers.insert(header::ACCEPT, "text/event-stream".parse().unwrap());
        assert!(wants_event_stream(&headers));

        headers.insert(
            header::ACCEPT,
            "text/event-stream, application/json;q=0.5".parse().unwrap(),
        );
        assert!(wants_event_stream(&headers));
    }

    #[test]
    fn test_template_covers_every_column() {
        let body = format!("{}\n", TEMPLATE_COLUMNS.join(","));
        assert!(body.starts_with("Name,Phone,"));
        assert!(body.ends_with("State Valid\n"));
        assert_eq!(body.trim_end().split(',').count(), TEMPLATE_COLUMNS.len());
    }
}
