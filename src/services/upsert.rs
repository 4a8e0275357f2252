//! Upsert engine
//!
//! Create-if-absent, merge-if-present persistence of one `ImportRow`. The
//! merge itself is pure; persistence goes through the `CustomerStore` seam
//! so the orchestrator is not married to Postgres. Imports only ever add:
//! blank cells never regress stored data, aggregates never decrease, and a
//! row's note is appended, never overwriting note history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::RowError;
use crate::services::matcher::select_match;
use crate::types::{CustomerRecord, ImportRow};

/// Persistence seam for customer records. Each `create`/`update` call is one
/// transactional unit covering the record write and the optional note
/// append, so a row is applied entirely or not at all.
#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// All records in the account sharing this `last10` key. E.164 equality
    /// implies last10 equality, so this set covers both match strategies.
    async fn find_candidates(
        &self,
        account_id: Uuid,
        last10: &str,
    ) -> anyhow::Result<Vec<CustomerRecord>>;

    async fn create(&self, record: &CustomerRecord, note: Option<&str>) -> anyhow::Result<()>;

    async fn update(&self, record: &CustomerRecord, note: Option<&str>) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Created(Uuid),
    Updated(Uuid),
}

/// Match one parsed row against the store and persist it.
pub async fn upsert_row(
    store: &dyn CustomerStore,
    account_id: Uuid,
    row: &ImportRow,
) -> Result<RowOutcome, RowError> {
    let last10 = row.identity.last10.as_deref().ok_or(RowError::MissingIdentity)?;

    let candidates = store
        .find_candidates(account_id, last10)
        .await
        .map_err(|e| RowError::Persistence(e.to_string()))?;

    let now = Utc::now();
    match select_match(&row.identity, &candidates) {
        Some((existing, _strategy)) => {
            let merged = merge_row(existing, row, now);
            store
                .update(&merged, row.note.as_deref())
                .await
                .map_err(|e| RowError::Persistence(e.to_string()))?;
            Ok(RowOutcome::Updated(merged.id))
        }
        None => {
            let record = record_from_row(account_id, row, now);
            store
                .create(&record, row.note.as_deref())
                .await
                .map_err(|e| RowError::Persistence(e.to_string()))?;
            Ok(RowOutcome::Created(record.id))
        }
    }
}

/// Build a fresh record from a row for a first-seen identity.
pub fn record_from_row(account_id: Uuid, row: &ImportRow, now: DateTime<Utc>) -> CustomerRecord {
    use crate::types::CustomerExtra;
    use sqlx::types::Json;

    CustomerRecord {
        id: Uuid::new_v4(),
        account_id,
        name: row.name.clone(),
        phone: Some(row.phone.clone()),
        phone_e164: row.identity.e164.clone(),
        phone_last10: row.identity.last10.clone(),
        email: row.email.clone(),
        address1: row.address1.clone(),
        address2: row.address2.clone(),
        city: row.city.clone(),
        state: row.state.clone(),
        zip_code: row.zip_code.clone(),
        customer_type: row.customer_type.clone(),
        vehicles: row.vehicles.clone(),
        first_visit: row.first_visit,
        last_completed_service: row.last_visit,
        completed_service_count: row.visit_count,
        lifetime_value: row.lifetime_value,
        extra: Json(CustomerExtra {
            services: row.services.clone(),
            location: row.location.clone(),
            technician: row.technician.clone(),
            has_pets: row.has_pets,
            has_kids: row.has_kids,
            state_valid: row.state_valid,
        }),
        created_at: now,
        updated_at: now,
    }
}

/// Merge a row into an existing record.
///
/// Scalars are overwritten only by non-empty row values. Vehicles keep the
/// existing order with new entries appended. Counters take the larger value:
/// import data is a snapshot that may lag live activity and must never
/// decrease them.
pub fn merge_row(existing: &CustomerRecord, row: &ImportRow, now: DateTime<Utc>) -> CustomerRecord {
    let mut merged = existing.clone();
    merged.updated_at = now;

    if !row.name.is_empty() {
        merged.name = row.name.clone();
    }

    // The row matched this record by phone; keep the freshest raw form and
    // upgrade the canonical keys the record is missing.
    merged.phone = Some(row.phone.clone());
    if merged.phone_e164.is_none() {
        merged.phone_e164 = row.identity.e164.clone();
    }
    if merged.phone_last10.is_none() {
        merged.phone_last10 = row.identity.last10.clone();
    }

    overwrite_if_present(&mut merged.email, &row.email);
    overwrite_if_present(&mut merged.address1, &row.address1);
    overwrite_if_present(&mut merged.address2, &row.address2);
    overwrite_if_present(&mut merged.city, &row.city);
    overwrite_if_present(&mut merged.state, &row.state);
    overwrite_if_present(&mut merged.zip_code, &row.zip_code);
    overwrite_if_present(&mut merged.customer_type, &row.customer_type);

    for vehicle in &row.vehicles {
        if !merged.vehicles.iter().any(|v| v == vehicle) {
            merged.vehicles.push(vehicle.clone());
        }
    }

    merged.completed_service_count = merged.completed_service_count.max(row.visit_count);
    merged.lifetime_value = merged.lifetime_value.max(row.lifetime_value);
    merged.last_completed_service = merged.last_completed_service.max(row.last_visit);
    merged.first_visit = match (merged.first_visit, row.first_visit) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    };

    let extra = &mut merged.extra.0;
    for service in &row.services {
        if !extra.services.iter().any(|s| s == service) {
            extra.services.push(service.clone());
        }
    }
    overwrite_if_present(&mut extra.location, &row.location);
    overwrite_if_present(&mut extra.technician, &row.technician);
    if row.has_pets.is_some() {
        extra.has_pets = row.has_pets;
    }
    if row.has_kids.is_some() {
        extra.has_kids = row.has_kids;
    }
    if row.state_valid.is_some() {
        extra.state_valid = row.state_valid;
    }

    merged
}

fn overwrite_if_present(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        *target = value.clone();
    }
}
