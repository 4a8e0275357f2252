//! Customer types

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::identity::CanonicalIdentity;

/// Extension data imported alongside a customer but not modeled as columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerExtra {
    /// Imported service names, kept as free-form history alongside the
    /// aggregate counters.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technician: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_pets: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_kids: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_valid: Option<bool>,
}

/// Customer entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,

    // Identity. `phone` is the raw value as last imported or entered;
    // the canonical columns are what matching runs on.
    pub phone: Option<String>,
    pub phone_e164: Option<String>,
    pub phone_last10: Option<String>,
    pub email: Option<String>,

    // Address
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,

    pub customer_type: Option<String>,

    /// Ordered, exact-string de-duplicated.
    pub vehicles: Vec<String>,

    // Service history aggregates. Never decreased by an import.
    pub first_visit: Option<NaiveDate>,
    pub last_completed_service: Option<NaiveDate>,
    pub completed_service_count: i32,
    pub lifetime_value: Decimal,

    pub extra: Json<CustomerExtra>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerRecord {
    /// The identity this record matches under.
    pub fn identity(&self) -> CanonicalIdentity {
        CanonicalIdentity {
            e164: self.phone_e164.clone(),
            last10: self.phone_last10.clone(),
        }
    }
}

/// One entry in a customer's append-only notes collection.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CustomerNote {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Customer profile with notes, as served over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfileResponse {
    #[serde(flatten)]
    pub customer: CustomerRecord,
    pub notes: Vec<CustomerNote>,
}

/// Request to edit a single note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNoteRequest {
    pub body: String,
}
