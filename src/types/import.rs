//! Import row types

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::CanonicalIdentity;

/// One parsed spreadsheet row, every cell coerced to its typed form.
/// A value is `Some` only when the source cell was non-empty, so the merge
/// step can distinguish "blank cell" from "explicitly provided".
#[derive(Debug, Clone, Default)]
pub struct ImportRow {
    pub name: String,
    /// Raw phone as typed in the sheet.
    pub phone: String,
    pub identity: CanonicalIdentity,
    pub email: Option<String>,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub vehicles: Vec<String>,
    pub services: Vec<String>,
    pub customer_type: Option<String>,
    pub first_visit: Option<NaiveDate>,
    pub last_visit: Option<NaiveDate>,
    pub visit_count: i32,
    pub lifetime_value: Decimal,
    pub location: Option<String>,
    pub technician: Option<String>,
    pub note: Option<String>,
    pub has_pets: Option<bool>,
    pub has_kids: Option<bool>,
    pub state_valid: Option<bool>,
}

/// One row-level failure, as reported in the terminal `complete` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowFailure {
    /// 1-based spreadsheet row number; the header is row 1.
    pub row: usize,
    pub error: String,
}
