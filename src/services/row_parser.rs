//! Row parsing
//!
//! Binds template columns to a sheet's header row (order-independent,
//! case-insensitive) and coerces one row of typed cells into an `ImportRow`.
//! Identity is strict — a row without a usable phone is rejected. Everything
//! derived (money, dates, flags) is lenient: a cell that cannot be coerced
//! degrades to empty/zero instead of failing the row.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::error::{ImportFileError, RowError};
use crate::identity::{canonicalize_multi_value, normalize_phone, Country};
use crate::services::spreadsheet::Cell;
use crate::types::ImportRow;

/// Template column names, in template order. Header matching ignores case
/// and any parenthetical hint, so "Vehicles (semicolon-separated)" binds to
/// "Vehicles".
pub const TEMPLATE_COLUMNS: &[&str] = &[
    "Name",
    "Phone",
    "Email",
    "Address 1",
    "Address 2",
    "City",
    "State",
    "Zip Code",
    "Vehicles",
    "Services",
    "Customer Type",
    "First Visit",
    "Last Visit",
    "Visits",
    "Lifetime Value",
    "Location",
    "Technician",
    "Notes",
    "Pets",
    "Kids",
    "State Valid",
];

const MULTI_VALUE_DELIMITER: char = ';';

/// Column bindings for one sheet. Only the phone column is mandatory; a
/// missing optional column simply leaves its field empty on every row.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    name: Option<usize>,
    phone: usize,
    email: Option<usize>,
    address1: Option<usize>,
    address2: Option<usize>,
    city: Option<usize>,
    state: Option<usize>,
    zip_code: Option<usize>,
    vehicles: Option<usize>,
    services: Option<usize>,
    customer_type: Option<usize>,
    first_visit: Option<usize>,
    last_visit: Option<usize>,
    visits: Option<usize>,
    lifetime_value: Option<usize>,
    location: Option<usize>,
    technician: Option<usize>,
    notes: Option<usize>,
    pets: Option<usize>,
    kids: Option<usize>,
    state_valid: Option<usize>,
}

fn normalize_header(header: &str) -> String {
    let base = header.split('(').next().unwrap_or(header);
    base.trim().to_lowercase()
}

impl ColumnMap {
    pub fn from_headers(headers: &[String]) -> Result<Self, ImportFileError> {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let find = |name: &str| normalized.iter().position(|h| h == name);

        let phone = find("phone").ok_or(ImportFileError::MissingColumn("Phone"))?;

        Ok(Self {
            name: find("name"),
            phone,
            email: find("email"),
            address1: find("address 1"),
            address2: find("address 2"),
            city: find("city"),
            state: find("state"),
            zip_code: find("zip code"),
            vehicles: find("vehicles"),
            services: find("services"),
            customer_type: find("customer type"),
            first_visit: find("first visit"),
            last_visit: find("last visit"),
            visits: find("visits"),
            lifetime_value: find("lifetime value"),
            location: find("location"),
            technician: find("technician"),
            notes: find("notes"),
            pets: find("pets"),
            kids: find("kids"),
            state_valid: find("state valid"),
        })
    }

    /// Coerce one row of cells. `home` drives phone normalization.
    pub fn parse_row(&self, cells: &[Cell], home: &Country) -> Result<ImportRow, RowError> {
        let phone = self
            .text(cells, Some(self.phone))
            .ok_or(RowError::MissingIdentity)?;
        let identity = normalize_phone(&phone, home);
        if !identity.is_matchable() {
            return Err(RowError::MissingIdentity);
        }

        let multi = |idx: Option<usize>| -> Vec<String> {
            self.text(cells, idx)
                .map(|raw| canonicalize_multi_value(&raw, MULTI_VALUE_DELIMITER))
                .unwrap_or_default()
        };

        Ok(ImportRow {
            name: self.text(cells, self.name).unwrap_or_default(),
            phone,
            identity,
            email: self.text(cells, self.email),
            address1: self.text(cells, self.address1),
            address2: self.text(cells, self.address2),
            city: self.text(cells, self.city),
            state: self.text(cells, self.state),
            zip_code: self.text(cells, self.zip_code),
            vehicles: multi(self.vehicles),
            services: multi(self.services),
            customer_type: self.text(cells, self.customer_type),
            first_visit: self.text(cells, self.first_visit).as_deref().and_then(parse_date_loose),
            last_visit: self.text(cells, self.last_visit).as_deref().and_then(parse_date_loose),
            visit_count: self.text(cells, self.visits).as_deref().map_or(0, parse_count_loose),
            lifetime_value: self
                .text(cells, self.lifetime_value)
                .as_deref()
                .map_or(Decimal::ZERO, parse_currency),
            location: self.text(cells, self.location),
            technician: self.text(cells, self.technician),
            note: self.text(cells, self.notes),
            has_pets: self.text(cells, self.pets).as_deref().and_then(parse_bool_loose),
            has_kids: self.text(cells, self.kids).as_deref().and_then(parse_bool_loose),
            state_valid: self.text(cells, self.state_valid).as_deref().and_then(parse_bool_loose),
        })
    }

    fn text(&self, cells: &[Cell], idx: Option<usize>) -> Option<String> {
        idx.and_then(|i| cells.get(i)).and_then(Cell::as_text)
    }
}

/// Currency cells like `"$1,272.00"`. Lifetime value is advisory data, so an
/// unparseable cell is zero, never a row failure.
fn parse_currency(raw: &str) -> Decimal {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Visit counters, same advisory rationale as currency.
fn parse_count_loose(raw: &str) -> i32 {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if let Ok(n) = cleaned.parse::<i32>() {
        return n;
    }
    // XLSX-originated counters may render as floats.
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => f as i32,
        _ => 0,
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%d.%m.%Y"];

/// Permissive date parsing; an unparseable date is stored as `None`.
fn parse_date_loose(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    // ISO date-times from XLSX exports.
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }
    None
}

fn parse_bool_loose(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
