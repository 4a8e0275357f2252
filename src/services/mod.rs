//! Business logic services

pub mod cancellation;
pub mod event_linker;
pub mod import_history;
pub mod importer;
pub mod matcher;
pub mod row_parser;
pub mod spreadsheet;
pub mod upsert;
