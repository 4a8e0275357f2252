//! Spreadsheet decoding
//!
//! Turns an uploaded CSV or XLSX body into a header row plus a grid of typed
//! cells. Cells keep their source type (string/number/boolean); all coercion
//! to domain values happens in the row parser.

use std::io::Cursor;

use calamine::{Data, Reader, Xlsx};

use crate::error::ImportFileError;

/// One spreadsheet cell as it arrived. XLSX preserves numbers and booleans;
/// CSV cells are always text.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
}

impl Cell {
    /// The cell as a non-empty trimmed string, if it has one. Whole numbers
    /// render without a decimal point so phone and zip columns survive the
    /// XLSX float representation.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Cell::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{:.0}", n))
                } else {
                    Some(n.to_string())
                }
            }
            Cell::Bool(b) => Some(if *b { "TRUE".to_string() } else { "FALSE".to_string() }),
            Cell::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_text().is_none()
    }
}

/// A decoded sheet: trimmed header names plus data rows.
#[derive(Debug, Clone)]
pub struct Sheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

/// Decode an upload into a `Sheet`, sniffing the format from content.
/// XLSX files are ZIP archives and always start with the `PK` magic.
pub fn decode(filename: &str, bytes: &[u8]) -> Result<Sheet, ImportFileError> {
    if bytes.is_empty() {
        return Err(ImportFileError::Empty);
    }
    if bytes.starts_with(b"PK\x03\x04") {
        decode_xlsx(bytes)
    } else if filename.to_lowercase().ends_with(".xlsx") {
        // Named .xlsx but not a ZIP archive: corrupt or mislabeled.
        Err(ImportFileError::Unreadable("not a valid XLSX archive".to_string()))
    } else {
        decode_csv(bytes)
    }
}

fn decode_csv(bytes: &[u8]) -> Result<Sheet, ImportFileError> {
    // Excel exports prepend a UTF-8 BOM; the csv crate would fold it into
    // the first header name.
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| ImportFileError::Unreadable(e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ImportFileError::Unreadable(e.to_string()))?;
        let cells = record
            .iter()
            .map(|value| {
                if value.trim().is_empty() {
                    Cell::Empty
                } else {
                    Cell::Text(value.to_string())
                }
            })
            .collect();
        rows.push(cells);
    }

    Ok(Sheet { headers, rows })
}

fn decode_xlsx(bytes: &[u8]) -> Result<Sheet, ImportFileError> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))
        .map_err(|e| ImportFileError::Unreadable(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ImportFileError::Unreadable("workbook has no sheets".to_string()))?
        .map_err(|e| ImportFileError::Unreadable(e.to_string()))?;

    let mut row_iter = range.rows();
    let headers = match row_iter.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| convert_cell(cell).as_text().unwrap_or_default())
            .collect(),
        None => return Err(ImportFileError::Empty),
    };

    let rows = row_iter
        .map(|row| row.iter().map(convert_cell).collect())
        .collect();

    Ok(Sheet { headers, rows })
}

fn convert_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                Cell::Empty
            } else {
                Cell::Text(s.clone())
            }
        }
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        // Date cells come back as serials; render them in the one format
        // the row parser always accepts.
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::Text(naive.format("%Y-%m-%d").to_string()),
            None => Cell::Empty,
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::Error(_) => Cell::Empty,
    }
}
