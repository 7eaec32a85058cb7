use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, warn};

use crate::error::SalesError;
use crate::models::{columns, Cell, SalesRecord, SalesTable};

/// Day-first formats come before year-first ones, so `01/02/2024` is 1 February.
const DATE_FORMATS: [&str; 5] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    Csv,
    Json,
}

impl DataFormat {
    pub fn from_path(path: &Path) -> Result<Self, SalesError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(DataFormat::Csv),
            Some("json") => Ok(DataFormat::Json),
            _ => Err(SalesError::DataUnavailable(format!(
                "unsupported file format: {}",
                path.display()
            ))),
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|datetime| datetime.date_naive())
}

pub fn load_table(path: &Path) -> Result<SalesTable, SalesError> {
    let (header, rows) = match DataFormat::from_path(path)? {
        DataFormat::Csv => read_csv(path)?,
        DataFormat::Json => read_json(path)?,
    };
    let table = build_table(header, rows)?;
    debug!(
        path = %path.display(),
        rows = table.len(),
        dropped = table.dropped_rows,
        "Loaded sales table"
    );
    Ok(table)
}

type RawRows = Vec<BTreeMap<String, Cell>>;

fn read_csv(path: &Path) -> Result<(Vec<String>, RawRows), SalesError> {
    let unavailable = |e: csv::Error| {
        SalesError::DataUnavailable(format!("failed to read {}: {e}", path.display()))
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(unavailable)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(unavailable)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(unavailable)?;
        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(header, field)| (header.clone(), Cell::parse(field)))
            .collect();
        rows.push(cells);
    }
    Ok((headers, rows))
}

fn read_json(path: &Path) -> Result<(Vec<String>, RawRows), SalesError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        SalesError::DataUnavailable(format!("failed to read {}: {e}", path.display()))
    })?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        SalesError::DataUnavailable(format!("failed to parse {}: {e}", path.display()))
    })?;
    let items = value.as_array().ok_or_else(|| {
        SalesError::DataUnavailable(format!(
            "{} must hold an array of row objects",
            path.display()
        ))
    })?;

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| {
            SalesError::DataUnavailable(format!("row {} is not a JSON object", idx + 1))
        })?;
        let mut cells = BTreeMap::new();
        for (key, value) in object {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
            cells.insert(key.clone(), Cell::from_json(value));
        }
        rows.push(cells);
    }
    // Rows missing a key read as blank for it.
    for cells in &mut rows {
        for header in &headers {
            cells.entry(header.clone()).or_insert(Cell::Empty);
        }
    }
    Ok((headers, rows))
}

fn build_table(header: Vec<String>, rows: RawRows) -> Result<SalesTable, SalesError> {
    let has_dates = header.iter().any(|c| c == columns::DATED);
    let check_ids = header.iter().any(|c| c == columns::EMPLOYEE_ID);
    let total = rows.len();

    let mut records = Vec::with_capacity(total);
    let mut dropped = Vec::new();
    for (idx, cells) in rows.into_iter().enumerate() {
        let row = idx + 1;
        let dated = if has_dates {
            let parsed = cells
                .get(columns::DATED)
                .and_then(|cell| parse_date(&cell.to_string()));
            if parsed.is_none() {
                dropped.push(row);
                continue;
            }
            parsed
        } else {
            None
        };

        let record = SalesRecord { row, dated, cells };
        if check_ids {
            record.employee_id().map_err(|e| {
                SalesError::DataUnavailable(format!("employee_id must be an integer: {e}"))
            })?;
        }
        records.push(record);
    }

    if !dropped.is_empty() {
        let preview: Vec<String> = dropped.iter().take(10).map(|r| r.to_string()).collect();
        warn!(
            dropped = dropped.len(),
            rows = %preview.join(", "),
            "Dropped rows with invalid date format"
        );
    }

    if records.is_empty() {
        let reason = if total == 0 {
            "the sales file has no rows".to_string()
        } else {
            "No valid date entries in the data".to_string()
        };
        return Err(SalesError::NoValidRecords(reason));
    }

    Ok(SalesTable {
        columns: header,
        records,
        dropped_rows: dropped.len(),
    })
}
