use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::error::SalesError;

pub mod columns {
    pub const EMPLOYEE_ID: &str = "employee_id";
    pub const EMPLOYEE_NAME: &str = "employee_name";
    pub const DATED: &str = "dated";
    pub const LEAD_TAKEN: &str = "lead_taken";
    pub const TOURS_BOOKED: &str = "tours_booked";
    pub const APPLICATIONS: &str = "applications";
    pub const REVENUE_CONFIRMED: &str = "revenue_confirmed";
    pub const REVENUE_PENDING: &str = "revenue_pending";
    pub const AVG_DEAL_VALUE_30_DAYS: &str = "avg_deal_value_30_days";
    pub const TOURS_PER_LEAD: &str = "tours_per_lead";
    pub const APPS_PER_TOUR: &str = "apps_per_tour";
    pub const APPS_PER_LEAD: &str = "apps_per_lead";
    pub const REVENUE_RUNRATE: &str = "revenue_runrate";

    /// Per-weekday call counters, Monday first.
    pub const WEEKDAY_CALLS: [&str; 7] = [
        "mon_call",
        "tue_call",
        "wed_call",
        "thur_call",
        "fri_call",
        "sat_call",
        "sun_call",
    ];
}

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Empty,
}

impl Cell {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => Cell::Number(value),
            Ok(_) => Cell::Empty,
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Cell::Empty,
            serde_json::Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Empty),
            serde_json::Value::String(s) if s.trim().is_empty() => Cell::Empty,
            serde_json::Value::String(s) => Cell::Text(s.clone()),
            serde_json::Value::Bool(b) => Cell::Number(if *b { 1.0 } else { 0.0 }),
            other => Cell::Text(other.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Whole numbers serialize as JSON integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Number(value) if value.fract() == 0.0 && value.abs() < 9.0e15 => {
                serde_json::Value::from(*value as i64)
            }
            Cell::Number(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Text(text) => serde_json::Value::String(text.clone()),
            Cell::Empty => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(value) => write!(f, "{value}"),
            Cell::Text(text) => f.write_str(text),
            Cell::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SalesRecord {
    /// 1-based data row in the source file
    pub row: usize,
    pub dated: Option<NaiveDate>,
    pub cells: BTreeMap<String, Cell>,
}

impl SalesRecord {
    pub fn cell(&self, column: &str) -> Result<&Cell, SalesError> {
        self.cells
            .get(column)
            .ok_or_else(|| SalesError::MissingField(column.to_string()))
    }

    /// Numeric value of `column`; `None` for a blank cell.
    pub fn number(&self, column: &str) -> Result<Option<f64>, SalesError> {
        match self.cell(column)? {
            Cell::Number(value) => Ok(Some(*value)),
            Cell::Empty => Ok(None),
            Cell::Text(text) => Err(SalesError::InvalidValue {
                column: column.to_string(),
                row: self.row,
                value: text.clone(),
            }),
        }
    }

    pub fn employee_id(&self) -> Result<i64, SalesError> {
        let cell = self.cell(columns::EMPLOYEE_ID)?;
        let parsed = match cell {
            Cell::Number(value) if value.fract() == 0.0 => Some(*value as i64),
            Cell::Text(text) => text.trim().parse::<i64>().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| SalesError::InvalidValue {
            column: columns::EMPLOYEE_ID.to_string(),
            row: self.row,
            value: cell.to_string(),
        })
    }

    pub fn employee_name(&self) -> Result<String, SalesError> {
        Ok(self.cell(columns::EMPLOYEE_NAME)?.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SalesTable {
    pub columns: Vec<String>,
    pub records: Vec<SalesRecord>,
    /// Rows discarded because their date did not parse
    pub dropped_rows: usize,
}

impl SalesTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<(), SalesError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(SalesError::MissingField(column.to_string()))
        }
    }

    pub fn ensure_not_empty(&self) -> Result<(), SalesError> {
        if self.is_empty() {
            Err(SalesError::NoValidRecords(
                "the sales table has no rows".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    pub fn head(&self, limit: Option<usize>) -> &[SalesRecord] {
        match limit {
            Some(n) => &self.records[..n.min(self.records.len())],
            None => &self.records,
        }
    }

    pub fn records_for(&self, employee_id: i64) -> Result<Vec<&SalesRecord>, SalesError> {
        self.require_column(columns::EMPLOYEE_ID)?;
        let mut matches = Vec::new();
        for record in &self.records {
            if record.employee_id()? == employee_id {
                matches.push(record);
            }
        }
        if matches.is_empty() {
            return Err(SalesError::NotFound(format!(
                "No data found for representative ID {employee_id}"
            )));
        }
        Ok(matches)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamSummary {
    pub total_leads: i64,
    pub total_revenue_confirmed: f64,
    pub total_tours_booked: i64,
    pub total_applications: i64,
    pub avg_apps_per_lead: f64,
    pub avg_apps_per_tour: f64,
    pub avg_tours_per_lead: f64,
    pub total_revenue_pending: f64,
    pub revenue_runrate: f64,
    pub avg_deal_value: f64,
}

impl TeamSummary {
    /// Plain-language paragraph used in prompts and reports.
    pub fn statement(&self) -> String {
        format!(
            "Team has generated {} leads, booked {} tours, and processed {} applications.\n\
             Confirmed revenue: ${:.2}, Pending revenue: ${:.2}.\n\
             Average deal value: ${:.2}, Revenue runrate: ${:.2}.\n\
             Conversion rates: {:.2} tours per lead, {:.2} apps per tour, {:.2} apps per lead.",
            self.total_leads,
            self.total_tours_booked,
            self.total_applications,
            self.total_revenue_confirmed,
            self.total_revenue_pending,
            self.avg_deal_value,
            self.revenue_runrate,
            self.avg_tours_per_lead,
            self.avg_apps_per_tour,
            self.avg_apps_per_lead,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepTotals {
    pub employee_id: i64,
    pub employee_name: String,
    pub leads: f64,
    pub tours_booked: f64,
    pub applications: f64,
    pub revenue_confirmed: f64,
    pub rows: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Monthly,
    Quarterly,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Monthly => "monthly",
            Period::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = SalesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Ok(Period::Monthly),
            "quarterly" => Ok(Period::Quarterly),
            _ => Err(SalesError::InvalidPeriod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BucketUnit {
    Month(u32),
    Quarter(u32),
}

/// A calendar month (`YYYY-MM`) or quarter (`YYYY-Qn`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub year: i32,
    pub unit: BucketUnit,
}

#[derive(Debug, Error)]
#[error("invalid bucket key {0:?}")]
pub struct ParseBucketKeyError(pub String);

impl BucketKey {
    pub fn month(year: i32, month: u32) -> Self {
        Self {
            year,
            unit: BucketUnit::Month(month),
        }
    }

    pub fn quarter(year: i32, quarter: u32) -> Self {
        Self {
            year,
            unit: BucketUnit::Quarter(quarter),
        }
    }

    pub fn for_date(date: NaiveDate, period: Period) -> Self {
        match period {
            Period::Monthly => Self::month(date.year(), date.month()),
            Period::Quarterly => Self::quarter(date.year(), (date.month() - 1) / 3 + 1),
        }
    }

    pub fn period(&self) -> Period {
        match self.unit {
            BucketUnit::Month(_) => Period::Monthly,
            BucketUnit::Quarter(_) => Period::Quarterly,
        }
    }

    /// First calendar day covered by the bucket.
    pub fn first_day(&self) -> Option<NaiveDate> {
        let month = match self.unit {
            BucketUnit::Month(m) => m,
            BucketUnit::Quarter(q) => (q - 1) * 3 + 1,
        };
        NaiveDate::from_ymd_opt(self.year, month, 1)
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            BucketUnit::Month(m) => write!(f, "{:04}-{:02}", self.year, m),
            BucketUnit::Quarter(q) => write!(f, "{:04}-Q{}", self.year, q),
        }
    }
}

impl FromStr for BucketKey {
    type Err = ParseBucketKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseBucketKeyError(s.to_string());
        let (year, rest) = s.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;

        if let Some(quarter) = rest.strip_prefix('Q') {
            let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
            if !(1..=4).contains(&quarter) {
                return Err(invalid());
            }
            return Ok(Self::quarter(year, quarter));
        }

        if rest.len() != 2 {
            return Err(invalid());
        }
        let month: u32 = rest.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self::month(year, month))
    }
}

impl Serialize for BucketKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BucketKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub period: Period,
    pub column: String,
    pub buckets: BTreeMap<BucketKey, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedFeatures {
    pub row: usize,
    pub dated: Option<NaiveDate>,
    pub value: Option<f64>,
    /// Previous row's value
    pub lag: Option<f64>,
    /// Mean of this and the two previous values
    pub rolling_avg: Option<f64>,
    pub day_of_week: Option<String>,
    pub month: Option<u32>,
    pub quarter: Option<BucketKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(row: usize, id: &str) -> SalesRecord {
        let mut cells = BTreeMap::new();
        cells.insert(columns::EMPLOYEE_ID.to_string(), Cell::parse(id));
        cells.insert(columns::EMPLOYEE_NAME.to_string(), Cell::parse("Avery Lee"));
        cells.insert(columns::LEAD_TAKEN.to_string(), Cell::parse(""));
        SalesRecord {
            row,
            dated: None,
            cells,
        }
    }

    #[test]
    fn cells_parse_numbers_text_and_blanks() {
        assert_eq!(Cell::parse(" 42 "), Cell::Number(42.0));
        assert_eq!(Cell::parse("3.5"), Cell::Number(3.5));
        assert_eq!(Cell::parse(""), Cell::Empty);
        assert_eq!(Cell::parse("NaN"), Cell::Empty);
        assert_eq!(Cell::parse("Avery"), Cell::Text("Avery".to_string()));
    }

    #[test]
    fn whole_numbers_serialize_as_integers() {
        assert_eq!(Cell::Number(7.0).to_json(), serde_json::json!(7));
        assert_eq!(Cell::Number(7.25).to_json(), serde_json::json!(7.25));
        assert_eq!(Cell::Empty.to_json(), serde_json::Value::Null);
    }

    #[test]
    fn employee_id_coerces_to_integer() {
        assert_eq!(record(1, "12").employee_id().unwrap(), 12);
        assert!(matches!(
            record(2, "twelve").employee_id(),
            Err(SalesError::InvalidValue { row: 2, .. })
        ));
    }

    #[test]
    fn blank_numeric_cell_reads_as_none() {
        let rec = record(1, "1");
        assert_eq!(rec.number(columns::LEAD_TAKEN).unwrap(), None);
        assert!(matches!(
            rec.number(columns::REVENUE_CONFIRMED),
            Err(SalesError::MissingField(_))
        ));
        assert!(matches!(
            rec.number(columns::EMPLOYEE_NAME),
            Err(SalesError::InvalidValue { .. })
        ));
    }

    #[test]
    fn records_for_unknown_rep_is_not_found() {
        let table = SalesTable {
            columns: vec![columns::EMPLOYEE_ID.to_string()],
            records: vec![record(1, "1"), record(2, "2"), record(3, "1")],
            dropped_rows: 0,
        };
        let rows: Vec<usize> = table.records_for(1).unwrap().iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![1, 3]);
        assert!(matches!(table.records_for(7), Err(SalesError::NotFound(_))));
    }

    #[test]
    fn period_parses_known_names_only() {
        assert_eq!("monthly".parse::<Period>().unwrap(), Period::Monthly);
        assert_eq!("Quarterly".parse::<Period>().unwrap(), Period::Quarterly);
        assert!(matches!(
            "weekly".parse::<Period>(),
            Err(SalesError::InvalidPeriod(_))
        ));
    }

    #[test]
    fn bucket_keys_round_trip_through_text() {
        let month: BucketKey = "2024-03".parse().unwrap();
        assert_eq!(month, BucketKey::month(2024, 3));
        assert_eq!(month.to_string(), "2024-03");

        let quarter: BucketKey = "2024-Q1".parse().unwrap();
        assert_eq!(quarter, BucketKey::quarter(2024, 1));
        assert_eq!(quarter.to_string(), "2024-Q1");

        for bad in ["2024-13", "2024-Q5", "24-01", "2024", "2024-3"] {
            assert!(bad.parse::<BucketKey>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn bucket_for_date_picks_quarter() {
        let date = NaiveDate::from_ymd_opt(2024, 8, 19).unwrap();
        assert_eq!(BucketKey::for_date(date, Period::Quarterly).to_string(), "2024-Q3");
        assert_eq!(BucketKey::for_date(date, Period::Monthly).to_string(), "2024-08");
        assert_eq!(
            BucketKey::quarter(2024, 3).first_day(),
            NaiveDate::from_ymd_opt(2024, 7, 1)
        );
    }
}
