use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use crate::error::SalesError;
use crate::models::{columns, BucketKey, Period, RepTotals, SalesTable, TeamSummary, TrendSeries};

fn column_values(
    table: &SalesTable,
    column: &str,
    limit: Option<usize>,
) -> Result<Vec<f64>, SalesError> {
    table.require_column(column)?;
    table.ensure_not_empty()?;
    let mut values = Vec::new();
    for record in table.head(limit) {
        if let Some(value) = record.number(column)? {
            values.push(value);
        }
    }
    Ok(values)
}

pub fn sum(table: &SalesTable, column: &str, limit: Option<usize>) -> Result<f64, SalesError> {
    Ok(column_values(table, column, limit)?.iter().sum())
}

pub fn mean(table: &SalesTable, column: &str, limit: Option<usize>) -> Result<f64, SalesError> {
    let values = column_values(table, column, limit)?;
    if values.is_empty() {
        return Err(SalesError::NoValidRecords(format!(
            "column {column} has no numeric values"
        )));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn team_summary(table: &SalesTable) -> Result<TeamSummary, SalesError> {
    Ok(TeamSummary {
        total_leads: sum(table, columns::LEAD_TAKEN, None)?.round() as i64,
        total_revenue_confirmed: sum(table, columns::REVENUE_CONFIRMED, None)?,
        total_tours_booked: sum(table, columns::TOURS_BOOKED, None)?.round() as i64,
        total_applications: sum(table, columns::APPLICATIONS, None)?.round() as i64,
        avg_apps_per_lead: mean(table, columns::APPS_PER_LEAD, None)?,
        avg_apps_per_tour: mean(table, columns::APPS_PER_TOUR, None)?,
        avg_tours_per_lead: mean(table, columns::TOURS_PER_LEAD, None)?,
        total_revenue_pending: sum(table, columns::REVENUE_PENDING, None)?,
        revenue_runrate: mean(table, columns::REVENUE_RUNRATE, None)?,
        avg_deal_value: mean(table, columns::AVG_DEAL_VALUE_30_DAYS, None)?,
    })
}

/// Sum `column` per calendar bucket. Buckets without rows are absent.
pub fn resample(table: &SalesTable, period: Period, column: &str) -> Result<TrendSeries, SalesError> {
    table.require_column(columns::DATED)?;
    table.require_column(column)?;
    table.ensure_not_empty()?;

    let mut buckets: BTreeMap<BucketKey, f64> = BTreeMap::new();
    for record in &table.records {
        let Some(date) = record.dated else {
            continue;
        };
        let value = record.number(column)?.unwrap_or(0.0);
        *buckets.entry(BucketKey::for_date(date, period)).or_insert(0.0) += value;
    }

    if buckets.is_empty() {
        return Err(SalesError::NoValidRecords(
            "No valid date entries in the data".to_string(),
        ));
    }

    Ok(TrendSeries {
        period,
        column: column.to_string(),
        buckets,
    })
}

impl TrendSeries {
    /// Re-group into `period`. Same period is an identity; monthly to quarterly
    /// folds months together. Quarters cannot be split back into months.
    pub fn rebucket(&self, period: Period) -> Result<TrendSeries, SalesError> {
        if self.period == Period::Quarterly && period == Period::Monthly {
            return Err(SalesError::InvalidPeriod(format!(
                "cannot split {} buckets into {}",
                self.period, period
            )));
        }
        let mut buckets: BTreeMap<BucketKey, f64> = BTreeMap::new();
        for (key, value) in &self.buckets {
            let first_day = key.first_day().ok_or_else(|| {
                SalesError::InvalidPeriod(format!("bucket {key} has no calendar date"))
            })?;
            *buckets
                .entry(BucketKey::for_date(first_day, period))
                .or_insert(0.0) += value;
        }
        Ok(TrendSeries {
            period,
            column: self.column.clone(),
            buckets,
        })
    }

    pub fn to_labelled(&self) -> BTreeMap<String, f64> {
        self.buckets
            .iter()
            .map(|(key, value)| (key.to_string(), *value))
            .collect()
    }
}

/// Totals per employee, highest confirmed revenue first.
pub fn rep_totals(table: &SalesTable) -> Result<Vec<RepTotals>, SalesError> {
    table.ensure_not_empty()?;
    let mut totals: HashMap<i64, RepTotals> = HashMap::new();

    for record in &table.records {
        let employee_id = record.employee_id()?;
        let entry = match totals.entry(employee_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(RepTotals {
                employee_id,
                employee_name: record.employee_name()?,
                leads: 0.0,
                tours_booked: 0.0,
                applications: 0.0,
                revenue_confirmed: 0.0,
                rows: 0,
            }),
        };

        entry.leads += record.number(columns::LEAD_TAKEN)?.unwrap_or(0.0);
        entry.tours_booked += record.number(columns::TOURS_BOOKED)?.unwrap_or(0.0);
        entry.applications += record.number(columns::APPLICATIONS)?.unwrap_or(0.0);
        entry.revenue_confirmed += record.number(columns::REVENUE_CONFIRMED)?.unwrap_or(0.0);
        entry.rows += 1;
    }

    let mut values: Vec<RepTotals> = totals.into_values().collect();
    values.sort_by(|a, b| {
        b.revenue_confirmed
            .partial_cmp(&a.revenue_confirmed)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.employee_id.cmp(&b.employee_id))
    });
    Ok(values)
}
