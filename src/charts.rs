use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use ndarray::{Array1, Array2};
use ndarray_stats::histogram::{Bins, Edges, Grid, HistogramExt};
use ndarray_stats::interpolate::Linear;
use ndarray_stats::{CorrelationExt, Quantile1dExt};
use noisy_float::types::{n64, N64};
use serde::Serialize;

use crate::aggregate;
use crate::error::SalesError;
use crate::models::{columns, SalesTable};

pub const HISTOGRAM_BINS: usize = 30;

pub const CORRELATION_COLUMNS: [&str; 7] = [
    columns::LEAD_TAKEN,
    columns::TOURS_BOOKED,
    columns::APPLICATIONS,
    columns::REVENUE_CONFIRMED,
    columns::TOURS_PER_LEAD,
    columns::APPS_PER_TOUR,
    columns::APPS_PER_LEAD,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chart {
    LinePlot,
    Histogram,
    Heatmap,
    BoxPlot,
    BarPlot,
    CallsHeatmap,
    FacetGrid,
    InteractivePlot,
}

impl Chart {
    pub const ALL: [Chart; 8] = [
        Chart::LinePlot,
        Chart::Histogram,
        Chart::Heatmap,
        Chart::BoxPlot,
        Chart::BarPlot,
        Chart::CallsHeatmap,
        Chart::FacetGrid,
        Chart::InteractivePlot,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Chart::LinePlot => "line_plot",
            Chart::Histogram => "histogram",
            Chart::Heatmap => "heatmap",
            Chart::BoxPlot => "box_plot",
            Chart::BarPlot => "bar_plot",
            Chart::CallsHeatmap => "calls_heatmap",
            Chart::FacetGrid => "facet_grid",
            Chart::InteractivePlot => "interactive_plot",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Chart::LinePlot | Chart::InteractivePlot => {
                "Revenue Confirmed Over Time for Each Employee"
            }
            Chart::Histogram => "Distribution of Revenue Confirmed",
            Chart::Heatmap => "Correlation Heatmap",
            Chart::BoxPlot => "Box Plot of Revenue Confirmed by Employee",
            Chart::BarPlot => "Average Tours Booked by Day of the Week",
            Chart::CallsHeatmap => "Heatmap of Total Calls by Day of the Week",
            Chart::FacetGrid => "Revenue Confirmed per Employee",
        }
    }

    /// Numbers plotted by this chart, as JSON.
    pub fn data(&self, table: &SalesTable) -> Result<serde_json::Value, SalesError> {
        match self {
            Chart::LinePlot | Chart::FacetGrid | Chart::InteractivePlot => {
                to_json(revenue_over_time(table)?)
            }
            Chart::Histogram => to_json(histogram(table, columns::REVENUE_CONFIRMED, HISTOGRAM_BINS)?),
            Chart::Heatmap => to_json(correlation(table, &CORRELATION_COLUMNS)?),
            Chart::BoxPlot => to_json(revenue_by_employee(table)?),
            Chart::BarPlot => to_json(tours_by_weekday(table)?),
            Chart::CallsHeatmap => to_json(calls_by_weekday(table)?),
        }
    }
}

impl FromStr for Chart {
    type Err = SalesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chart::ALL
            .into_iter()
            .find(|chart| chart.name() == s)
            .ok_or_else(|| SalesError::NotFound(format!("unknown chart {s:?}")))
    }
}

fn to_json<T: Serialize>(value: T) -> Result<serde_json::Value, SalesError> {
    serde_json::to_value(value).map_err(|e| SalesError::Chart(e.to_string()))
}

pub(crate) fn chart_error(err: impl std::fmt::Display) -> SalesError {
    SalesError::Chart(err.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub dated: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeSeries {
    pub employee_id: i64,
    pub employee_name: String,
    pub points: Vec<SeriesPoint>,
}

pub fn revenue_over_time(table: &SalesTable) -> Result<Vec<EmployeeSeries>, SalesError> {
    table.require_column(columns::DATED)?;
    table.ensure_not_empty()?;

    let mut series: BTreeMap<i64, EmployeeSeries> = BTreeMap::new();
    for record in &table.records {
        let (Some(dated), Some(value)) = (record.dated, record.number(columns::REVENUE_CONFIRMED)?)
        else {
            continue;
        };
        let employee_id = record.employee_id()?;
        let entry = match series.entry(employee_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(EmployeeSeries {
                employee_id,
                employee_name: record.employee_name()?,
                points: Vec::new(),
            }),
        };
        entry.points.push(SeriesPoint { dated, value });
    }

    let mut values: Vec<EmployeeSeries> = series.into_values().collect();
    for entry in &mut values {
        entry.points.sort_by_key(|p| p.dated);
    }
    Ok(values)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    pub column: String,
    pub bins: Vec<HistogramBin>,
}

/// Equal-width bins over the observed range. The last bin is closed.
pub fn histogram(table: &SalesTable, column: &str, bins: usize) -> Result<Histogram, SalesError> {
    let values = numeric_values(table, column)?;
    if values.is_empty() || bins == 0 {
        return Err(SalesError::NoValidRecords(format!(
            "column {column} has no numeric values"
        )));
    }

    let mut sorted: Array1<N64> = values.iter().map(|v| n64(*v)).collect();
    let mut min = sorted.quantile_mut(n64(0.0), &Linear).map_err(chart_error)?.raw();
    let mut max = sorted.quantile_mut(n64(1.0), &Linear).map_err(chart_error)?.raw();
    if min == max {
        min -= 0.5;
        max += 0.5;
    }
    let width = (max - min) / bins as f64;

    let edges: Vec<N64> = (0..=bins).map(|i| n64(min + width * i as f64)).collect();
    let grid = Grid::from(vec![Bins::new(Edges::from(edges))]);
    let observations = Array2::from_shape_vec(
        (values.len(), 1),
        values.iter().map(|v| n64(*v)).collect(),
    )
    .map_err(chart_error)?;
    let mut counts: Vec<usize> = observations.histogram(grid).counts().iter().copied().collect();

    // the grid's top edge is open, so the maximum itself lands outside
    let outside = values.len() - counts.iter().sum::<usize>();
    if let Some(last) = counts.last_mut() {
        *last += outside;
    }

    Ok(Histogram {
        column: column.to_string(),
        bins: counts
            .into_iter()
            .enumerate()
            .map(|(idx, count)| HistogramBin {
                start: min + width * idx as f64,
                end: min + width * (idx + 1) as f64,
                count,
            })
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    /// `None` where a column is constant or fewer than two complete rows exist
    pub values: Vec<Vec<Option<f64>>>,
}

/// Pearson correlation over the rows where every named column holds a number.
pub fn correlation(table: &SalesTable, names: &[&str]) -> Result<CorrelationMatrix, SalesError> {
    table.ensure_not_empty()?;
    for name in names {
        table.require_column(name)?;
    }

    let mut complete = Vec::new();
    for record in &table.records {
        let row = names
            .iter()
            .map(|name| record.number(name))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(row) = row.into_iter().collect::<Option<Vec<f64>>>() {
            complete.push(row);
        }
    }

    let observations = complete.len();
    let matrix = if observations < 2 {
        None
    } else {
        let mut flat = Vec::with_capacity(names.len() * observations);
        for idx in 0..names.len() {
            flat.extend(complete.iter().map(|row| row[idx]));
        }
        let variables =
            Array2::from_shape_vec((names.len(), observations), flat).map_err(chart_error)?;
        variables.pearson_correlation().ok()
    };

    let values = (0..names.len())
        .map(|i| {
            (0..names.len())
                .map(|j| {
                    matrix
                        .as_ref()
                        .map(|m| m[[i, j]])
                        .filter(|v| v.is_finite())
                })
                .collect()
        })
        .collect();

    Ok(CorrelationMatrix {
        columns: names.iter().map(|n| n.to_string()).collect(),
        values,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxStats {
    pub employee_name: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

pub fn revenue_by_employee(table: &SalesTable) -> Result<Vec<BoxStats>, SalesError> {
    table.ensure_not_empty()?;
    let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in &table.records {
        if let Some(value) = record.number(columns::REVENUE_CONFIRMED)? {
            groups.entry(record.employee_name()?).or_default().push(value);
        }
    }

    groups
        .into_iter()
        .map(|(employee_name, values)| {
            let count = values.len();
            let mut values: Array1<N64> = values.into_iter().map(n64).collect();
            let mut quantile = |q: f64| -> Result<f64, SalesError> {
                Ok(values.quantile_mut(n64(q), &Linear).map_err(chart_error)?.raw())
            };
            Ok(BoxStats {
                employee_name,
                count,
                min: quantile(0.0)?,
                q1: quantile(0.25)?,
                median: quantile(0.5)?,
                q3: quantile(0.75)?,
                max: quantile(1.0)?,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledValue {
    pub label: String,
    pub value: f64,
}

/// Mean tours booked per weekday of the row's date, Monday first. Weekdays
/// without rows are absent.
pub fn tours_by_weekday(table: &SalesTable) -> Result<Vec<LabelledValue>, SalesError> {
    table.require_column(columns::DATED)?;
    table.require_column(columns::TOURS_BOOKED)?;
    table.ensure_not_empty()?;

    let mut days: BTreeMap<u32, (String, f64, usize)> = BTreeMap::new();
    for record in &table.records {
        let (Some(dated), Some(tours)) = (record.dated, record.number(columns::TOURS_BOOKED)?)
        else {
            continue;
        };
        let slot = days
            .entry(dated.weekday().num_days_from_monday())
            .or_insert_with(|| (dated.format("%A").to_string(), 0.0, 0));
        slot.1 += tours;
        slot.2 += 1;
    }

    Ok(days
        .into_values()
        .map(|(label, sum, count)| LabelledValue {
            label,
            value: sum / count as f64,
        })
        .collect())
}

pub fn calls_by_weekday(table: &SalesTable) -> Result<Vec<LabelledValue>, SalesError> {
    columns::WEEKDAY_CALLS
        .iter()
        .map(|column| -> Result<LabelledValue, SalesError> {
            Ok(LabelledValue {
                label: column.to_string(),
                value: aggregate::sum(table, column, None)?,
            })
        })
        .collect()
}

fn numeric_values(table: &SalesTable, column: &str) -> Result<Vec<f64>, SalesError> {
    table.require_column(column)?;
    table.ensure_not_empty()?;
    let mut values = Vec::new();
    for record in &table.records {
        if let Some(value) = record.number(column)? {
            values.push(value);
        }
    }
    Ok(values)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::aggregate::tests::sample_table;
    use crate::models::Cell;

    pub(crate) fn weekly_table() -> SalesTable {
        // 2024-08-19 is a Monday
        sample_table(&[
            (1, "Avery Lee", "19/08/2024", 10.0, 4.0, 2.0, 100.0),
            (2, "Jules Moreno", "20/08/2024", 10.0, 6.0, 3.0, 300.0),
            (1, "Avery Lee", "26/08/2024", 10.0, 8.0, 4.0, 200.0),
            (2, "Jules Moreno", "13/08/2024", 10.0, 2.0, 1.0, 500.0),
        ])
    }

    pub(crate) fn with_calls(mut table: SalesTable) -> SalesTable {
        for column in columns::WEEKDAY_CALLS {
            table.columns.push(column.to_string());
            for record in &mut table.records {
                record.cells.insert(column.to_string(), Cell::Number(2.0));
            }
        }
        table
    }

    #[test]
    fn chart_names_round_trip() {
        for chart in Chart::ALL {
            assert_eq!(chart.name().parse::<Chart>().unwrap(), chart);
        }
        assert!(matches!(
            "pie".parse::<Chart>(),
            Err(SalesError::NotFound(_))
        ));
    }

    #[test]
    fn revenue_series_are_sorted_per_employee() {
        let series = revenue_over_time(&weekly_table()).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].employee_name, "Avery Lee");
        let jules: Vec<f64> = series[1].points.iter().map(|p| p.value).collect();
        assert_eq!(jules, vec![500.0, 300.0]);
    }

    #[test]
    fn histogram_counts_every_value() {
        let hist = histogram(&weekly_table(), "revenue_confirmed", 4).unwrap();
        assert_eq!(hist.bins.len(), 4);
        assert_eq!(hist.bins.iter().map(|b| b.count).sum::<usize>(), 4);
        assert_eq!(hist.bins[0].start, 100.0);
        assert_eq!(hist.bins[0].count, 1);
        assert_eq!(hist.bins[1].count, 1);
        assert_eq!(hist.bins[3].end, 500.0);
        assert_eq!(hist.bins[3].count, 1);
    }

    #[test]
    fn histogram_of_constant_column_has_unit_range() {
        let hist = histogram(&weekly_table(), "avg_deal_value_30_days", 2).unwrap();
        assert_eq!(hist.bins[0].start, 999.5);
        assert_eq!(hist.bins[1].end, 1000.5);
        assert_eq!(hist.bins[1].count, 4);
    }

    #[test]
    fn correlation_matrix_detects_linear_relationships() {
        let mut table = weekly_table();
        for (record, value) in table.records.iter_mut().zip([4.0, 3.0, 2.0, 5.0]) {
            record.cells.insert("lead_taken".to_string(), Cell::Number(value));
        }
        let matrix =
            correlation(&table, &["tours_booked", "applications", "lead_taken"]).unwrap();
        assert_eq!(matrix.columns.len(), 3);
        assert!((matrix.values[0][0].unwrap() - 1.0).abs() < 1e-12);
        assert!((matrix.values[0][1].unwrap() - 1.0).abs() < 1e-12);
        assert!(matrix.values[0][2].unwrap() < 0.0);
    }

    #[test]
    fn constant_columns_have_no_correlation() {
        let matrix = correlation(&weekly_table(), &["tours_booked", "lead_taken"]).unwrap();
        assert_eq!(matrix.values[0][1], None);
        assert_eq!(matrix.values[1][1], None);
    }

    #[test]
    fn correlation_skips_incomplete_rows() {
        let mut table = weekly_table();
        table.records[0]
            .cells
            .insert("applications".to_string(), Cell::Empty);
        table.records[1]
            .cells
            .insert("applications".to_string(), Cell::Empty);
        table.records[2]
            .cells
            .insert("applications".to_string(), Cell::Empty);
        let matrix = correlation(&table, &["tours_booked", "applications"]).unwrap();
        assert!(matrix.values.iter().flatten().all(Option::is_none));
    }

    #[test]
    fn box_stats_interpolate_quartiles() {
        let stats = revenue_by_employee(&weekly_table()).unwrap();
        let avery = &stats[0];
        assert_eq!(avery.employee_name, "Avery Lee");
        assert_eq!(avery.count, 2);
        assert_eq!(avery.min, 100.0);
        assert_eq!(avery.q1, 125.0);
        assert_eq!(avery.median, 150.0);
        assert_eq!(avery.q3, 175.0);
        assert_eq!(avery.max, 200.0);
    }

    #[test]
    fn tours_are_averaged_by_weekday() {
        let days = tours_by_weekday(&weekly_table()).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].label, "Monday");
        assert_eq!(days[0].value, 6.0);
        assert_eq!(days[1].label, "Tuesday");
        assert_eq!(days[1].value, 4.0);
    }

    #[test]
    fn calls_need_every_weekday_column() {
        assert!(matches!(
            calls_by_weekday(&weekly_table()),
            Err(SalesError::MissingField(_))
        ));

        let calls = calls_by_weekday(&with_calls(weekly_table())).unwrap();
        assert_eq!(calls.len(), 7);
        assert_eq!(calls[3].label, "thur_call");
        assert!(calls.iter().all(|c| c.value == 8.0));
    }

    #[test]
    fn chart_data_matches_the_plotted_numbers() {
        let table = with_calls(weekly_table());
        let data = Chart::BarPlot.data(&table).unwrap();
        assert_eq!(data[0]["label"], "Monday");
        let data = Chart::FacetGrid.data(&table).unwrap();
        assert_eq!(data.as_array().unwrap().len(), 2);
        let data = Chart::Histogram.data(&table).unwrap();
        assert_eq!(data["bins"].as_array().unwrap().len(), HISTOGRAM_BINS);
    }
}
