use chrono::Datelike;

use crate::error::SalesError;
use crate::models::{BucketKey, DerivedFeatures, Period, SalesTable};

const ROLLING_WINDOW: usize = 3;

/// The first row has no lag and the first two have no rolling average. A
/// window containing a blank cell also yields none.
pub fn derive_features(table: &SalesTable, column: &str) -> Result<Vec<DerivedFeatures>, SalesError> {
    table.require_column(column)?;

    let values = table
        .records
        .iter()
        .map(|record| record.number(column))
        .collect::<Result<Vec<_>, _>>()?;

    let features = table
        .records
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let lag = if idx == 0 { None } else { values[idx - 1] };
            let rolling_avg = if idx + 1 < ROLLING_WINDOW {
                None
            } else {
                values[idx + 1 - ROLLING_WINDOW..=idx]
                    .iter()
                    .copied()
                    .collect::<Option<Vec<f64>>>()
                    .map(|window| window.iter().sum::<f64>() / ROLLING_WINDOW as f64)
            };
            DerivedFeatures {
                row: record.row,
                dated: record.dated,
                value: values[idx],
                lag,
                rolling_avg,
                day_of_week: record.dated.map(|d| d.format("%A").to_string()),
                month: record.dated.map(|d| d.month()),
                quarter: record.dated.map(|d| BucketKey::for_date(d, Period::Quarterly)),
            }
        })
        .collect();

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::sample_table;
    use crate::models::Cell;

    #[test]
    fn lag_and_rolling_average_have_edge_gaps() {
        let table = sample_table(&[
            (1, "Avery Lee", "01/01/2024", 1.0, 1.0, 1.0, 10.0),
            (1, "Avery Lee", "02/01/2024", 1.0, 1.0, 1.0, 20.0),
            (1, "Avery Lee", "03/01/2024", 1.0, 1.0, 1.0, 30.0),
            (1, "Avery Lee", "04/01/2024", 1.0, 1.0, 1.0, 40.0),
        ]);
        let features = derive_features(&table, "revenue_confirmed").unwrap();

        let lags: Vec<Option<f64>> = features.iter().map(|f| f.lag).collect();
        assert_eq!(lags, vec![None, Some(10.0), Some(20.0), Some(30.0)]);

        let rolling: Vec<Option<f64>> = features.iter().map(|f| f.rolling_avg).collect();
        assert_eq!(rolling, vec![None, None, Some(20.0), Some(30.0)]);
    }

    #[test]
    fn blank_value_breaks_rolling_window() {
        let mut table = sample_table(&[
            (1, "Avery Lee", "01/01/2024", 1.0, 1.0, 1.0, 10.0),
            (1, "Avery Lee", "02/01/2024", 1.0, 1.0, 1.0, 20.0),
            (1, "Avery Lee", "03/01/2024", 1.0, 1.0, 1.0, 30.0),
        ]);
        table.records[1]
            .cells
            .insert("revenue_confirmed".to_string(), Cell::Empty);
        let features = derive_features(&table, "revenue_confirmed").unwrap();
        assert_eq!(features[2].rolling_avg, None);
        assert_eq!(features[2].lag, None);
    }

    #[test]
    fn calendar_features_follow_the_date() {
        let table = sample_table(&[(1, "Avery Lee", "19/08/2024", 1.0, 1.0, 1.0, 10.0)]);
        let features = derive_features(&table, "revenue_confirmed").unwrap();
        assert_eq!(features[0].day_of_week.as_deref(), Some("Monday"));

        let sunday = sample_table(&[(1, "Avery Lee", "25/08/2024", 1.0, 1.0, 1.0, 10.0)]);
        let features = derive_features(&sunday, "revenue_confirmed").unwrap();
        assert_eq!(features[0].day_of_week.as_deref(), Some("Sunday"));
        assert_eq!(features[0].month, Some(8));
        assert_eq!(features[0].quarter.map(|q| q.to_string()).as_deref(), Some("2024-Q3"));
    }

    #[test]
    fn unknown_column_is_missing_field() {
        let table = sample_table(&[(1, "Avery Lee", "19/08/2024", 1.0, 1.0, 1.0, 10.0)]);
        assert!(matches!(
            derive_features(&table, "tours"),
            Err(SalesError::MissingField(_))
        ));
    }
}
