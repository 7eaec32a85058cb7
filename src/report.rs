use std::fmt::Write;

use crate::models::{RepTotals, TeamSummary, TrendSeries};

pub fn build_report(
    source: &str,
    rows: usize,
    summary: &TeamSummary,
    reps: &[RepTotals],
    trend: &TrendSeries,
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Sales Performance Report");
    let _ = writeln!(output, "Generated from {} ({} rows)", source, rows);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Summary");

    for line in summary.statement().lines() {
        let _ = writeln!(output, "- {}", line.trim());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Representatives");

    if reps.is_empty() {
        let _ = writeln!(output, "No representatives in this data set.");
    } else {
        for rep in reps.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} (#{}) ${:.2} confirmed from {:.0} leads, {:.0} tours, {:.0} applications",
                rep.employee_name,
                rep.employee_id,
                rep.revenue_confirmed,
                rep.leads,
                rep.tours_booked,
                rep.applications
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## {} Trend ({})", title_case(trend.period.as_str()), trend.column);

    if trend.buckets.is_empty() {
        let _ = writeln!(output, "No dated rows recorded.");
    } else {
        for (bucket, value) in trend.buckets.iter() {
            let _ = writeln!(output, "- {}: {:.2}", bucket, value);
        }
    }

    output
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::sample_table;
    use crate::aggregate::{rep_totals, resample, team_summary};
    use crate::models::{columns, Period};

    #[test]
    fn report_lists_reps_by_revenue_and_trend_buckets() {
        let table = sample_table(&[
            (1, "Ada", "05/01/2024", 10.0, 4.0, 2.0, 100.0),
            (2, "Grace", "20/02/2024", 12.0, 6.0, 3.0, 300.0),
            (1, "Ada", "07/02/2024", 8.0, 2.0, 1.0, 50.0),
        ]);
        let summary = team_summary(&table).unwrap();
        let reps = rep_totals(&table).unwrap();
        let trend = resample(&table, Period::Monthly, columns::REVENUE_CONFIRMED).unwrap();

        let report = build_report("sales.csv", table.len(), &summary, &reps, &trend);

        assert!(report.starts_with("# Sales Performance Report"));
        assert!(report.contains("Generated from sales.csv (3 rows)"));
        assert!(report.contains("- Team has generated 30 leads"));
        let grace = report.find("- Grace (#2) $300.00").unwrap();
        let ada = report.find("- Ada (#1) $150.00").unwrap();
        assert!(grace < ada);
        assert!(report.contains("## Monthly Trend (revenue_confirmed)"));
        assert!(report.contains("- 2024-01: 100.00"));
        assert!(report.contains("- 2024-02: 350.00"));
    }

    #[test]
    fn empty_sections_say_so() {
        let table = sample_table(&[(1, "Ada", "05/01/2024", 1.0, 1.0, 1.0, 10.0)]);
        let summary = team_summary(&table).unwrap();
        let trend = TrendSeries {
            period: Period::Quarterly,
            column: columns::REVENUE_CONFIRMED.to_string(),
            buckets: Default::default(),
        };

        let report = build_report("sales.csv", 1, &summary, &[], &trend);

        assert!(report.contains("No representatives in this data set."));
        assert!(report.contains("## Quarterly Trend"));
        assert!(report.contains("No dated rows recorded."));
    }
}
