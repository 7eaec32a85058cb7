use std::fmt::Write;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::{columns, Period, SalesRecord, SalesTable, TeamSummary, TrendSeries};

pub const REP_FIELDS: [&str; 13] = [
    columns::EMPLOYEE_ID,
    columns::EMPLOYEE_NAME,
    columns::DATED,
    columns::LEAD_TAKEN,
    columns::TOURS_BOOKED,
    columns::APPLICATIONS,
    columns::REVENUE_CONFIRMED,
    columns::REVENUE_PENDING,
    columns::AVG_DEAL_VALUE_30_DAYS,
    columns::TOURS_PER_LEAD,
    columns::APPS_PER_TOUR,
    columns::APPS_PER_LEAD,
    columns::REVENUE_RUNRATE,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptLimits {
    pub max_rows: usize,
    pub max_field_chars: usize,
    pub max_context_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_rows: 5,
            max_field_chars: 64,
            max_context_chars: 2000,
        }
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `...`
/// when there is room for it.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars < 3 {
        return text.chars().take(max_chars).collect();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn bounded_value(record: &SalesRecord, field: &str, limits: &PromptLimits) -> Value {
    match record.cells.get(field).map(|cell| cell.to_json()) {
        Some(Value::String(text)) => Value::String(truncate(&text, limits.max_field_chars)),
        Some(other) => other,
        None => Value::Null,
    }
}

fn record_json(record: &SalesRecord, fields: Option<&[&str]>, limits: &PromptLimits) -> Value {
    let mut object = Map::new();
    match fields {
        Some(fields) => {
            for field in fields {
                object.insert(field.to_string(), bounded_value(record, field, limits));
            }
        }
        None => {
            for field in record.cells.keys() {
                object.insert(field.clone(), bounded_value(record, field, limits));
            }
        }
    }
    Value::Object(object)
}

fn sample_json<'a, I>(records: I, fields: Option<&[&str]>, limits: &PromptLimits) -> String
where
    I: IntoIterator<Item = &'a SalesRecord>,
{
    let rows: Vec<Value> = records
        .into_iter()
        .take(limits.max_rows)
        .map(|record| record_json(record, fields, limits))
        .collect();
    Value::Array(rows).to_string()
}

fn push_context(prompt: &mut String, context: Option<&str>, limits: &PromptLimits) {
    if let Some(context) = context.map(str::trim).filter(|c| !c.is_empty()) {
        let _ = write!(
            prompt,
            "\nAdditional context: {}",
            truncate(context, limits.max_context_chars)
        );
    }
}

/// Feedback request for one representative, from their most recent rows.
pub fn rep_prompt(
    rep_id: i64,
    records: &[&SalesRecord],
    limits: &PromptLimits,
    context: Option<&str>,
) -> String {
    let start = records.len().saturating_sub(limits.max_rows);
    let data = sample_json(records[start..].iter().copied(), Some(&REP_FIELDS[..]), limits);
    let mut prompt = format!(
        "Analyze the following sales data for representative {rep_id}: {data}.\n\
         Provide detailed feedback on their performance."
    );
    push_context(&mut prompt, context, limits);
    prompt
}

pub fn team_prompt(summary: &TeamSummary, table: &SalesTable, limits: &PromptLimits) -> String {
    let data = sample_json(&table.records, None, limits);
    format!(
        "{}\nAnalyze the following limited sales data for the team: {data}.\n\
         Provide feedback on the team's performance.",
        summary.statement()
    )
}

pub fn team_insights_prompt(table: &SalesTable, user_summary: &str, limits: &PromptLimits) -> String {
    let data = sample_json(&table.records, None, limits);
    let mut prompt = format!(
        "Analyze the overall sales performance of the team using the following data: {data}.\n\
         Provide insights and recommendations."
    );
    push_context(&mut prompt, Some(user_summary), limits);
    prompt
}

pub fn trend_prompt(period: Period, series: &TrendSeries) -> String {
    let trends = serde_json::to_string(&series.to_labelled()).unwrap_or_default();
    format!(
        "Analyze the sales trends over the {period} period for {}: {trends}.\n\
         Provide a forecast for future performance.",
        series.column
    )
}
