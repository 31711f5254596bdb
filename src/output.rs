//! Table and JSON rendering of aggregation results

use crate::aggregation::{AggregatedRow, AggregationResult, CategoryRollup, DailyBucket};
use crate::error::Result;
use crate::types::{GrandTotal, PromptUsage};
use prettytable::{Table, row};
use serde::Serialize;

/// Serializable view of one aggregation pass
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    /// Included rows first, excluded after
    pub rows: &'a [AggregatedRow],
    /// Fold of the included rows
    pub grand_total: &'a GrandTotal,
}

/// Render rows as a text table; excluded rows are marked in the last column
pub fn rows_table(result: &AggregationResult) -> Table {
    let mut table = Table::new();
    table.add_row(row![
        b => "Name", "Parent", "Tenant", "Category", "Runs", "Hours Saved", "Dollars Saved", ""
    ]);
    for row in &result.rows {
        table.add_row(row![
            row.name,
            row.parent_name,
            row.tenant_name,
            row.category_name,
            row.total_count,
            format!("{:.2}", row.total_hours),
            format!("${:.2}", row.total_dollars),
            if row.is_excluded { "excluded" } else { "" }
        ]);
    }
    table.add_row(row![
        b => "Total", "", "", "",
        result.grand_total.primary_metric,
        format!("{:.2}", result.grand_total.hours),
        format!("${:.2}", result.grand_total.dollars),
        ""
    ]);
    table
}

/// Render per-category rollups as a text table
pub fn rollup_table(rollups: &[CategoryRollup], with_license_cost: bool) -> Table {
    let mut table = Table::new();
    if with_license_cost {
        table.add_row(row![b => "Category", "Runs", "Hours", "Dollars", "License Cost", "%"]);
    } else {
        table.add_row(row![b => "Category", "Runs", "Hours", "Dollars", "%"]);
    }
    for rollup in rollups {
        if with_license_cost {
            table.add_row(row![
                rollup.category_name,
                rollup.runs,
                format!("{:.2}", rollup.hours),
                format!("${:.2}", rollup.dollars),
                format!("${:.2}", rollup.license_cost),
                format!("{:.1}%", rollup.percentage)
            ]);
        } else {
            table.add_row(row![
                rollup.category_name,
                rollup.runs,
                format!("{:.2}", rollup.hours),
                format!("${:.2}", rollup.dollars),
                format!("{:.1}%", rollup.percentage)
            ]);
        }
    }
    table
}

/// Render per-day savings buckets as a text table
pub fn daily_table(buckets: &[DailyBucket]) -> Table {
    let mut table = Table::new();
    table.add_row(row![b => "Date", "Runs", "Hours Saved", "Dollars Saved"]);
    for bucket in buckets {
        table.add_row(row![
            bucket.date,
            bucket.primary_metric,
            format!("{:.2}", bucket.hours),
            format!("${:.2}", bucket.dollars)
        ]);
    }
    table
}

/// Render prompt-assistant usage with its grand total as a text table
pub fn prompt_table(usage: &PromptUsage, total: &GrandTotal) -> Table {
    let mut table = Table::new();
    table.add_row(row![b => "Date", "Prompts"]);
    for day in &usage.per_day {
        table.add_row(row![day.date, day.runs]);
    }
    table.add_row(row![
        b => "Total",
        format!(
            "{} ({:.2} hours, ${:.2})",
            total.primary_metric, total.hours, total.dollars
        )
    ]);
    table
}

/// Serialize one aggregation pass as pretty JSON
pub fn report_json(result: &AggregationResult) -> Result<String> {
    let report = Report { rows: &result.rows, grand_total: &result.grand_total };
    Ok(serde_json::to_string_pretty(&report)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregationResult {
        AggregationResult {
            rows: vec![AggregatedRow {
                id: "pb-1".to_string(),
                name: "Phishing Triage".to_string(),
                parent_name: "Classic".to_string(),
                tenant_name: "Acme".to_string(),
                category: "detection-analysis".to_string(),
                category_name: "Detection/Analysis".to_string(),
                total_count: 12,
                total_hours: 1.0,
                total_dollars: 50.0,
                is_excluded: false,
                has_custom_config: false,
            }],
            grand_total: GrandTotal { primary_metric: 12, hours: 1.0, dollars: 50.0 },
            included_len: 1,
        }
    }

    #[test]
    fn test_rows_table_renders_all_rows_plus_header_and_total() {
        let table = rows_table(&sample());
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_daily_and_prompt_tables() {
        let buckets = vec![DailyBucket {
            date: "2024-03-01".to_string(),
            primary_metric: 12,
            hours: 1.0,
            dollars: 50.0,
        }];
        assert_eq!(daily_table(&buckets).len(), 2);

        let usage = PromptUsage {
            total: 42,
            per_day: vec![crate::types::PromptDay { date: "2024-03-01".to_string(), runs: 42 }],
        };
        let total = GrandTotal { primary_metric: 42, hours: 1.4, dollars: 70.0 };
        // Header, one day row, total row
        assert_eq!(prompt_table(&usage, &total).len(), 3);
    }

    #[test]
    fn test_report_json_round_trips() {
        let json = report_json(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["rows"][0]["name"], "Phishing Triage");
        assert_eq!(value["grand_total"]["primary_metric"], 12);
    }
}
