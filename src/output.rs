// output formatting - pretty tables or raw json

use serde_json::Value;

use crate::core::{Outcome, QueryResult, Skip};

pub struct Output;

impl Output {
    pub fn outcome(outcome: &Outcome, json: bool) {
        match (outcome, json) {
            (_, true) => Self::raw(outcome),
            (Outcome::Completed(result), false) => Self::pretty(result),
            (Outcome::Skipped(skip), false) => Self::skipped(skip),
        }
    }

    // nice table format for humans
    pub fn pretty(result: &QueryResult) {
        if result.rows_affected > 0 {
            println!("rows affected: {}\n", result.rows_affected);
        }

        if result.rows.is_empty() {
            println!("no results");
            return;
        }

        let cells: Vec<Vec<String>> = result
            .rows
            .iter()
            .map(|row| row_cells(&result.columns, row))
            .collect();

        // figure out column widths
        let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
        for row in &cells {
            for (i, val) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(val.chars().count());
                }
            }
        }

        // cap at 40 so things don't get crazy
        for w in &mut widths {
            *w = (*w).min(40);
        }

        let header: Vec<String> = result
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
            .collect();
        println!("{}", header.join(" | "));

        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        println!("{}", sep.join("-+-"));

        for row in &cells {
            let formatted: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let width = widths.get(i).copied().unwrap_or(0);
                    let s = if s.chars().count() > 40 {
                        format!("{}...", s.chars().take(37).collect::<String>())
                    } else {
                        s.clone()
                    };
                    format!("{:width$}", s, width = width)
                })
                .collect();
            println!("{}", formatted.join(" | "));
        }

        println!("\nrows: {}", result.row_count);
    }

    pub fn skipped(skip: &Skip) {
        match skip {
            Skip::WouldEmptyTable { table } => {
                println!("skipped: delete would empty `{table}`, nothing changed")
            }
            Skip::Denied { denied } => println!("skipped: {denied}"),
            Skip::Swallowed { error } => println!("skipped: {error}"),
        }
    }

    // raw json for scripts
    pub fn raw(outcome: &Outcome) {
        println!("{}", serde_json::to_string(outcome).unwrap_or_default());
    }
}

// rows come as arrays or objects depending on the row factory
fn row_cells(columns: &[String], row: &Value) -> Vec<String> {
    match row {
        Value::Array(values) => values.iter().map(format_value).collect(),
        Value::Object(map) => columns
            .iter()
            .map(|c| map.get(c).map(format_value).unwrap_or_default())
            .collect(),
        other => vec![format_value(other)],
    }
}

fn format_value(val: &Value) -> String {
    match val {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => val.to_string(),
    }
}
