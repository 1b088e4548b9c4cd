//! Output formatters for rows and headers

use anyhow::Result;
use colored::*;
use std::collections::BTreeMap;
use std::path::Path;
use tabread_core::{Anomaly, Row};

/// Print rows as numbered, `|`-separated lines
pub fn print_rows_human(file_path: &Path, rows: &BTreeMap<usize, Row>) {
    println!("{}", format!("Reading: {}", file_path.display()).bold());
    println!();

    if rows.is_empty() {
        println!("{}", "No rows found".yellow());
        return;
    }

    let separator = " | ".bright_black().to_string();
    let width = rows
        .keys()
        .next_back()
        .map_or(1, |last| last.to_string().len());
    for (number, row) in rows {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| {
                if cell.is_empty() {
                    "∅".bright_black().to_string()
                } else {
                    cell.replace('\n', "\\n")
                }
            })
            .collect();
        println!(
            "{} {}",
            format!("{:>width$}", number, width = width).cyan(),
            cells.join(separator.as_str())
        );
    }

    println!();
    println!("{} {}", "Rows:".bold(), rows.len());
}

pub fn print_rows_json(file_path: &Path, rows: &BTreeMap<usize, Row>) -> Result<()> {
    let output = serde_json::json!({
        "file": file_path.display().to_string(),
        "rows": rows
            .iter()
            .map(|(number, cells)| serde_json::json!({ "row": number, "cells": cells }))
            .collect::<Vec<_>>(),
        "total": rows.len(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_headers_human(file_path: &Path, headers: &BTreeMap<usize, String>) {
    println!("{}", format!("Headers: {}", file_path.display()).bold());
    for (column, name) in headers {
        println!("  {} {}", format!("{:>3}", column).cyan(), name);
    }
}

pub fn print_headers_json(file_path: &Path, headers: &BTreeMap<usize, String>) -> Result<()> {
    let output = serde_json::json!({
        "file": file_path.display().to_string(),
        "headers": headers,
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Report absorbed cell problems on stderr
pub fn print_anomalies(anomalies: &[Anomaly]) {
    if anomalies.is_empty() {
        return;
    }
    eprintln!();
    eprintln!("{}", "Cell warnings:".yellow().bold().underline());
    for anomaly in anomalies {
        eprintln!(
            "  {} row {}, column {}: {}",
            "WARN".yellow().bold(),
            anomaly.row,
            anomaly.column + 1,
            anomaly.kind
        );
    }
}
