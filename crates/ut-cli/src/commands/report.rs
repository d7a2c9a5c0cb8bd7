//! Report command for a single day of usage.
//!
//! This module implements `ut report [--date YYYY-MM-DD] [--json]`.

use std::fmt::Write;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use ut_core::CategoryTable;
use ut_db::Database;

use crate::api::{AppResponse, CategoryResponse};
use crate::summary::{DayReport, load_day_report, productivity, secs};

/// Applications listed in a report.
const REPORT_APPS: usize = 10;

const LABEL_WIDTH: usize = 20;

// ========== Duration Formatting ==========

/// Formats milliseconds as duration string.
/// Returns "Xh Ym" if >= 1 hour, "Xm" if < 1 hour.
/// Negative durations are treated as 0m.
pub fn format_duration(ms: i64) -> String {
    if ms < 0 {
        return "0m".to_string();
    }
    let total_minutes = ms / 60_000;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

// ========== Progress Bar ==========

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: i64, max: i64) -> String {
    if max <= 0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Cuts a label to the column width, marking the cut with an ellipsis.
fn fit_label(label: &str) -> String {
    if label.chars().count() <= LABEL_WIDTH {
        return label.to_string();
    }
    let mut fitted: String = label.chars().take(LABEL_WIDTH - 1).collect();
    fitted.push('…');
    fitted
}

fn bar_row(label: &str, ms: i64, max: i64) -> String {
    format!(
        "{:<width$}{:>9}  {}",
        fit_label(label),
        format_duration(ms),
        progress_bar(ms, max),
        width = LABEL_WIDTH
    )
}

// ========== Report Rendering ==========

/// Formats a day report for the terminal.
pub fn format_report(report: &DayReport) -> String {
    let mut output = String::new();

    let day = report.date.format("%A, %B %-d, %Y");
    writeln!(output, "USAGE REPORT: {day}").unwrap();

    if report.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "No usage recorded on this day.").unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Hint: Run 'ut run' to start tracking.").unwrap();
        return output;
    }

    let totals = &report.totals;
    writeln!(output).unwrap();
    writeln!(output, "Tracked:  {}", format_duration(totals.total_ms)).unwrap();
    writeln!(
        output,
        "Active:   {} ({:.1}%)",
        format_duration(totals.active_ms),
        productivity(totals)
    )
    .unwrap();
    writeln!(output, "Idle:     {}", format_duration(totals.idle_ms)).unwrap();
    writeln!(output, "Apps:     {}", report.apps_used).unwrap();

    if !report.apps.is_empty() {
        let max = report.apps.iter().map(|app| app.duration_ms).max().unwrap_or(0);
        writeln!(output).unwrap();
        writeln!(output, "TOP APPS").unwrap();
        writeln!(output, "────────").unwrap();
        for app in &report.apps {
            let row = bar_row(&app.app_name, app.duration_ms, max);
            writeln!(output, "{row}  {}", app.category_name).unwrap();
        }
    }

    if !report.categories.is_empty() {
        let max = report
            .categories
            .iter()
            .map(|category| category.duration_ms)
            .max()
            .unwrap_or(0);
        writeln!(output).unwrap();
        writeln!(output, "CATEGORIES").unwrap();
        writeln!(output, "──────────").unwrap();
        for category in &report.categories {
            writeln!(output, "{}", bar_row(&category.name, category.duration_ms, max)).unwrap();
        }
    }

    let max_hour = report.hourly.iter().copied().max().unwrap_or(0);
    if max_hour > 0 {
        writeln!(output).unwrap();
        writeln!(output, "BY HOUR").unwrap();
        writeln!(output, "───────").unwrap();
        for (hour, ms) in report.hourly.iter().enumerate().filter(|(_, ms)| **ms > 0) {
            writeln!(output, "{}", bar_row(&format!("{hour:02}:00"), *ms, max_hour)).unwrap();
        }
    }

    output
}

// ========== JSON Output ==========

#[derive(Debug, Serialize)]
struct JsonReport {
    date: NaiveDate,
    total_secs: i64,
    active_secs: i64,
    idle_secs: i64,
    productivity: f64,
    apps_used: i64,
    apps: Vec<AppResponse>,
    categories: Vec<CategoryResponse>,
    /// Active seconds per local hour, 24 entries.
    hourly: Vec<i64>,
}

/// Formats a day report as JSON.
pub fn format_report_json(report: &DayReport) -> Result<String> {
    let json = JsonReport {
        date: report.date,
        total_secs: report.totals.total_secs(),
        active_secs: report.totals.active_secs(),
        idle_secs: report.totals.idle_secs(),
        productivity: productivity(&report.totals),
        apps_used: report.apps_used,
        apps: report.apps.iter().cloned().map(AppResponse::from).collect(),
        categories: report
            .categories
            .iter()
            .cloned()
            .map(CategoryResponse::from)
            .collect(),
        hourly: report.hourly.iter().map(|ms| secs(*ms)).collect(),
    };
    Ok(serde_json::to_string_pretty(&json)?)
}

// ========== Public Interface ==========

/// Runs the report command.
pub fn run(db: &Database, categories: &CategoryTable, date: NaiveDate, json: bool) -> Result<()> {
    let report = load_day_report(db, categories, date, REPORT_APPS)?;

    if json {
        println!("{}", format_report_json(&report)?);
    } else {
        print!("{}", format_report(&report));
    }

    Ok(())
}
