use std::fmt::Write as _;

use chrono::SecondsFormat;
use client_core::SyncError;
use shared::domain::PurifierRecord;

const HEADERS: [&str; 5] = ["ID", "NAME", "LOCATION", "STATUS", "LAST UPDATED"];

fn status_label(active: bool) -> &'static str {
    if active {
        "active"
    } else {
        "inactive"
    }
}

fn row(record: &PurifierRecord) -> [String; 5] {
    [
        record.id.to_string(),
        record.name.clone(),
        record.location.to_string(),
        status_label(record.status).to_string(),
        record
            .last_updated
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    ]
}

pub fn render_table(records: &[PurifierRecord]) -> String {
    if records.is_empty() {
        return "no purifiers match\n".to_string();
    }

    let rows: Vec<[String; 5]> = records.iter().map(row).collect();
    let mut widths = HEADERS.map(|h| h.chars().count());
    for cells in &rows {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let headers = HEADERS.map(str::to_string);
    for cells in std::iter::once(&headers).chain(&rows) {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

pub fn render_record(record: &PurifierRecord) -> String {
    format!(
        "{} {} ({}) at {}",
        record.id,
        record.name,
        status_label(record.status),
        record.location
    )
}

pub fn render_sync_warning(error: &SyncError) -> String {
    format!("warning: change kept locally, record service not updated: {error}")
}

#[cfg(test)]
#[path = "tests/output_tests.rs"]
mod tests;
