// 📊 Summary Generator
// Stored swipes LEFT JOIN roster -> report rows, plus CSV/XLSX artifacts
//
// Join key is the identity id. A swipe whose identity is not on the roster
// still produces a row, with empty name/email. Timestamps stay UTC in storage
// and are converted to the presentation zone only here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::event::SwipeEvent;
use crate::roster::Roster;

pub const SUMMARY_HEADER: [&str; 6] = [
    "Identity ID",
    "Badge ID",
    "Location",
    "Name",
    "Email",
    "Swipe Time",
];

/// Presentation format of a swipe time in reports
pub const SWIPE_TIME_FORMAT: &str = "%Y-%m-%d %I:%M:%S %p";

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Identity ID")]
    pub identity_id: String,

    #[serde(rename = "Badge ID")]
    pub badge_id: String,

    #[serde(rename = "Location")]
    pub location: Option<String>,

    #[serde(rename = "Name")]
    pub name: Option<String>,

    #[serde(rename = "Email")]
    pub email: Option<String>,

    #[serde(skip)]
    pub captured_at: DateTime<Utc>,

    /// `captured_at` rendered in the presentation zone
    #[serde(rename = "Swipe Time")]
    pub swipe_time: String,
}

impl SummaryRow {
    fn cells(&self) -> [&str; 6] {
        [
            self.identity_id.as_str(),
            self.badge_id.as_str(),
            self.location.as_deref().unwrap_or(""),
            self.name.as_deref().unwrap_or(""),
            self.email.as_deref().unwrap_or(""),
            self.swipe_time.as_str(),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct SummaryReport {
    pub since: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<SummaryRow>,
    pub artifacts: Vec<PathBuf>,
}

impl SummaryReport {
    pub fn matched_count(&self) -> usize {
        self.rows.iter().filter(|r| r.name.is_some()).count()
    }
}

// ============================================================================
// GENERATOR
// ============================================================================

/// Pure transform: events captured after `since`, joined with the roster,
/// oldest first. Ties keep their input order.
pub fn build_summary(
    events: &[SwipeEvent],
    roster: &Roster,
    since: DateTime<Utc>,
    timezone: Tz,
    generated_at: DateTime<Utc>,
) -> SummaryReport {
    let mut rows: Vec<SummaryRow> = events
        .iter()
        .filter(|e| e.captured_at > since)
        .map(|e| {
            let entry = roster.lookup(&e.identity_id);
            SummaryRow {
                identity_id: e.identity_id.clone(),
                badge_id: e.badge_id.clone(),
                location: e.location.clone(),
                name: entry.map(|r| r.name.clone()),
                email: entry.map(|r| r.email.clone()),
                captured_at: e.captured_at,
                swipe_time: e
                    .captured_at
                    .with_timezone(&timezone)
                    .format(SWIPE_TIME_FORMAT)
                    .to_string(),
            }
        })
        .collect();

    // sort_by_key is stable
    rows.sort_by_key(|r| r.captured_at);

    SummaryReport {
        since,
        generated_at,
        rows,
        artifacts: Vec::new(),
    }
}

/// Write `<stem>.csv` and `<stem>.xlsx` under `dir` and record them on the
/// report. Header-only files are written for an empty report.
pub fn write_artifacts(report: &mut SummaryReport, dir: &Path, stem: &str) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let csv_path = dir.join(format!("{}.csv", stem));
    fs::write(&csv_path, render_summary_csv(&report.rows)?)
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;

    let xlsx_path = dir.join(format!("{}.xlsx", stem));
    write_xlsx(&report.rows, &xlsx_path)?;

    let paths = vec![xlsx_path, csv_path];
    report.artifacts = paths.clone();
    Ok(paths)
}

pub fn render_summary_csv(rows: &[SummaryRow]) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(SUMMARY_HEADER)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    Ok(wtr.into_inner()?)
}

fn write_xlsx(rows: &[SummaryRow], path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (col, title) in SUMMARY_HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &bold)?;
    }

    for (i, row) in rows.iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.cells().iter().enumerate() {
            // Unmatched roster fields stay blank rather than ""
            if !cell.is_empty() {
                worksheet.write_string(r, col as u16, *cell)?;
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
