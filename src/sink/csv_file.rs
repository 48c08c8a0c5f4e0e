// 📄 CSV Attendance File - append-only batch on the capture station

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{render_csv, AttendanceSink, SinkArtifact};
use crate::event::{SwipeEvent, ATTENDANCE_HEADER};

enum HeaderState {
    Present,
    Empty,
    Missing,
}

pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Open (or create) the attendance file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let sink = CsvSink { path: path.into() };
        sink.ensure_file()?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attendance.csv".to_string())
    }

    /// Repair the file before writing: recreate it when missing or empty,
    /// put the header back when the first record is not the header.
    fn ensure_file(&self) -> Result<()> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "attendance file missing, recreating");
            return self.write_header_only();
        }
        match self.header_state()? {
            HeaderState::Present => Ok(()),
            HeaderState::Empty => {
                warn!(path = %self.path.display(), "attendance file empty, writing header");
                self.write_header_only()
            }
            HeaderState::Missing => {
                warn!(path = %self.path.display(), "attendance file lost its header, repairing");
                self.prepend_header()
            }
        }
    }

    fn header_state(&self) -> Result<HeaderState> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut first = csv::StringRecord::new();
        if !rdr.read_record(&mut first)? {
            return Ok(HeaderState::Empty);
        }
        if first.iter().eq(ATTENDANCE_HEADER.iter().copied()) {
            Ok(HeaderState::Present)
        } else {
            Ok(HeaderState::Missing)
        }
    }

    /// Rewrite as header + existing rows. A torn header line (a prefix of
    /// the real one) is dropped rather than kept as a bogus row.
    fn prepend_header(&self) -> Result<()> {
        let existing = fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let header = render_csv(&[])?;

        let first_line_end = existing
            .iter()
            .position(|&b| b == b'\n')
            .map_or(existing.len(), |i| i + 1);
        let mut first_line = &existing[..first_line_end];
        while let [rest @ .., b'\r' | b'\n'] = first_line {
            first_line = rest;
        }
        let rows = if header.starts_with(first_line) {
            &existing[first_line_end..]
        } else {
            &existing[..]
        };

        let tmp = self.path.with_extension("csv.tmp");
        let mut file = File::create(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        file.write_all(&header)?;
        file.write_all(rows)?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    fn write_header_only(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let header = render_csv(&[])?;
        let mut file = File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        file.write_all(&header)?;
        file.sync_all()?;
        Ok(())
    }
}

impl AttendanceSink for CsvSink {
    fn append(&mut self, event: &SwipeEvent) -> Result<()> {
        self.ensure_file()?;

        let file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        wtr.serialize(event).context("Failed to write swipe row")?;
        wtr.flush()?;

        let file = wtr
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush swipe row: {}", e.error()))?;
        file.sync_all()?;

        debug!(identity = %event.identity_id, "swipe appended");
        Ok(())
    }

    fn events(&self) -> Result<Vec<SwipeEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut rdr = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let headers = rdr.headers()?.clone();
        if headers.iter().ne(ATTENDANCE_HEADER.iter().copied()) {
            anyhow::bail!(
                "Unexpected header in {}: {:?}",
                self.path.display(),
                headers
            );
        }

        let mut events = Vec::new();
        for result in rdr.deserialize() {
            let event: SwipeEvent = result.context("Failed to deserialize swipe row")?;
            events.push(event);
        }
        Ok(events)
    }

    fn snapshot(&self) -> Result<SinkArtifact> {
        SinkArtifact::from_events(&self.file_name(), self.events()?)
    }

    fn reset(&mut self) -> Result<SinkArtifact> {
        self.ensure_file()?;
        let artifact = self.snapshot()?;
        self.write_header_only()?;
        Ok(artifact)
    }
}
