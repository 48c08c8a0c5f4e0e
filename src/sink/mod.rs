// Attendance Sinks
// One capability, several backing stores:
// - CsvSink: append-only flat file on the capture station
// - SqliteSink: WAL database behind the recorder service
//
// Every append is durable on return. A missing backing store is recreated
// once, transparently, instead of failing the capture path.

pub mod csv_file;
pub mod sqlite;

pub use csv_file::CsvSink;
pub use sqlite::SqliteSink;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::event::{SwipeEvent, ATTENDANCE_HEADER};

/// Contents of a sink at one instant, ready to attach to an email.
#[derive(Debug, Clone)]
pub struct SinkArtifact {
    pub file_name: String,
    /// CSV text, header row included
    pub content: Vec<u8>,
    /// Same rows, in insertion order
    pub events: Vec<SwipeEvent>,
}

impl SinkArtifact {
    pub fn from_events(file_name: &str, events: Vec<SwipeEvent>) -> Result<Self> {
        let content = render_csv(&events)?;
        Ok(SinkArtifact {
            file_name: file_name.to_string(),
            content,
            events,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub trait AttendanceSink: Send {
    /// Store one event. Durable once this returns `Ok`.
    fn append(&mut self, event: &SwipeEvent) -> Result<()>;

    /// All stored events in insertion order.
    fn events(&self) -> Result<Vec<SwipeEvent>>;

    /// Events captured strictly after `since`, in insertion order.
    fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<SwipeEvent>> {
        Ok(self
            .events()?
            .into_iter()
            .filter(|e| e.captured_at > since)
            .collect())
    }

    fn snapshot(&self) -> Result<SinkArtifact>;

    /// Hand back the current contents, then clear to an empty, header-only
    /// store.
    fn reset(&mut self) -> Result<SinkArtifact>;
}

/// Render events as attendance CSV, header first.
pub fn render_csv(events: &[SwipeEvent]) -> Result<Vec<u8>> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(ATTENDANCE_HEADER)?;
    for event in events {
        wtr.serialize(event)?;
    }
    Ok(wtr.into_inner()?)
}
