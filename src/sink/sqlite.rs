// 🗄️ SQLite Swipe Store - source of truth behind the recorder

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::{AttendanceSink, SinkArtifact};
use crate::event::{canonical_timestamp, SwipeEvent};

pub struct SqliteSink {
    conn: Connection,
    /// None for in-memory stores
    path: Option<PathBuf>,
}

impl SqliteSink {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let conn = open_connection(&path)?;
        Ok(SqliteSink {
            conn,
            path: Some(path),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteSink { conn, path: None })
    }

    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM swipes", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Reopen the database if its file was removed underneath us.
    fn ensure_store(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if path.exists() {
            return Ok(());
        }
        warn!(path = %path.display(), "swipe database missing, recreating");
        // Close the stale handle first: closing a WAL connection unlinks the
        // -wal file by name, which would hit the new database's journal.
        let stale = std::mem::replace(&mut self.conn, Connection::open_in_memory()?);
        drop(stale);
        self.conn = open_connection(path)?;
        Ok(())
    }

    fn query_events(&self, since: Option<DateTime<Utc>>) -> Result<Vec<SwipeEvent>> {
        let events = match since {
            Some(since) => {
                let mut stmt = self.conn.prepare(
                    "SELECT identity_id, badge_id, raw_track_data, captured_at, location
                     FROM swipes
                     WHERE captured_at > ?1
                     ORDER BY id",
                )?;
                let rows = stmt.query_map(params![canonical_timestamp(&since)], row_to_event)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT identity_id, badge_id, raw_track_data, captured_at, location
                     FROM swipes
                     ORDER BY id",
                )?;
                let rows = stmt.query_map([], row_to_event)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(events)
    }

    fn file_name(&self) -> String {
        "swipes.csv".to_string()
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL for crash recovery; in-memory databases report "memory"
    let _mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS swipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            identity_id TEXT NOT NULL,
            badge_id TEXT NOT NULL,
            raw_track_data TEXT NOT NULL,
            captured_at TEXT NOT NULL,
            location TEXT,
            recorded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_swipes_captured_at ON swipes(captured_at)",
        [],
    )?;

    Ok(())
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<SwipeEvent> {
    let captured_at_str: String = row.get(3)?;
    let captured_at = DateTime::parse_from_rfc3339(&captured_at_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(SwipeEvent {
        identity_id: row.get(0)?,
        badge_id: row.get(1)?,
        raw_track_data: row.get(2)?,
        captured_at,
        location: row.get(4)?,
    })
}

impl AttendanceSink for SqliteSink {
    fn append(&mut self, event: &SwipeEvent) -> Result<()> {
        self.ensure_store()?;

        // Autocommit: the row is on disk once execute returns
        self.conn
            .execute(
                "INSERT INTO swipes (identity_id, badge_id, raw_track_data, captured_at, location)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    event.identity_id,
                    event.badge_id,
                    event.raw_track_data,
                    canonical_timestamp(&event.captured_at),
                    event.location,
                ],
            )
            .context("Failed to insert swipe")?;
        Ok(())
    }

    fn events(&self) -> Result<Vec<SwipeEvent>> {
        self.query_events(None)
    }

    fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<SwipeEvent>> {
        self.query_events(Some(since))
    }

    fn snapshot(&self) -> Result<SinkArtifact> {
        SinkArtifact::from_events(&self.file_name(), self.events()?)
    }

    fn reset(&mut self) -> Result<SinkArtifact> {
        self.ensure_store()?;

        let tx = self.conn.transaction()?;
        let events = {
            let mut stmt = tx.prepare(
                "SELECT identity_id, badge_id, raw_track_data, captured_at, location
                 FROM swipes
                 ORDER BY id",
            )?;
            let rows = stmt.query_map([], row_to_event)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        tx.execute("DELETE FROM swipes", [])?;
        tx.commit()?;

        SinkArtifact::from_events(&self.file_name(), events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(identity: &str, hour: u32) -> SwipeEvent {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, hour, 0, 0).unwrap();
        SwipeEvent::new(identity.to_string(), "BADGE".to_string(), String::new(), ts)
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        let swipes = vec![event("3333333", 15), event("1111111", 9), event("2222222", 12)];
        for swipe in &swipes {
            sink.append(swipe).unwrap();
        }

        assert_eq!(sink.count().unwrap(), 3);
        assert_eq!(sink.events().unwrap(), swipes);
    }

    #[test]
    fn test_events_since_is_strict() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.append(&event("1111111", 9)).unwrap();
        sink.append(&event("2222222", 12)).unwrap();
        sink.append(&event("3333333", 15)).unwrap();

        let since = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let events = sink.events_since(since).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity_id, "3333333");
    }

    #[test]
    fn test_reset_rotates() {
        let mut sink = SqliteSink::open_in_memory().unwrap();
        sink.append(&event("1111111", 9)).unwrap();

        let artifact = sink.reset().unwrap();
        assert_eq!(artifact.events.len(), 1);
        assert_eq!(sink.count().unwrap(), 0);

        let again = sink.reset().unwrap();
        assert!(again.is_empty());
        let text = String::from_utf8(again.content).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_file_store_recreated_when_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swipes.db");
        let mut sink = SqliteSink::open(&path).unwrap();
        sink.append(&event("1111111", 9)).unwrap();

        // Drop the WAL side files too
        for entry in std::fs::read_dir(dir.path()).unwrap() {
            std::fs::remove_file(entry.unwrap().path()).unwrap();
        }

        sink.append(&event("2222222", 10)).unwrap();
        assert!(path.exists());
        assert_eq!(sink.events().unwrap().len(), 1);
    }
}
