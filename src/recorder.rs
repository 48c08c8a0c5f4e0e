// 🛰️ Recorder Service
// Network-facing source of truth: stations post swipes here, summaries are
// generated from here.
//
// Every swipe is stored before the roster is consulted; an unknown identity
// comes back as NotFound but its row stays in the store. The sink sits
// behind a Mutex, so concurrent callers are serialized through one writer.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::event::SwipeEvent;
use crate::notifier::{Attachment, Email, Notifier, NotifyError};
use crate::roster::Roster;
use crate::sink::AttendanceSink;
use crate::summary::{build_summary, write_artifacts, SummaryReport};

/// Default look-back of a summary
pub const SUMMARY_LOOKBACK_HOURS: i64 = 24;

const CONFIRMATION_TIME_FORMAT: &str = "%Y-%m-%d, %I:%M:%S %p";
const DAY_FORMAT: &str = "%B %d, %Y";
const ARTIFACT_STEM_FORMAT: &str = "%Y-%m-%d-%H%M%S";

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("identity {0} not found in roster")]
    NotFound(String),

    #[error("store error: {0:#}")]
    Store(anyhow::Error),

    #[error("roster error: {0:#}")]
    Roster(anyhow::Error),

    #[error("report error: {0:#}")]
    Report(anyhow::Error),

    #[error(transparent)]
    Notification(#[from] NotifyError),
}

// ============================================================================
// REQUESTS / RESPONSES
// ============================================================================

/// Body of a record call. Also what a station posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    pub identity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_track_data: Option<String>,
}

impl RecordRequest {
    pub fn new(identity_id: impl Into<String>) -> Self {
        RecordRequest {
            identity_id: identity_id.into(),
            badge_id: None,
            location: None,
            raw_track_data: None,
        }
    }
}

impl From<&SwipeEvent> for RecordRequest {
    fn from(event: &SwipeEvent) -> Self {
        RecordRequest {
            identity_id: event.identity_id.clone(),
            badge_id: Some(event.badge_id.clone()),
            location: event.location.clone(),
            raw_track_data: Some(event.raw_track_data.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordReceipt {
    pub message: String,
    pub event: SwipeEvent,
}

#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub message: String,
    pub report: SummaryReport,
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecorderSettings {
    pub roster_path: PathBuf,
    pub backup_dir: PathBuf,
    pub timezone: Tz,
    pub confirm_swipes: bool,
    pub signature: Option<String>,
    pub summary_recipients: Vec<String>,
    pub summary_subject: String,
}

impl RecorderSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        RecorderSettings {
            roster_path: config.roster_path(),
            backup_dir: config.backup_dir(),
            timezone: config.timezone,
            confirm_swipes: config.confirm_swipes,
            signature: config.signature.clone(),
            summary_recipients: config.email.summary_recipients.clone(),
            summary_subject: config.email.summary_subject.clone(),
        }
    }
}

// ============================================================================
// SERVICE
// ============================================================================

pub struct RecorderService {
    sink: Mutex<Box<dyn AttendanceSink>>,
    notifier: Arc<dyn Notifier>,
    settings: RecorderSettings,
}

impl RecorderService {
    pub fn new(
        sink: Box<dyn AttendanceSink>,
        notifier: Arc<dyn Notifier>,
        settings: RecorderSettings,
    ) -> Self {
        RecorderService {
            sink: Mutex::new(sink),
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &RecorderSettings {
        &self.settings
    }

    fn lock_sink(&self) -> Result<MutexGuard<'_, Box<dyn AttendanceSink>>, RecorderError> {
        self.sink
            .lock()
            .map_err(|_| RecorderError::Store(anyhow::anyhow!("swipe store lock poisoned")))
    }

    /// Store a swipe, then look its identity up in a freshly loaded roster.
    pub fn record(&self, request: RecordRequest) -> Result<RecordReceipt, RecorderError> {
        let now = Utc::now();
        let event = SwipeEvent::new(
            request.identity_id.trim().to_string(),
            request.badge_id.unwrap_or_default(),
            request.raw_track_data.unwrap_or_default(),
            now,
        )
        .with_location(request.location);

        info!(
            identity = %event.identity_id,
            location = ?event.location,
            at = %self.pretty_time(&now),
            "/swipe"
        );

        self.lock_sink()?
            .append(&event)
            .map_err(RecorderError::Store)?;

        let roster = Roster::load(&self.settings.roster_path).map_err(RecorderError::Roster)?;
        let Some(entry) = roster.lookup(&event.identity_id) else {
            error!(identity = %event.identity_id, "unable to find identity in roster");
            return Err(RecorderError::NotFound(event.identity_id));
        };

        if !self.settings.confirm_swipes {
            return Ok(RecordReceipt {
                message: "Swipe recorded".to_string(),
                event,
            });
        }

        let day = now.with_timezone(&self.settings.timezone).format(DAY_FORMAT);
        let mut body = format!(
            "Hello {}, your attendance has been recorded: <br/> {}",
            entry.name,
            self.pretty_time(&now)
        );
        if let Some(signature) = &self.settings.signature {
            body.push_str(&format!(" <br/> {}", signature));
        }
        let email = Email::new(
            vec![entry.email.clone()],
            format!("Attendance Confirmed ({})", day),
            body,
        );

        // The swipe is already stored; a failed confirmation does not undo it
        let message = match self.notifier.send(&email) {
            Ok(()) => "Swipe recorded and email sent".to_string(),
            Err(e) => {
                warn!(identity = %event.identity_id, error = %e, "confirmation email failed");
                "Swipe recorded; confirmation email could not be sent".to_string()
            }
        };

        Ok(RecordReceipt { message, event })
    }

    /// Report on everything captured after `since` (default: last 24 hours)
    /// and email it with CSV and XLSX attachments.
    pub fn summarize(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<SummaryOutcome, RecorderError> {
        let now = Utc::now();
        let since = since.unwrap_or_else(|| now - Duration::hours(SUMMARY_LOOKBACK_HOURS));
        let local_now = now.with_timezone(&self.settings.timezone);
        info!(since = %since, "/send-summary");

        let events = self
            .lock_sink()?
            .events_since(since)
            .map_err(RecorderError::Store)?;
        let roster = Roster::load(&self.settings.roster_path).map_err(RecorderError::Roster)?;

        let mut report = build_summary(&events, &roster, since, self.settings.timezone, now);
        let stem = local_now.format(ARTIFACT_STEM_FORMAT).to_string();
        let paths = write_artifacts(&mut report, &self.settings.backup_dir, &stem)
            .map_err(RecorderError::Report)?;

        let mut email = Email::new(
            self.settings.summary_recipients.clone(),
            format!(
                "{} ({})",
                self.settings.summary_subject,
                local_now.format(DAY_FORMAT)
            ),
            "Please find attached the daily swipe summary.",
        );
        for path in &paths {
            email = email.with_attachment(Attachment::from_path(path)?);
        }

        if let Err(e) = self.notifier.send(&email) {
            error!(error = %e, "summary email failed");
            return Err(e.into());
        }

        info!(
            rows = report.rows.len(),
            matched = report.matched_count(),
            "summary sent"
        );
        Ok(SummaryOutcome {
            message: "Summary sent successfully".to_string(),
            report,
        })
    }

    fn pretty_time(&self, ts: &DateTime<Utc>) -> String {
        ts.with_timezone(&self.settings.timezone)
            .format(CONFIRMATION_TIME_FORMAT)
            .to_string()
    }
}
