// Swipe Attendance - Core Library
// Exposes all modules for the capture station, the recorder server, and tests

pub mod capture;
pub mod config;
pub mod decoder;
pub mod event;
pub mod notifier;
pub mod recorder;
pub mod remote;
pub mod roster;
pub mod schedule;
pub mod sink;
pub mod summary;
pub mod telemetry;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use capture::{
    CaptureOutcome, ForwardOutcome, ReadOutcome, StationSettings, SwipeForwarder, SwipeSource,
    SwipeStation,
};
pub use config::{AppConfig, ConfigError, EmailConfig, OperatingWindow};
pub use decoder::{decode, decode_at, DecodeError, RejectKind};
pub use event::{SwipeEvent, ATTENDANCE_HEADER};
pub use notifier::{Attachment, Email, HttpEmailNotifier, Notifier, NotifyError};
pub use recorder::{
    RecordReceipt, RecordRequest, RecorderError, RecorderService, RecorderSettings,
    SummaryOutcome,
};
pub use remote::RecorderClient;
pub use roster::{Roster, RosterEntry};
pub use schedule::{Clock, PendingJob, Scheduler, SendDays, SystemClock, WindowState};
pub use sink::{AttendanceSink, CsvSink, SinkArtifact, SqliteSink};
pub use summary::{build_summary, write_artifacts, SummaryReport, SummaryRow};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
