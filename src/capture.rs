// 🎫 Swipe Capture Loop
// One station: prompt while the window is open, decode, store locally,
// forward to the recorder. While closed: run due jobs, then sleep.
//
// Nothing that goes wrong inside one capture iteration stops the loop.
// Rejected swipes ring the bell, interrupts are logged, store and forward
// failures are logged and the next swipe is read as usual.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::decoder::{decode, DecodeError, RejectKind};
use crate::event::SwipeEvent;
use crate::notifier::{Attachment, Email, Notifier};
use crate::recorder::RecordRequest;
use crate::schedule::{Clock, PendingJob, Scheduler, WindowState};
use crate::sink::AttendanceSink;

const BATCH_DAY_FORMAT: &str = "%A, %B %d, %Y";

// ============================================================================
// INPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One line of track data, line terminator stripped
    Line(String),
    /// Nothing arrived within the timeout
    Timeout,
    /// The wait was cancelled (Ctrl+C)
    Interrupted,
}

/// Card reader (or anything that types like one).
pub trait SwipeSource {
    /// Throw away input buffered before the prompt.
    fn discard_pending(&mut self);

    /// Wait at most `timeout` for one line.
    fn read_swipe(&mut self, timeout: Duration) -> ReadOutcome;

    /// Signal a rejected swipe to the person at the reader.
    fn alert(&mut self);
}

// ============================================================================
// FORWARDING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Recorder accepted the swipe; carries its message
    Recorded(String),
    /// Recorder stored the swipe but the identity is not on its roster
    UnknownIdentity,
}

/// Ships a captured swipe to the recorder service.
pub trait SwipeForwarder {
    fn forward(&self, request: &RecordRequest) -> Result<ForwardOutcome>;
}

// ============================================================================
// STATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Window closed; nothing was read
    Closed,
    Timeout,
    Interrupted,
    Rejected(DecodeError),
    Recorded(SwipeEvent),
    /// Decoded but the local store refused it (already forwarded)
    StoreFailed,
}

#[derive(Debug, Clone)]
pub struct StationSettings {
    pub location: Option<String>,
    pub backup_dir: PathBuf,
    pub batch_recipients: Vec<String>,
    pub batch_subject: String,
}

impl StationSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        StationSettings {
            location: config.location.clone(),
            backup_dir: config.backup_dir(),
            batch_recipients: config.email.summary_recipients.clone(),
            batch_subject: config.email.summary_subject.clone(),
        }
    }
}

pub struct SwipeStation<S: SwipeSource, C: Clock> {
    scheduler: Scheduler<C>,
    source: S,
    sink: Box<dyn AttendanceSink>,
    forwarder: Option<Box<dyn SwipeForwarder>>,
    notifier: Arc<dyn Notifier>,
    settings: StationSettings,
}

impl<S: SwipeSource, C: Clock> SwipeStation<S, C> {
    pub fn new(
        scheduler: Scheduler<C>,
        source: S,
        sink: Box<dyn AttendanceSink>,
        notifier: Arc<dyn Notifier>,
        settings: StationSettings,
    ) -> Self {
        SwipeStation {
            scheduler,
            source,
            sink,
            forwarder: None,
            notifier,
            settings,
        }
    }

    /// Builder pattern: also forward every stored swipe
    pub fn with_forwarder(mut self, forwarder: Box<dyn SwipeForwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    pub fn scheduler(&self) -> &Scheduler<C> {
        &self.scheduler
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &dyn AttendanceSink {
        self.sink.as_ref()
    }

    /// One bounded-wait read, if the window is open.
    ///
    /// `Err` only when the decoded swipe could not be stored locally; the
    /// swipe has still been forwarded in that case.
    pub fn capture_once(&mut self) -> Result<CaptureOutcome> {
        if self.scheduler.state() != WindowState::Open {
            return Ok(CaptureOutcome::Closed);
        }

        self.source.discard_pending();
        let timeout = self.scheduler.window().swipe_timeout;

        let raw = match self.source.read_swipe(timeout) {
            ReadOutcome::Timeout => return Ok(CaptureOutcome::Timeout),
            ReadOutcome::Interrupted => {
                warn!("interrupt during swipe wait, continuing");
                return Ok(CaptureOutcome::Interrupted);
            }
            ReadOutcome::Line(raw) => raw,
        };
        debug!(raw = %raw, "card info");

        let event = match decode(&raw) {
            Ok(event) => event.with_location(self.settings.location.clone()),
            Err(e) if e.kind() == RejectKind::Timeout => return Ok(CaptureOutcome::Timeout),
            Err(e) => {
                warn!(reason = %e, kind = ?e.kind(), "swipe rejected");
                self.source.alert();
                return Ok(CaptureOutcome::Rejected(e));
            }
        };

        let stored = self.sink.append(&event);
        self.forward(&event);
        stored.with_context(|| format!("Failed to store swipe for {}", event.identity_id))?;

        info!(identity = %event.identity_id, badge = %event.badge_id, "swipe recorded");
        Ok(CaptureOutcome::Recorded(event))
    }

    fn forward(&self, event: &SwipeEvent) {
        let Some(forwarder) = &self.forwarder else {
            return;
        };
        match forwarder.forward(&RecordRequest::from(event)) {
            Ok(ForwardOutcome::Recorded(message)) => {
                info!(identity = %event.identity_id, message = %message, "recorder accepted swipe")
            }
            Ok(ForwardOutcome::UnknownIdentity) => {
                warn!(identity = %event.identity_id, "recorder does not know this identity")
            }
            Err(e) => error!(identity = %event.identity_id, error = %format!("{e:#}"), "forward failed"),
        }
    }

    /// Run every job the scheduler says is due. Each job is attempted once.
    pub fn run_pending_jobs(&mut self) -> Vec<PendingJob> {
        let jobs = self.scheduler.pending_jobs();
        for job in &jobs {
            match *job {
                PendingJob::SendBatch { day } => {
                    if let Err(e) = self.send_batch(day) {
                        error!(day = %day, error = %format!("{e:#}"), "batch send failed");
                    }
                }
            }
            self.scheduler.complete(*job);
        }
        jobs
    }

    pub fn backup_path(&self, day: NaiveDate) -> PathBuf {
        self.settings
            .backup_dir
            .join(format!("attendance-{}.csv", day.format("%Y-%m-%d")))
    }

    /// Rotate the local batch, keep a backup copy, email it.
    ///
    /// The backup file doubles as the "already handled" marker for `day`, so
    /// a restart after close neither re-sends nor clobbers the copy.
    fn send_batch(&mut self, day: NaiveDate) -> Result<()> {
        let backup = self.backup_path(day);
        if backup.exists() {
            info!(day = %day, path = %backup.display(), "batch already rotated, skipping");
            return Ok(());
        }

        let artifact = self.sink.reset().context("Failed to rotate attendance batch")?;
        info!(day = %day, swipes = artifact.events.len(), "sending attendance batch");

        if let Err(e) = write_backup(&backup, &artifact.content) {
            error!(path = %backup.display(), error = %format!("{e:#}"), "batch backup failed");
        }

        let email = Email::new(
            self.settings.batch_recipients.clone(),
            format!(
                "{} ({})",
                self.settings.batch_subject,
                day.format(BATCH_DAY_FORMAT)
            ),
            String::from_utf8_lossy(&artifact.content).into_owned(),
        )
        .with_attachment(Attachment::new(artifact.file_name, artifact.content));

        self.notifier.send(&email)?;
        Ok(())
    }

    /// One control-loop tick: capture if open, otherwise run due jobs and
    /// sleep until the next poll.
    pub fn step(&mut self) -> CaptureOutcome {
        if self.scheduler.state() == WindowState::Open {
            return match self.capture_once() {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "capture failed");
                    CaptureOutcome::StoreFailed
                }
            };
        }

        self.run_pending_jobs();
        let interval = self.scheduler.poll_interval();
        info!(sleep_secs = interval.as_secs(), "not currently accepting swipes");
        self.scheduler.clock().sleep(interval);
        CaptureOutcome::Closed
    }

    pub fn run(&mut self) -> ! {
        info!(
            open = %self.scheduler.window().open_time,
            close = %self.scheduler.window().close_time,
            "station started"
        );
        loop {
            self.step();
        }
    }
}

/// Never replaces an existing backup.
fn write_backup(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperatingWindow;
    use crate::schedule::SendDays;
    use crate::sink::CsvSink;
    use crate::testing::{ManualClock, RecordingNotifier, ScriptedSource};
    use chrono::NaiveTime;
    use std::cell::RefCell;
    use std::rc::Rc;

    const GOOD: &str = "B%12345670?;=1BADGE99=99";

    struct Fixture {
        dir: tempfile::TempDir,
        station: SwipeStation<ScriptedSource, ManualClock>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(hm: (u32, u32), source: ScriptedSource) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let station = station_in(dir.path(), hm, source, notifier.clone());
        Fixture {
            dir,
            station,
            notifier,
        }
    }

    /// A station on an existing state directory, as after a restart
    fn station_in(
        dir: &Path,
        hm: (u32, u32),
        source: ScriptedSource,
        notifier: Arc<RecordingNotifier>,
    ) -> SwipeStation<ScriptedSource, ManualClock> {
        let window = OperatingWindow::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            Duration::from_secs(60),
        )
        .unwrap();
        // 2026-10-19 is a Monday
        let scheduler = Scheduler::new(
            window,
            ManualClock::at((2026, 10, 19), hm),
            SendDays::Weekdays,
        );
        let sink = CsvSink::open(dir.join("attendance.csv")).unwrap();
        let settings = StationSettings {
            location: Some("Front Desk".to_string()),
            backup_dir: dir.join("backup"),
            batch_recipients: vec!["chief@example.test".to_string()],
            batch_subject: "Attendance".to_string(),
        };
        SwipeStation::new(scheduler, source, Box::new(sink), notifier, settings)
    }

    struct BrokenSink;

    impl AttendanceSink for BrokenSink {
        fn append(&mut self, _event: &SwipeEvent) -> Result<()> {
            anyhow::bail!("disk full")
        }

        fn events(&self) -> Result<Vec<SwipeEvent>> {
            Ok(Vec::new())
        }

        fn snapshot(&self) -> Result<crate::sink::SinkArtifact> {
            crate::sink::SinkArtifact::from_events("attendance.csv", Vec::new())
        }

        fn reset(&mut self) -> Result<crate::sink::SinkArtifact> {
            self.snapshot()
        }
    }

    struct CountingForwarder {
        seen: Rc<RefCell<Vec<RecordRequest>>>,
        fail: bool,
    }

    impl SwipeForwarder for CountingForwarder {
        fn forward(&self, request: &RecordRequest) -> Result<ForwardOutcome> {
            self.seen.borrow_mut().push(request.clone());
            if self.fail {
                anyhow::bail!("connection refused");
            }
            Ok(ForwardOutcome::Recorded("ok".to_string()))
        }
    }

    #[test]
    fn test_closed_window_reads_nothing() {
        let mut f = fixture((8, 59), ScriptedSource::lines([GOOD]));

        assert_eq!(f.station.capture_once().unwrap(), CaptureOutcome::Closed);
        assert_eq!(f.station.source().reads, 0);
    }

    #[test]
    fn test_open_window_records_swipe() {
        let mut f = fixture((16, 59), ScriptedSource::lines([GOOD]));

        let outcome = f.station.capture_once().unwrap();

        let CaptureOutcome::Recorded(event) = outcome else {
            panic!("expected a recorded swipe, got {:?}", outcome);
        };
        assert_eq!(event.identity_id, "1234567");
        assert_eq!(event.badge_id, "BADGE99");
        assert_eq!(event.location.as_deref(), Some("Front Desk"));
        assert_eq!(f.station.source().discards, 1);
        assert_eq!(f.station.sink().events().unwrap(), vec![event]);
    }

    #[test]
    fn test_rejected_swipe_alerts_and_continues() {
        let mut f = fixture((10, 0), ScriptedSource::lines(["garbage", GOOD]));

        let first = f.station.capture_once().unwrap();
        assert!(matches!(first, CaptureOutcome::Rejected(DecodeError::SeparatorCount(0))));
        assert_eq!(f.station.source().alerts, 1);

        let second = f.station.capture_once().unwrap();
        assert!(matches!(second, CaptureOutcome::Recorded(_)));
        assert_eq!(f.station.sink().events().unwrap().len(), 1);
    }

    #[test]
    fn test_timeout_and_interrupt_are_not_faults() {
        let source = ScriptedSource::new([
            ReadOutcome::Timeout,
            ReadOutcome::Interrupted,
            ReadOutcome::Line("TIMEOUT".to_string()),
            ReadOutcome::Line(GOOD.to_string()),
        ]);
        let mut f = fixture((10, 0), source);

        assert_eq!(f.station.step(), CaptureOutcome::Timeout);
        assert_eq!(f.station.step(), CaptureOutcome::Interrupted);
        assert_eq!(f.station.step(), CaptureOutcome::Timeout);
        assert!(matches!(f.station.step(), CaptureOutcome::Recorded(_)));
        assert_eq!(f.station.source().alerts, 0);
        assert_eq!(f.station.source().discards, 4);
    }

    #[test]
    fn test_forwarder_receives_swipe_and_failure_is_not_fatal() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let f = fixture((10, 0), ScriptedSource::lines([GOOD, GOOD]));
        let mut station = f.station.with_forwarder(Box::new(CountingForwarder {
            seen: seen.clone(),
            fail: true,
        }));

        assert!(matches!(station.step(), CaptureOutcome::Recorded(_)));
        assert!(matches!(station.step(), CaptureOutcome::Recorded(_)));

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].identity_id, "1234567");
        assert_eq!(seen[0].badge_id.as_deref(), Some("BADGE99"));
        assert_eq!(seen[0].location.as_deref(), Some("Front Desk"));
        assert_eq!(station.sink().events().unwrap().len(), 2);
    }

    #[test]
    fn test_batch_sent_after_close_and_rotated() {
        let mut f = fixture((16, 59), ScriptedSource::lines([GOOD]));
        assert!(matches!(f.station.step(), CaptureOutcome::Recorded(_)));

        f.station.scheduler().clock().advance(Duration::from_secs(60));
        assert_eq!(f.station.step(), CaptureOutcome::Closed);

        let sent = f.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Attendance (Monday, October 19, 2026)");
        assert_eq!(sent[0].to, vec!["chief@example.test"]);
        assert_eq!(sent[0].attachments.len(), 1);
        assert_eq!(sent[0].attachments[0].filename, "attendance.csv");
        assert!(sent[0].html.contains("1234567,BADGE99"));

        // Rotated to header only, backup kept
        assert!(f.station.sink().events().unwrap().is_empty());
        let backup = f.dir.path().join("backup/attendance-2026-10-19.csv");
        assert!(std::fs::read_to_string(backup).unwrap().contains("BADGE99"));

        // Closed step slept on the clock; no second send the same day
        assert!(f.station.scheduler().now().time() > NaiveTime::from_hms_opt(17, 1, 0).unwrap());
        f.station.step();
        assert_eq!(f.notifier.sent().len(), 1);
    }

    #[test]
    fn test_batch_send_failure_is_attempted_once() {
        let mut f = fixture((17, 30), ScriptedSource::default());
        f.notifier.fail_next();

        let ran = f.station.run_pending_jobs();

        assert_eq!(ran.len(), 1);
        assert!(f.notifier.sent().is_empty());
        assert!(f.station.run_pending_jobs().is_empty());
        assert!(f.dir.path().join("backup/attendance-2026-10-19.csv").exists());
    }

    #[test]
    fn test_restart_after_close_keeps_backup_and_sends_nothing() {
        let mut f = fixture((16, 59), ScriptedSource::lines([GOOD]));
        assert!(matches!(f.station.step(), CaptureOutcome::Recorded(_)));

        // First send fails; the backup is then the only copy
        f.station.scheduler().clock().advance(Duration::from_secs(120));
        f.notifier.fail_next();
        assert_eq!(f.station.run_pending_jobs().len(), 1);
        assert!(f.notifier.sent().is_empty());

        let backup = f.dir.path().join("backup/attendance-2026-10-19.csv");
        let before = std::fs::read_to_string(&backup).unwrap();
        assert!(before.contains("1234567,BADGE99"));

        // Power cycle: a fresh station on the same directory
        let mut restarted = station_in(
            f.dir.path(),
            (17, 30),
            ScriptedSource::default(),
            f.notifier.clone(),
        );
        restarted.run_pending_jobs();
        restarted.step();

        assert!(f.notifier.sent().is_empty());
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), before);
    }

    #[test]
    fn test_existing_backup_is_never_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup/attendance-2026-10-19.csv");
        write_backup(&path, b"first\n").unwrap();

        assert!(write_backup(&path, b"second\n").is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");
    }

    #[test]
    fn test_store_failure_is_reported_and_loop_continues() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let f = fixture((10, 0), ScriptedSource::lines([GOOD]));
        let mut station = SwipeStation::new(
            Scheduler::new(
                *f.station.scheduler().window(),
                ManualClock::at((2026, 10, 19), (10, 0)),
                SendDays::Weekdays,
            ),
            ScriptedSource::lines([GOOD]),
            Box::new(BrokenSink),
            f.notifier.clone(),
            f.station.settings.clone(),
        )
        .with_forwarder(Box::new(CountingForwarder {
            seen: seen.clone(),
            fail: false,
        }));

        assert_eq!(station.step(), CaptureOutcome::StoreFailed);
        // Still forwarded, and the next read is a normal idle timeout
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(station.step(), CaptureOutcome::Timeout);
    }
}
