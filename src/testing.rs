// Test doubles shared across module tests

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};

use crate::capture::{ReadOutcome, SwipeSource};
use crate::notifier::{Email, Notifier, NotifyError};
use crate::schedule::Clock;

/// Clock that only moves when told to (or when something sleeps on it).
pub struct ManualClock {
    now: Cell<NaiveDateTime>,
}

impl ManualClock {
    pub fn at(date: (i32, u32, u32), hm: (u32, u32)) -> Self {
        let now = NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hm.0, hm.1, 0)
            .unwrap();
        ManualClock {
            now: Cell::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap();
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Notifier that keeps every email instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Email>>,
    fail_next: AtomicBool,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    /// The next send attempt is rejected (and not kept).
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, email: &Email) -> Result<(), NotifyError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Swipe source fed from a script; reads past the end time out.
#[derive(Default)]
pub struct ScriptedSource {
    script: VecDeque<ReadOutcome>,
    pub discards: usize,
    pub alerts: usize,
    pub reads: usize,
}

impl ScriptedSource {
    pub fn new(script: impl IntoIterator<Item = ReadOutcome>) -> Self {
        ScriptedSource {
            script: script.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(lines.into_iter().map(|l| ReadOutcome::Line(l.to_string())))
    }
}

impl SwipeSource for ScriptedSource {
    fn discard_pending(&mut self) {
        self.discards += 1;
    }

    fn read_swipe(&mut self, _timeout: Duration) -> ReadOutcome {
        self.reads += 1;
        self.script.pop_front().unwrap_or(ReadOutcome::Timeout)
    }

    fn alert(&mut self) {
        self.alerts += 1;
    }
}
