// ⏰ Operating Window Scheduler
// Polling state machine: CLOSED -> OPEN -> CLOSED, re-derived from the wall
// clock on every tick. Nothing is persisted, so a restart mid-window lands in
// the right state.

use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::config::OperatingWindow;

/// Longest the control loop sleeps while the window is closed
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(30 * 60);

// ============================================================================
// CLOCK
// ============================================================================

/// Wall-clock source, injectable for tests.
pub trait Clock {
    /// Local wall-clock time (the window is expressed in local time)
    fn now(&self) -> NaiveDateTime;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

// ============================================================================
// STATE + JOBS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    Open,
    Closed,
}

/// Work that becomes due while the window is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingJob {
    /// Ship and rotate the attendance batch captured on `day`
    SendBatch { day: NaiveDate },
}

/// Which days get a batch send at close time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendDays {
    Weekdays,
    Every,
}

impl SendDays {
    pub fn includes(&self, day: NaiveDate) -> bool {
        match self {
            SendDays::Every => true,
            SendDays::Weekdays => !matches!(day.weekday(), Weekday::Sat | Weekday::Sun),
        }
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

pub struct Scheduler<C: Clock> {
    window: OperatingWindow,
    clock: C,
    send_days: SendDays,
    last_sent: Option<NaiveDate>,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(window: OperatingWindow, clock: C, send_days: SendDays) -> Self {
        Self {
            window,
            clock,
            send_days,
            last_sent: None,
        }
    }

    pub fn window(&self) -> &OperatingWindow {
        &self.window
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    pub fn state(&self) -> WindowState {
        state_at(&self.window, self.clock.now().time())
    }

    /// Time until the next open or close edge (tomorrow's open once closed).
    pub fn time_until_next_edge(&self) -> Duration {
        time_until_next_edge(&self.window, self.clock.now().time())
    }

    /// How long to sleep while closed.
    ///
    /// The next edge, but never shorter than the swipe timeout and never
    /// longer than `MAX_POLL_INTERVAL`. Edge actions may lag by up to one
    /// interval.
    pub fn poll_interval(&self) -> Duration {
        let floor = self.window.swipe_timeout.min(MAX_POLL_INTERVAL);
        self.time_until_next_edge().clamp(floor, MAX_POLL_INTERVAL)
    }

    pub fn pending_jobs(&self) -> Vec<PendingJob> {
        let now = self.clock.now();
        let today = now.date();
        let mut jobs = Vec::new();

        if now.time() >= self.window.close_time
            && self.send_days.includes(today)
            && self.last_sent != Some(today)
        {
            jobs.push(PendingJob::SendBatch { day: today });
        }

        jobs
    }

    /// Mark a job as handled for its period, whatever the outcome.
    pub fn complete(&mut self, job: PendingJob) {
        match job {
            PendingJob::SendBatch { day } => self.last_sent = Some(day),
        }
    }
}

/// `Open` iff `open_time <= t < close_time`.
pub fn state_at(window: &OperatingWindow, t: NaiveTime) -> WindowState {
    if window.contains(t) {
        WindowState::Open
    } else {
        WindowState::Closed
    }
}

pub fn time_until_next_edge(window: &OperatingWindow, t: NaiveTime) -> Duration {
    let until = if t < window.open_time {
        window.open_time - t
    } else if t < window.close_time {
        window.close_time - t
    } else {
        // Tomorrow's open
        chrono::Duration::days(1) - (t - window.open_time)
    };
    until.to_std().unwrap_or(Duration::ZERO)
}
