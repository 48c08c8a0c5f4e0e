// ⌨️ Terminal swipe source
// USB card readers type the track data followed by Enter. Raw mode lets the
// read honour a deadline and see Ctrl+C as a key instead of a signal.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::{self, Write};
use std::time::{Duration, Instant};
use tracing::{error, warn};

use swipe_attendance::{ReadOutcome, SwipeSource};

/// Restores cooked mode on every exit path of a read.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

pub struct TerminalSource {
    prompt: String,
}

impl TerminalSource {
    /// Fails when stdin is not a terminal.
    pub fn new(prompt: impl Into<String>) -> io::Result<Self> {
        drop(RawModeGuard::enable()?);
        Ok(TerminalSource {
            prompt: prompt.into(),
        })
    }

    fn show(&self, text: &str) {
        let mut out = io::stdout();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }

    fn read_line_until(&self, deadline: Instant) -> io::Result<ReadOutcome> {
        let mut line = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(ReadOutcome::Timeout);
            }
            if !event::poll(remaining)? {
                continue;
            }
            let Event::Key(KeyEvent {
                code,
                modifiers,
                kind,
                ..
            }) = event::read()?
            else {
                continue;
            };
            if kind == KeyEventKind::Release {
                continue;
            }
            match code {
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(ReadOutcome::Interrupted)
                }
                KeyCode::Enter => return Ok(ReadOutcome::Line(line)),
                KeyCode::Backspace => {
                    line.pop();
                }
                KeyCode::Char(c) => line.push(c),
                _ => {}
            }
        }
    }
}

impl SwipeSource for TerminalSource {
    fn discard_pending(&mut self) {
        let Ok(_guard) = RawModeGuard::enable() else {
            return;
        };
        while let Ok(true) = event::poll(Duration::ZERO) {
            if event::read().is_err() {
                break;
            }
        }
    }

    fn read_swipe(&mut self, timeout: Duration) -> ReadOutcome {
        self.show(&self.prompt);
        let deadline = Instant::now() + timeout;

        let outcome = match RawModeGuard::enable() {
            Ok(_guard) => self.read_line_until(deadline),
            Err(e) => Err(e),
        };
        self.show("\r\n");

        match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "terminal read failed");
                // Keep the loop from spinning on a broken terminal
                std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                ReadOutcome::Timeout
            }
        }
    }

    fn alert(&mut self) {
        warn!("ringing bell");
        self.show("\x07");
    }
}
