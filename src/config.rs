// ⚙️ Configuration
// Built once at startup from the environment, then passed around by value

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;

/// Configuration loading error. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

// ============================================================================
// OPERATING WINDOW
// ============================================================================

/// Daily window during which swipes are accepted.
///
/// Same-day only: `open_time < close_time`. Overnight windows are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingWindow {
    pub open_time: NaiveTime,
    pub close_time: NaiveTime,
    pub swipe_timeout: Duration,
}

impl OperatingWindow {
    pub fn new(
        open_time: NaiveTime,
        close_time: NaiveTime,
        swipe_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if open_time >= close_time {
            return Err(ConfigError::Invalid(
                "ATTENDANCE_CLOSE_TIME".to_string(),
                format!("{} is not after {}", close_time, open_time),
            ));
        }
        if swipe_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "ATTENDANCE_SWIPE_TIMEOUT_SECONDS".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            open_time,
            close_time,
            swipe_timeout,
        })
    }

    /// `open_time <= t < close_time`
    pub fn contains(&self, t: NaiveTime) -> bool {
        self.open_time <= t && t < self.close_time
    }
}

// ============================================================================
// EMAIL
// ============================================================================

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_token: String,
    pub from: String,
    pub summary_recipients: Vec<String>,
    pub summary_subject: String,
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Present only when all three window keys are set; the station requires it.
    pub window: Option<OperatingWindow>,
    pub send_on_weekends: bool,
    pub state_dir: PathBuf,
    pub server_url: Option<String>,
    /// Label stamped on swipes captured by this station
    pub location: Option<String>,
    pub http_addr: String,
    pub timezone: Tz,
    pub confirm_swipes: bool,
    pub signature: Option<String>,
    pub email: EmailConfig,
}

impl AppConfig {
    /// Read configuration from the process environment (after `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = read_required(&lookup, "EMAIL_API_URL")?;
        let api_token = read_required(&lookup, "EMAIL_API_TOKEN")?;
        let from = read_required(&lookup, "EMAIL_FROM")?;
        let summary_recipients: Vec<String> = read_required(&lookup, "SUMMARY_RECIPIENT")?
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if summary_recipients.is_empty() {
            return Err(ConfigError::Missing("SUMMARY_RECIPIENT".to_string()));
        }
        let summary_subject = read_optional(&lookup, "ATTENDANCE_SUMMARY_SUBJECT")
            .unwrap_or_else(|| "Attendance Summary".to_string());

        let window = read_window(&lookup)?;
        let send_on_weekends = read_bool_with_default(&lookup, "ATTENDANCE_SEND_ON_WEEKENDS", false);

        let state_dir = match read_optional(&lookup, "ATTENDANCE_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => {
                let home = read_required(&lookup, "HOME")?;
                PathBuf::from(home).join(".local/state/swipe_attendance")
            }
        };

        let server_url = read_optional(&lookup, "ATTENDANCE_SERVER_URL")
            .map(|url| url.trim_end_matches('/').to_string());
        let location = read_optional(&lookup, "ATTENDANCE_LOCATION");
        let http_addr = read_optional(&lookup, "ATTENDANCE_HTTP_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8000".to_string());

        let timezone = match read_optional(&lookup, "ATTENDANCE_TIMEZONE") {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| ConfigError::Invalid("ATTENDANCE_TIMEZONE".to_string(), name))?,
            None => chrono_tz::America::New_York,
        };

        let confirm_swipes = read_bool_with_default(&lookup, "ATTENDANCE_CONFIRM_SWIPES", true);
        let signature = read_optional(&lookup, "ATTENDANCE_SIGNATURE");

        Ok(Self {
            window,
            send_on_weekends,
            state_dir,
            server_url,
            location,
            http_addr,
            timezone,
            confirm_swipes,
            signature,
            email: EmailConfig {
                api_url,
                api_token,
                from,
                summary_recipients,
                summary_subject,
            },
        })
    }

    /// The operating window, or a Missing error naming the first absent key.
    pub fn require_window(&self) -> Result<OperatingWindow, ConfigError> {
        self.window
            .ok_or_else(|| ConfigError::Missing("ATTENDANCE_OPEN_TIME".to_string()))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join("log")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.state_dir.join("backup")
    }

    pub fn roster_path(&self) -> PathBuf {
        self.state_dir.join("roster.csv")
    }

    pub fn database_path(&self) -> PathBuf {
        self.state_dir.join("swipes.db")
    }

    pub fn batch_path(&self) -> PathBuf {
        self.state_dir.join("attendance.csv")
    }
}

fn read_window<F>(lookup: &F) -> Result<Option<OperatingWindow>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let open = read_optional(lookup, "ATTENDANCE_OPEN_TIME");
    let close = read_optional(lookup, "ATTENDANCE_CLOSE_TIME");
    let timeout = read_optional(lookup, "ATTENDANCE_SWIPE_TIMEOUT_SECONDS");

    if open.is_none() && close.is_none() && timeout.is_none() {
        return Ok(None);
    }

    let open = parse_time("ATTENDANCE_OPEN_TIME", open)?;
    let close = parse_time("ATTENDANCE_CLOSE_TIME", close)?;
    let timeout = match timeout {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid("ATTENDANCE_SWIPE_TIMEOUT_SECONDS".to_string(), value))?,
        None => {
            return Err(ConfigError::Missing(
                "ATTENDANCE_SWIPE_TIMEOUT_SECONDS".to_string(),
            ))
        }
    };

    OperatingWindow::new(open, close, Duration::from_secs(timeout)).map(Some)
}

/// Parse `HH:MM`.
fn parse_time(key: &str, value: Option<String>) -> Result<NaiveTime, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::Missing(key.to_string()))?;
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    read_optional(lookup, key).ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn read_optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match read_optional(lookup, key) {
        Some(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes"),
        None => default,
    }
}
