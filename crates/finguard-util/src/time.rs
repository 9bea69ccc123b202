//! Time utilities for the session agent
//!
//! Provides both monotonic time (for idle and renewal timers) and
//! wall-clock time (for credential expiry, quiet hours and retention).
//!
//! # Mock Time for Development
//!
//! In debug builds, the `FINGUARD_MOCK_TIME` environment variable can be set
//! to override the system time for all wall-clock decisions. This is useful
//! for exercising quiet hours and the weekly digest day by hand.
//!
//! Format: `YYYY-MM-DD HH:MM:SS` (e.g., `2025-12-28 22:30:00`)
//!
//! Example:
//! ```bash
//! FINGUARD_MOCK_TIME="2025-12-28 22:30:00" finguard-agent
//! ```

use chrono::{DateTime, Local, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "FINGUARD_MOCK_TIME";

const SECONDS_PER_DAY: u32 = 86_400;

/// Offset between mock time and real time, captured once at process start
/// so mock time advances naturally.
static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

#[allow(clippy::disallowed_methods)] // This is the internal implementation that wraps Local::now()
fn get_mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            if let Ok(mock_time_str) = std::env::var(MOCK_TIME_ENV_VAR) {
                match NaiveDateTime::parse_from_str(&mock_time_str, "%Y-%m-%d %H:%M:%S") {
                    Ok(naive_dt) => {
                        if let Some(mock_dt) = Local.from_local_datetime(&naive_dt).single() {
                            let offset = mock_dt.signed_duration_since(chrono::Local::now());
                            tracing::info!(
                                mock_time = %mock_time_str,
                                offset_secs = offset.num_seconds(),
                                "Mock time enabled"
                            );
                            return Some(offset);
                        }
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            "Failed to convert mock time to local timezone"
                        );
                    }
                    Err(_) => {
                        tracing::warn!(
                            mock_time = %mock_time_str,
                            expected_format = "%Y-%m-%d %H:%M:%S",
                            "Invalid mock time format"
                        );
                    }
                }
            }
            None
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Get the current local time, respecting mock time settings in debug builds.
#[allow(clippy::disallowed_methods)] // This is the wrapper that provides mock time support
pub fn now() -> DateTime<Local> {
    let real_now = chrono::Local::now();

    match get_mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// A point in monotonic time. Immune to wall-clock changes, so every
/// timer deadline is expressed in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonotonicInstant(Instant);

impl MonotonicInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn duration_since(&self, earlier: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    /// Returns duration until `self`, or zero if `self` is in the past
    pub fn saturating_duration_until(&self, from: MonotonicInstant) -> Duration {
        self.0.saturating_duration_since(from.0)
    }
}

impl std::ops::Add<Duration> for MonotonicInstant {
    type Output = MonotonicInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MonotonicInstant(self.0 + rhs)
    }
}

/// Time of day with minute resolution, written as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        Self {
            hour: time.hour() as u8,
            minute: time.minute() as u8,
        }
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        (self.hour as u32) * 3600 + (self.minute as u32) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for WallClock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .split_once(':')
            .ok_or_else(|| "Expected HH:MM format".to_string())?;

        let hour: u8 = hour.trim().parse().map_err(|_| "Invalid hour".to_string())?;
        let minute: u8 = minute
            .trim()
            .parse()
            .map_err(|_| "Invalid minute".to_string())?;

        if hour >= 24 {
            return Err("Hour must be 0-23".into());
        }
        if minute >= 60 {
            return Err("Minute must be 0-59".into());
        }

        Ok(Self { hour, minute })
    }
}

impl TryFrom<String> for WallClock {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WallClock> for String {
    fn from(value: WallClock) -> Self {
        value.to_string()
    }
}

/// A daily time-of-day window, half-open `[start, end)`.
///
/// `start > end` wraps over midnight (22:00-07:00). `start == end` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyWindow {
    pub start: WallClock,
    pub end: WallClock,
}

impl DailyWindow {
    pub fn new(start: WallClock, end: WallClock) -> Self {
        Self { start, end }
    }

    /// Check if the given local datetime falls within this window
    pub fn contains(&self, dt: &DateTime<Local>) -> bool {
        let time = WallClock::from_naive_time(dt.time());

        if self.start <= self.end {
            time >= self.start && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }

    /// Next occurrence of the window's end strictly after `dt`
    pub fn next_end(&self, dt: &DateTime<Local>) -> DateTime<Local> {
        let now_secs = dt.num_seconds_from_midnight();
        let end_secs = self.end.as_seconds_from_midnight();

        let mut remaining = (end_secs + SECONDS_PER_DAY - now_secs % SECONDS_PER_DAY) % SECONDS_PER_DAY;
        if remaining == 0 {
            remaining = SECONDS_PER_DAY;
        }

        let target = *dt + chrono::Duration::seconds(remaining as i64);
        target.with_nanosecond(0).unwrap_or(target)
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Countdown display for the idle warning prompt (`m:ss`). Partial seconds
/// round up so the prompt never shows `0:00` while time remains.
pub fn format_countdown(d: Duration) -> String {
    let mut total_secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        total_secs += 1;
    }
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(h: u8, m: u8) -> WallClock {
        WallClock::new(h, m).unwrap()
    }

    #[test]
    fn test_wall_clock_ordering() {
        assert!(clock(7, 0) < clock(12, 0));
        assert!(clock(12, 0) < clock(22, 0));
    }

    #[test]
    fn test_wall_clock_parse_and_display() {
        assert_eq!("22:00".parse::<WallClock>().unwrap(), clock(22, 0));
        assert_eq!("07:05".parse::<WallClock>().unwrap().to_string(), "07:05");

        assert!("24:00".parse::<WallClock>().is_err());
        assert!("12:60".parse::<WallClock>().is_err());
        assert!("noon".parse::<WallClock>().is_err());
    }

    #[test]
    fn test_wall_clock_serializes_as_string() {
        let json = serde_json::to_string(&clock(22, 30)).unwrap();
        assert_eq!(json, "\"22:30\"");

        let parsed: WallClock = serde_json::from_str("\"07:00\"").unwrap();
        assert_eq!(parsed, clock(7, 0));
        assert!(serde_json::from_str::<WallClock>("\"25:00\"").is_err());
    }

    #[test]
    fn test_daily_window_same_day() {
        let window = DailyWindow::new(clock(14, 0), clock(18, 0));

        let inside = Local.with_ymd_and_hms(2025, 12, 29, 15, 0, 0).unwrap();
        let before = Local.with_ymd_and_hms(2025, 12, 29, 10, 0, 0).unwrap();
        let at_end = Local.with_ymd_and_hms(2025, 12, 29, 18, 0, 0).unwrap();

        assert!(window.contains(&inside));
        assert!(!window.contains(&before));
        assert!(!window.contains(&at_end), "window end is exclusive");
    }

    #[test]
    fn test_daily_window_overnight() {
        let window = DailyWindow::new(clock(22, 0), clock(7, 0));

        let late = Local.with_ymd_and_hms(2025, 12, 29, 23, 30, 0).unwrap();
        let early = Local.with_ymd_and_hms(2025, 12, 30, 6, 59, 59).unwrap();
        let morning = Local.with_ymd_and_hms(2025, 12, 30, 7, 0, 0).unwrap();
        let evening = Local.with_ymd_and_hms(2025, 12, 29, 21, 59, 0).unwrap();

        assert!(window.contains(&late));
        assert!(window.contains(&early));
        assert!(!window.contains(&morning));
        assert!(!window.contains(&evening));
    }

    #[test]
    fn test_daily_window_empty_when_start_equals_end() {
        let window = DailyWindow::new(clock(9, 0), clock(9, 0));
        let dt = Local.with_ymd_and_hms(2025, 12, 29, 9, 0, 0).unwrap();
        assert!(!window.contains(&dt));
    }

    #[test]
    fn test_next_end_before_midnight() {
        let window = DailyWindow::new(clock(22, 0), clock(7, 0));
        let dt = Local.with_ymd_and_hms(2025, 12, 29, 23, 0, 0).unwrap();

        let end = window.next_end(&dt);
        assert_eq!(end, Local.with_ymd_and_hms(2025, 12, 30, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_next_end_after_midnight() {
        let window = DailyWindow::new(clock(22, 0), clock(7, 0));
        let dt = Local.with_ymd_and_hms(2025, 12, 30, 2, 15, 30).unwrap();

        let end = window.next_end(&dt);
        assert_eq!(end, Local.with_ymd_and_hms(2025, 12, 30, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(Duration::from_secs(300)), "5:00");
        assert_eq!(format_countdown(Duration::from_secs(61)), "1:01");
        assert_eq!(format_countdown(Duration::from_millis(400)), "0:01");
        assert_eq!(format_countdown(Duration::ZERO), "0:00");
    }

    #[test]
    fn test_monotonic_instant() {
        let t1 = MonotonicInstant::now();
        let t2 = t1 + Duration::from_secs(5);

        assert!(t2 > t1);
        assert_eq!(t2.duration_since(t1), Duration::from_secs(5));
        assert_eq!(t1.duration_since(t2), Duration::ZERO);
        assert_eq!(t2.saturating_duration_until(t1), Duration::from_secs(5));
        assert_eq!(t1.saturating_duration_until(t2), Duration::ZERO);
    }

    #[test]
    fn test_mock_time_env_var_name() {
        assert_eq!(MOCK_TIME_ENV_VAR, "FINGUARD_MOCK_TIME");
    }

    #[test]
    fn test_now_is_reasonable() {
        use chrono::Datelike;

        let t = now();
        assert!(t.year() >= 2020);
        assert!(t.year() <= 2100);
    }
}
