use chrono::{DateTime, Utc};
use std::fmt;

/// Reachability of the monitored site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    Up,
    Down,
    /// No check has completed yet. Never used for errors.
    #[default]
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Up => "Up",
            Status::Down => "Down",
            Status::Unknown => "Checking…",
        })
    }
}

/// Result of one fully resolved check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    pub status: Status,
    pub checked_at: DateTime<Utc>,
}

/// What observers of a monitor see. Status and timestamp always come from
/// the same check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorState {
    pub status: Status,
    pub last_checked: Option<DateTime<Utc>>,
}

impl From<CheckResult> for MonitorState {
    fn from(result: CheckResult) -> Self {
        Self {
            status: result.status,
            last_checked: Some(result.checked_at),
        }
    }
}
