//! Trading session windows (UTC).

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Active window in HH:MM (UTC). `start > end` wraps past midnight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionWindow {
    pub start: String,
    pub end: String,
}

impl SessionWindow {
    pub fn start_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.start, "%H:%M").ok()
    }

    pub fn end_time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.end, "%H:%M").ok()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.start_time().is_none() {
            return Err(format!("invalid session start '{}' (want HH:MM)", self.start));
        }
        if self.end_time().is_none() {
            return Err(format!("invalid session end '{}' (want HH:MM)", self.end));
        }
        if self.start == self.end {
            return Err(format!("empty session window {}-{}", self.start, self.end));
        }
        Ok(())
    }

    /// Half-open containment: `[start, end)`.
    pub fn contains(&self, time: NaiveTime) -> bool {
        let (Some(start), Some(end)) = (self.start_time(), self.end_time()) else {
            return false;
        };

        if start <= end {
            time >= start && time < end
        } else {
            time >= start || time < end
        }
    }
}

/// Set of active windows.
#[derive(Debug, Clone, Default)]
pub struct SessionSchedule {
    windows: Vec<SessionWindow>,
}

impl SessionSchedule {
    pub fn new(windows: Vec<SessionWindow>) -> Self {
        Self { windows }
    }

    /// True when `now` falls in any window, or when no windows are configured.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        if self.windows.is_empty() {
            return true;
        }
        let time = now.time();
        self.windows.iter().any(|w| w.contains(time))
    }
}
