use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::{format_minutes, truncate_to_millis};
use crate::error::TrackerError;

pub const DEFAULT_CATEGORY: &str = "General";
pub const DEFAULT_COLOR_TAG: &str = "#1E40AF";
pub const DEFAULT_ESTIMATE_MINUTES: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 1,
    #[default]
    Medium = 2,
    High = 3,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Medium, Priority::High];

    pub fn value(self) -> i64 {
        self as i64
    }

    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            1 => Some(Self::Low),
            2 => Some(Self::Medium),
            3 => Some(Self::High),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Priority {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" | "1" => Ok(Self::Low),
            "m" | "medium" | "2" => Ok(Self::Medium),
            "h" | "high" | "3" => Ok(Self::High),
            other => Err(TrackerError::Validation(format!(
                "invalid priority '{other}': must be low, medium, or high"
            ))),
        }
    }
}

/// Creation inputs for a task that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due: DateTime<Utc>,
    pub estimated_minutes: u32,
    pub priority: Priority,
    pub category: String,
    pub color_tag: String,
}

impl NewTask {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        due: DateTime<Utc>,
        estimated_minutes: u32,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            due,
            estimated_minutes,
            priority: Priority::default(),
            category: DEFAULT_CATEGORY.to_string(),
            color_tag: DEFAULT_COLOR_TAG.to_string(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.title.trim().is_empty() {
            return Err(TrackerError::Validation(
                "task title must not be empty".to_string(),
            ));
        }
        if self.estimated_minutes == 0 {
            return Err(TrackerError::Validation(
                "estimated duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the full record the store persists; the id is filled in on insert.
    pub fn into_task(self, id: TaskId, now: DateTime<Utc>) -> Task {
        let due = truncate_to_millis(self.due);
        Task {
            id,
            title: self.title,
            description: self.description,
            created: truncate_to_millis(now),
            due,
            scheduled: due,
            start: None,
            end: None,
            estimated_minutes: self.estimated_minutes,
            actual_minutes: 0,
            completed: false,
            immediate: false,
            in_progress: false,
            priority: self.priority,
            category: self.category,
            color_tag: self.color_tag,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub created: DateTime<Utc>,
    pub due: DateTime<Utc>,
    pub scheduled: DateTime<Utc>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    pub estimated_minutes: u32,
    pub actual_minutes: u32,
    pub completed: bool,
    pub immediate: bool,
    pub in_progress: bool,
    pub priority: Priority,
    pub category: String,
    pub color_tag: String,
}

impl Task {
    /// Opens a tracking session. Returns false when the task is completed or
    /// a session is already open; an open session keeps its original start.
    pub fn start(&mut self, now: DateTime<Utc>) -> bool {
        if self.completed || self.in_progress {
            return false;
        }
        self.start = Some(truncate_to_millis(now));
        self.in_progress = true;
        true
    }

    /// Closes the open session and folds its whole minutes into
    /// `actual_minutes`. Returns the minutes added, or `None` if no session
    /// was open. A session flagged as running without a start closes with
    /// zero minutes.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<u32> {
        if !self.in_progress {
            return None;
        }
        let minutes = self
            .start
            .map_or(0, |start| elapsed_minutes(start, now));
        self.actual_minutes = self.actual_minutes.saturating_add(minutes);
        self.end = Some(truncate_to_millis(now));
        self.start = None;
        self.in_progress = false;
        Some(minutes)
    }

    pub fn set_completed(&mut self, completed: bool, now: DateTime<Utc>) {
        if completed {
            if self.in_progress {
                self.stop(now);
            }
            self.immediate = false;
        }
        self.completed = completed;
    }

    pub fn set_immediate(&mut self, immediate: bool) {
        self.immediate = immediate;
    }

    pub fn reschedule(&mut self, due: DateTime<Utc>) {
        let due = truncate_to_millis(due);
        self.due = due;
        self.scheduled = due;
    }

    pub fn current_session_minutes(&self, now: DateTime<Utc>) -> u32 {
        match (self.in_progress, self.start) {
            (true, Some(start)) => elapsed_minutes(start, now),
            _ => 0,
        }
    }

    pub fn total_tracked_minutes(&self, now: DateTime<Utc>) -> u32 {
        self.actual_minutes
            .saturating_add(self.current_session_minutes(now))
    }

    /// Tracked time against the estimate. Not capped at 100 so overruns show.
    pub fn progress_percent(&self, now: DateTime<Utc>) -> u32 {
        if self.completed {
            return 100;
        }
        if !self.in_progress || self.start.is_none() {
            return 0;
        }
        let total = u64::from(self.total_tracked_minutes(now));
        let estimate = u64::from(self.estimated_minutes.max(1));
        u32::try_from(total * 100 / estimate).unwrap_or(u32::MAX)
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.due < now
    }

    pub fn is_over_estimate(&self, now: DateTime<Utc>) -> bool {
        self.total_tracked_minutes(now) > self.estimated_minutes
    }

    pub fn formatted_estimate(&self) -> String {
        format_minutes(self.estimated_minutes)
    }

    pub fn formatted_actual(&self) -> String {
        if self.actual_minutes == 0 {
            "Not tracked".to_string()
        } else {
            format_minutes(self.actual_minutes)
        }
    }
}

fn elapsed_minutes(start: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let millis = (now - start).num_milliseconds().max(0);
    u32::try_from(millis / 60_000).unwrap_or(u32::MAX)
}
