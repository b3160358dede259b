//! Task domain models.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SyncError;

/// A task on the board, as the server sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(
        rename = "startDate",
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<NaiveDate>,
    #[serde(
        rename = "endDate",
        default,
        deserialize_with = "lenient_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub category_type: String,
    #[serde(default)]
    pub username_author: String,
    #[serde(default)]
    pub deleted: bool,
}

fn default_priority() -> i32 {
    1
}

/// Accepts `YYYY-MM-DD`, a datetime whose date part is `YYYY-MM-DD`, an empty
/// string or null. Anything unparseable is treated as "no date".
fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date))
}

/// A patch date field that is present, possibly `null` or empty. Absent
/// fields fall back to the serde default (`None`, unchanged).
fn present_date<'de, D>(deserializer: D) -> Result<Option<Option<NaiveDate>>, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_date(deserializer).map(Some)
}

/// Parse the date prefix of a wire date string.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let prefix = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

impl Task {
    /// Apply the fields present in `patch`.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(deleted) = patch.deleted {
            self.deleted = deleted;
        }
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(start) = patch.start_date {
            self.start_date = start;
        }
        if let Some(end) = patch.end_date {
            self.end_date = end;
        }
        if let Some(category) = &patch.category_type {
            self.category_type = category.clone();
        }
    }

    /// Case-insensitive match of `term` against title and description.
    pub fn matches_search(&self, term: &str) -> bool {
        if term.is_empty() {
            return true;
        }
        let term = term.to_lowercase();
        self.title.to_lowercase().contains(&term)
            || self.description.to_lowercase().contains(&term)
    }
}

/// Task status (board column). Encoded on the wire as 100 / 200 / 300.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    /// All statuses in column order.
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::Doing, TaskStatus::Done];

    /// Numeric wire code.
    pub fn code(self) -> i32 {
        match self {
            Self::Todo => 100,
            Self::Doing => 200,
            Self::Done => 300,
        }
    }

    /// Parse from a wire code.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            100 => Some(Self::Todo),
            200 => Some(Self::Doing),
            300 => Some(Self::Done),
            _ => None,
        }
    }

    /// Parse a column name or numeric code typed by a user.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "todo" | "to do" | "100" => Some(Self::Todo),
            "doing" | "200" => Some(Self::Doing),
            "done" | "300" => Some(Self::Done),
            _ => None,
        }
    }

    /// Column label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "TO DO",
            Self::Doing => "DOING",
            Self::Done => "DONE",
        }
    }

    /// The column to the left, if any.
    pub fn left(self) -> Option<Self> {
        match self {
            Self::Todo => None,
            Self::Doing => Some(Self::Todo),
            Self::Done => Some(Self::Doing),
        }
    }

    /// The column to the right, if any.
    pub fn right(self) -> Option<Self> {
        match self {
            Self::Todo => Some(Self::Doing),
            Self::Doing => Some(Self::Done),
            Self::Done => None,
        }
    }
}

impl TryFrom<i32> for TaskStatus {
    type Error = SyncError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(SyncError::UnknownStatus(code))
    }
}

impl From<TaskStatus> for i32 {
    fn from(status: TaskStatus) -> Self {
        status.code()
    }
}

/// Partial update sent to the task mutation endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// `Some(None)` clears the date; it is sent as `null`.
    #[serde(
        rename = "startDate",
        default,
        deserialize_with = "present_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(
        rename = "endDate",
        default,
        deserialize_with = "present_date",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_type: Option<String>,
}

impl TaskPatch {
    /// Status change for a single task.
    pub fn status(id: i64, status: TaskStatus) -> Self {
        Self {
            id,
            status: Some(status),
            ..Default::default()
        }
    }

    /// Soft-delete (`true`) or recycle (`false`) a task.
    pub fn deleted(id: i64, deleted: bool) -> Self {
        Self {
            id,
            deleted: Some(deleted),
            ..Default::default()
        }
    }

    /// Full edit carrying every editable field of `task`.
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id,
            status: Some(task.status),
            deleted: None,
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            priority: Some(task.priority),
            start_date: Some(task.start_date),
            end_date: Some(task.end_date),
            category_type: Some(task.category_type.clone()),
        }
    }

    /// True when the patch changes nothing but the status.
    pub fn is_status_only(&self) -> bool {
        self.status.is_some()
            && self.deleted.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.category_type.is_none()
    }
}

/// Active filter of the live board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub username: Option<String>,
    pub category: Option<String>,
}

impl TaskFilter {
    /// Build a filter; empty strings mean "no constraint".
    pub fn new(username: Option<&str>, category: Option<&str>) -> Self {
        let clean = |s: Option<&str>| {
            s.map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            username: clean(username),
            category: clean(category),
        }
    }

    /// True when no constraint is set.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.category.is_none()
    }

    /// Whether `task` belongs in a view with this filter.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(username) = &self.username {
            if &task.username_author != username {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &task.category_type != category {
                return false;
            }
        }
        true
    }
}

/// Number of tasks per column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCounts {
    pub todo: usize,
    pub doing: usize,
    pub done: usize,
}

impl ColumnCounts {
    pub fn get(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Todo => self.todo,
            TaskStatus::Doing => self.doing,
            TaskStatus::Done => self.done,
        }
    }
}
