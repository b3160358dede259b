//! REST collaborator contract.
//!
//! The sync layer never talks HTTP itself. It depends on [`BoardApi`], which
//! `taskboard-rest` implements with `reqwest` and tests replace with a fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::chat::model::Message;
use crate::notification::model::Notification;
use crate::statistics::StatisticsSnapshot;
use crate::task::model::{Task, TaskFilter, TaskPatch};

/// Failure reported by the REST collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),
}

/// Result type for REST calls.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    pub fn transport(msg: impl ToString) -> Self {
        Self::Transport(msg.to_string())
    }
}

/// Server operations the sync layer relies on. All calls are authenticated
/// with the session token by the implementation.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Live tasks matching `filter`.
    async fn list_tasks(&self, filter: &TaskFilter) -> ApiResult<Vec<Task>>;

    /// Soft-deleted tasks.
    async fn list_deleted_tasks(&self) -> ApiResult<Vec<Task>>;

    /// Apply a partial patch. No canonical echo is returned; it arrives
    /// later as a pushed `updatedTask` frame.
    async fn patch_task(&self, patch: &TaskPatch) -> ApiResult<()>;

    async fn delete_task_permanently(&self, id: i64) -> ApiResult<()>;

    /// Conversation history between two users, oldest first.
    async fn messages_between(&self, me: &str, counterpart: &str) -> ApiResult<Vec<Message>>;

    /// Pending notifications grouped by counterpart.
    async fn notifications(&self) -> ApiResult<BTreeMap<String, Vec<Notification>>>;

    /// Mark every notification from `counterpart` as read.
    async fn mark_notifications_read(&self, counterpart: &str) -> ApiResult<()>;

    async fn statistics(&self) -> ApiResult<StatisticsSnapshot>;
}
