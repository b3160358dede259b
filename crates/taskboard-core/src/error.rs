//! Centralized error types for the sync layer.

use thiserror::Error;

use crate::protocol::ChannelKind;

/// Main error type for realtime sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Unknown task status code: {0}")]
    UnknownStatus(i32),

    #[error("Channel is not open: {0}")]
    ChannelNotOpen(ChannelKind),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("Session was terminated by the server")]
    SessionTerminated,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("No active view: {0}")]
    NoActiveView(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("REST error: {0}")]
    Api(#[from] crate::api::ApiError),
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a permission error.
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }
}
