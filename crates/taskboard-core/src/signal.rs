//! Signals the sync layer emits towards the UI.

use serde::Serialize;

use crate::protocol::ChannelKind;

/// Notice shown when the server ends the session.
pub const FORCED_LOGOUT_NOTICE: &str =
    "You have been logged out due to inactivity. Please log in again to continue.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Error,
}

/// Something a UI collaborator should react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum UiSignal {
    Toast { level: ToastLevel, message: String },
    /// The live board changed and should be redrawn.
    BoardChanged,
    /// The trash board changed.
    TrashChanged,
    /// The open chat changed.
    ChatChanged,
    /// The open chat dialog must close (its socket degraded or the session ended).
    CloseChat,
    NotificationsChanged { total: usize },
    DashboardChanged,
    ChannelClosed { channel: ChannelKind },
    /// Terminal: the user must acknowledge `notice` and log in again.
    SessionTerminated { notice: String },
}

impl UiSignal {
    pub fn success(message: impl Into<String>) -> Self {
        Self::Toast {
            level: ToastLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Toast {
            level: ToastLevel::Error,
            message: message.into(),
        }
    }

    pub fn session_terminated() -> Self {
        Self::SessionTerminated {
            notice: FORCED_LOGOUT_NOTICE.to_string(),
        }
    }

    pub fn is_error_toast(&self) -> bool {
        matches!(
            self,
            Self::Toast {
                level: ToastLevel::Error,
                ..
            }
        )
    }
}
