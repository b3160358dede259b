//! Commands a UI collaborator sends to the engine.

use taskboard_core::task::{Task, TaskFilter, TaskStatus};

/// Direction of a one-column move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Left,
    Right,
}

impl Step {
    pub fn apply(self, status: TaskStatus) -> Option<TaskStatus> {
        match self {
            Self::Left => status.left(),
            Self::Right => status.right(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiCommand {
    /// Mount the live board with a filter; fetches and connects the task channel.
    MountBoard(TaskFilter),
    UnmountBoard,
    /// Change the live board's filter; triggers a full refetch.
    SetFilter(TaskFilter),
    /// Search term applied to the mounted boards.
    SetSearch(String),
    MoveTask { id: i64, status: TaskStatus },
    StepTask { id: i64, step: Step },
    EditTask(Task),
    /// Soft delete.
    DeleteTask(i64),

    MountTrash,
    UnmountTrash,
    RecycleTask(i64),
    /// Permanent delete from the trash.
    PurgeTask(i64),

    OpenChat(String),
    CloseChat,
    SendMessage(String),

    /// Mark a counterpart's notifications read and open the chat with them.
    OpenNotifications(String),
    RefreshNotifications,

    MountDashboard,
    UnmountDashboard,
}
