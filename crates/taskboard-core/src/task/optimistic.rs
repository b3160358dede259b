//! Optimistic mutations of the live board.
//!
//! A mutation is applied locally first, then sent to the REST collaborator.
//! Moves and edits keep the pre-patch snapshot and restore it if the server
//! rejects the change. Deletes keep no snapshot: a failed delete is reported
//! but not undone.

use std::collections::HashMap;

use crate::error::{SyncError, SyncResult};

use super::model::{Task, TaskPatch, TaskStatus};
use super::TaskBoard;

/// Identifier of one in-flight mutation.
pub type MutationId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Move,
    Edit,
    Delete,
}

/// Handle returned when a mutation is applied locally. The patch is what
/// must be sent to the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: MutationId,
    pub kind: MutationKind,
    pub patch: TaskPatch,
}

#[derive(Debug, Clone)]
struct PendingMutation {
    kind: MutationKind,
    task_id: i64,
    title: String,
    epoch: u64,
    previous: Option<Task>,
}

/// Result of settling a mutation with the server's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The server accepted the change. Nothing to do locally; the pushed
    /// `updatedTask` will merge idempotently.
    Committed {
        kind: MutationKind,
        task_id: i64,
        title: String,
    },
    /// The server rejected a move or edit; the snapshot was restored.
    RolledBack { task_id: i64, title: String },
    /// The server rejected a delete. The task stays removed locally.
    DeleteFailed { task_id: i64, title: String },
    /// The view that started the mutation is gone; the answer is dropped.
    Stale { task_id: i64 },
    /// No mutation with this id is pending.
    Unknown,
}

/// Tracks in-flight optimistic mutations and their rollback snapshots.
#[derive(Debug, Default)]
pub struct Coordinator {
    next_id: MutationId,
    pending: HashMap<MutationId, PendingMutation>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutations waiting for the server.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn track(&mut self, pending: PendingMutation, patch: TaskPatch) -> Ticket {
        self.next_id += 1;
        let ticket = Ticket {
            id: self.next_id,
            kind: pending.kind,
            patch,
        };
        self.pending.insert(ticket.id, pending);
        ticket
    }

    /// Move a task to `status`. Moving to the column it is already in is
    /// still sent; the server treats it idempotently.
    pub fn begin_move(
        &mut self,
        board: &mut TaskBoard,
        task_id: i64,
        status: TaskStatus,
    ) -> SyncResult<Ticket> {
        let patch = TaskPatch::status(task_id, status);
        self.begin_patch(board, MutationKind::Move, patch)
    }

    /// Replace a task's editable fields with those of `edited`.
    pub fn begin_edit(&mut self, board: &mut TaskBoard, edited: &Task) -> SyncResult<Ticket> {
        let patch = TaskPatch::from_task(edited);
        self.begin_patch(board, MutationKind::Edit, patch)
    }

    fn begin_patch(
        &mut self,
        board: &mut TaskBoard,
        kind: MutationKind,
        patch: TaskPatch,
    ) -> SyncResult<Ticket> {
        let previous = board
            .patch(&patch)
            .ok_or(SyncError::TaskNotFound(patch.id))?;
        let pending = PendingMutation {
            kind,
            task_id: patch.id,
            title: previous.title.clone(),
            epoch: board.epoch(),
            previous: Some(previous),
        };
        Ok(self.track(pending, patch))
    }

    /// Soft-delete a task: it leaves the live board immediately.
    pub fn begin_delete(&mut self, board: &mut TaskBoard, task_id: i64) -> SyncResult<Ticket> {
        let removed = board
            .remove(task_id)
            .ok_or(SyncError::TaskNotFound(task_id))?;
        let pending = PendingMutation {
            kind: MutationKind::Delete,
            task_id,
            title: removed.title,
            epoch: board.epoch(),
            previous: None,
        };
        Ok(self.track(pending, TaskPatch::deleted(task_id, true)))
    }

    /// Settle a mutation with the server's answer. `board` is the live board
    /// currently mounted, if any.
    pub fn settle(
        &mut self,
        board: Option<&mut TaskBoard>,
        id: MutationId,
        succeeded: bool,
    ) -> Settlement {
        let Some(pending) = self.pending.remove(&id) else {
            return Settlement::Unknown;
        };
        let task_id = pending.task_id;
        let board = match board {
            Some(board) if board.epoch() == pending.epoch => board,
            _ => return Settlement::Stale { task_id },
        };

        if succeeded {
            return Settlement::Committed {
                kind: pending.kind,
                task_id,
                title: pending.title,
            };
        }

        match pending.previous {
            Some(previous) => {
                // Restore at the same identity only; if a push removed the
                // task meanwhile there is nothing to restore into.
                if board.contains(task_id) {
                    board.replace(previous);
                }
                Settlement::RolledBack {
                    task_id,
                    title: pending.title,
                }
            }
            None => Settlement::DeleteFailed {
                task_id,
                title: pending.title,
            },
        }
    }

    /// Forget every pending mutation.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
