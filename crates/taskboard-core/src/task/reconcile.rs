//! Merge rules for server-pushed task frames.
//!
//! Every rule keys on the task id, so replaying a frame leaves the
//! collections exactly as a single application did. A task is in the live
//! board or in the trash board, never both.

use crate::protocol::TaskEvent;

use super::{DeletedBoard, TaskBoard};

/// What a merge did to one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Inserted,
    Replaced,
    Removed,
    /// The frame did not concern this collection, or was filtered out.
    Unchanged,
}

/// Per-collection outcome of one merge, used for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub live: Change,
    pub trash: Change,
}

impl MergeReport {
    fn new(live: Change, trash: Change) -> Self {
        Self { live, trash }
    }
}

/// Merge one pushed task frame into whichever collections are mounted.
pub fn apply_task_event(
    live: Option<&mut TaskBoard>,
    trash: Option<&mut DeletedBoard>,
    event: TaskEvent,
) -> MergeReport {
    match event {
        TaskEvent::Created(task) => {
            let live = live.map_or(Change::Unchanged, |board| insert(board, task));
            MergeReport::new(live, Change::Unchanged)
        }
        TaskEvent::Updated(task) if !task.deleted => {
            // An update for an id we never fetched is dropped: the initial
            // fetch is the source of truth for population.
            let live = live.map_or(Change::Unchanged, |board| {
                if board.replace(task) {
                    Change::Replaced
                } else {
                    Change::Unchanged
                }
            });
            MergeReport::new(live, Change::Unchanged)
        }
        TaskEvent::Updated(task) => {
            let live = live.map_or(Change::Unchanged, |board| remove(board.remove(task.id)));
            let trash = trash.map_or(Change::Unchanged, |trash| {
                let existed = trash.contains(task.id);
                trash.add(task);
                if existed {
                    Change::Replaced
                } else {
                    Change::Inserted
                }
            });
            MergeReport::new(live, trash)
        }
        TaskEvent::DeletedPermanently(task) => {
            let trash = trash.map_or(Change::Unchanged, |trash| remove(trash.remove(task.id)));
            MergeReport::new(Change::Unchanged, trash)
        }
        TaskEvent::Recycled(mut task) => {
            task.deleted = false;
            let trash = trash.map_or(Change::Unchanged, |trash| remove(trash.remove(task.id)));
            let live = live.map_or(Change::Unchanged, |board| insert(board, task));
            MergeReport::new(live, trash)
        }
    }
}

fn insert(board: &mut TaskBoard, task: super::Task) -> Change {
    let existed = board.contains(task.id);
    match (board.insert_if_matching(task), existed) {
        (true, true) => Change::Replaced,
        (true, false) => Change::Inserted,
        (false, _) => Change::Unchanged,
    }
}

fn remove(removed: Option<super::Task>) -> Change {
    if removed.is_some() {
        Change::Removed
    } else {
        Change::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::tests::task;
    use crate::task::{TaskFilter, TaskStatus};

    fn loaded_board(filter: TaskFilter) -> TaskBoard {
        let mut board = TaskBoard::new(filter, 1);
        board.replace_all(vec![
            task(1, TaskStatus::Todo, "alice"),
            task(2, TaskStatus::Doing, "bob"),
        ]);
        board
    }

    #[test]
    fn test_updated_task_is_idempotent() {
        let mut board = loaded_board(TaskFilter::default());
        let mut update = task(2, TaskStatus::Done, "bob");
        update.title = "renamed".to_string();

        apply_task_event(Some(&mut board), None, TaskEvent::Updated(update.clone()));
        let once = board.tasks().to_vec();
        for _ in 0..3 {
            apply_task_event(Some(&mut board), None, TaskEvent::Updated(update.clone()));
        }
        assert_eq!(board.tasks(), once.as_slice());
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn test_created_task_is_filter_gated() {
        let mut board = loaded_board(TaskFilter::new(Some("alice"), None));
        let report = apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Created(task(10, TaskStatus::Todo, "bob")),
        );
        assert_eq!(report.live, Change::Unchanged);
        assert!(!board.contains(10));

        let report = apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Created(task(11, TaskStatus::Todo, "alice")),
        );
        assert_eq!(report.live, Change::Inserted);
        apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Created(task(11, TaskStatus::Todo, "alice")),
        );
        assert_eq!(board.tasks().iter().filter(|t| t.id == 11).count(), 1);
    }

    #[test]
    fn test_update_leaving_filter_hides_task() {
        let mut board = loaded_board(TaskFilter::new(Some("alice"), None));
        let ids = |board: &TaskBoard| board.visible().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(&board), vec![1]);

        let report = apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Updated(task(1, TaskStatus::Todo, "bob")),
        );
        assert_eq!(report.live, Change::Replaced);
        assert!(ids(&board).is_empty());
        assert_eq!(board.counts().todo, 0);
        assert!(board.column(TaskStatus::Todo).is_empty());

        apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Updated(task(1, TaskStatus::Doing, "alice")),
        );
        assert_eq!(ids(&board), vec![1]);
        assert_eq!(board.counts().doing, 1);
    }

    #[test]
    fn test_update_for_unknown_id_is_dropped() {
        let mut board = loaded_board(TaskFilter::default());
        let report = apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Updated(task(99, TaskStatus::Todo, "alice")),
        );
        assert_eq!(report.live, Change::Unchanged);
        assert!(!board.contains(99));
    }

    #[test]
    fn test_soft_delete_moves_to_trash() {
        let mut board = loaded_board(TaskFilter::default());
        let mut trash = DeletedBoard::new(1);
        let mut deleted = task(1, TaskStatus::Todo, "alice");
        deleted.deleted = true;

        let report = apply_task_event(Some(&mut board), Some(&mut trash), TaskEvent::Updated(deleted.clone()));
        assert_eq!(report, MergeReport::new(Change::Removed, Change::Inserted));
        assert!(!board.contains(1));
        assert!(trash.contains(1));

        let report = apply_task_event(Some(&mut board), Some(&mut trash), TaskEvent::Updated(deleted));
        assert_eq!(report, MergeReport::new(Change::Unchanged, Change::Replaced));
        assert_eq!(trash.len(), 1);
    }

    #[test]
    fn test_recycle_returns_task_to_board() {
        let mut board = loaded_board(TaskFilter::default());
        let mut trash = DeletedBoard::new(1);
        let mut gone = task(7, TaskStatus::Doing, "carol");
        gone.deleted = true;
        trash.add(gone.clone());

        let report = apply_task_event(Some(&mut board), Some(&mut trash), TaskEvent::Recycled(gone));
        assert_eq!(report, MergeReport::new(Change::Inserted, Change::Removed));
        assert!(!trash.contains(7));
        assert!(!board.get(7).unwrap().deleted);
    }

    #[test]
    fn test_recycle_respects_filter() {
        let mut board = loaded_board(TaskFilter::new(None, Some("home")));
        let report = apply_task_event(
            Some(&mut board),
            None,
            TaskEvent::Recycled(task(7, TaskStatus::Doing, "carol")),
        );
        assert_eq!(report.live, Change::Unchanged);
    }

    #[test]
    fn test_permanent_delete_only_touches_trash() {
        let mut board = loaded_board(TaskFilter::default());
        let mut trash = DeletedBoard::new(1);
        trash.add(task(1, TaskStatus::Todo, "alice"));
        apply_task_event(
            Some(&mut board),
            Some(&mut trash),
            TaskEvent::DeletedPermanently(task(1, TaskStatus::Todo, "alice")),
        );
        assert!(trash.is_empty());
        assert!(board.contains(1));
    }
}
