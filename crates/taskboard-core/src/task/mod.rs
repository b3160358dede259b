//! Local task collections: the live board and the trash board.

pub mod model;
pub mod optimistic;
pub mod ordering;
pub mod reconcile;

pub use model::{ColumnCounts, Task, TaskFilter, TaskPatch, TaskStatus};

use ordering::sort_tasks;

/// The live (non-deleted) board of one mounted view.
///
/// Holds exactly one copy per task id. Membership in a filtered view is
/// checked against the active filter whenever a task enters the collection.
#[derive(Debug, Clone)]
pub struct TaskBoard {
    tasks: Vec<Task>,
    filter: TaskFilter,
    search: String,
    epoch: u64,
    loaded: bool,
}

impl TaskBoard {
    /// Create an empty board for a view mounted at `epoch`.
    pub fn new(filter: TaskFilter, epoch: u64) -> Self {
        Self {
            tasks: Vec::new(),
            filter,
            search: String::new(),
            epoch,
            loaded: false,
        }
    }

    /// Mount generation of the owning view.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn filter(&self) -> &TaskFilter {
        &self.filter
    }

    /// Change the active filter. Returns true when it differs, in which case
    /// the caller must refetch; pushes never backfill a new filter.
    pub fn set_filter(&mut self, filter: TaskFilter) -> bool {
        if self.filter == filter {
            return false;
        }
        self.filter = filter;
        self.loaded = false;
        true
    }

    /// Whether the initial fetch for the current filter has landed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Replace the whole collection with a REST fetch result.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks.clear();
        for task in tasks.into_iter().filter(|t| !t.deleted) {
            match self.position(task.id) {
                Some(idx) => self.tasks[idx] = task,
                None => self.tasks.push(task),
            }
        }
        sort_tasks(&mut self.tasks);
        self.loaded = true;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: i64) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id)
    }

    /// Set the search term used by [`TaskBoard::visible`].
    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    /// Tasks matching the active filter and the search term, in board
    /// order. Both are re-evaluated on every call, so an update that moves a
    /// task out of the filter hides it at once.
    pub fn visible(&self) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(|t| self.filter.matches(t) && t.matches_search(&self.search))
    }

    /// Visible tasks of one column, in board order.
    pub fn column(&self, status: TaskStatus) -> Vec<&Task> {
        self.visible().filter(|t| t.status == status).collect()
    }

    /// Visible task count per column.
    pub fn counts(&self) -> ColumnCounts {
        let mut counts = ColumnCounts::default();
        for task in self.visible() {
            match task.status {
                TaskStatus::Todo => counts.todo += 1,
                TaskStatus::Doing => counts.doing += 1,
                TaskStatus::Done => counts.done += 1,
            }
        }
        counts
    }

    /// Add a pushed task if it passes the active filter. A task already
    /// present is replaced in place instead of duplicated.
    pub fn insert_if_matching(&mut self, task: Task) -> bool {
        if !self.filter.matches(&task) {
            return false;
        }
        match self.position(task.id) {
            Some(idx) => self.tasks[idx] = task,
            None => self.tasks.push(task),
        }
        sort_tasks(&mut self.tasks);
        true
    }

    /// Replace the entry with the same id. Returns false (and changes
    /// nothing) when the id is not present.
    pub fn replace(&mut self, task: Task) -> bool {
        match self.position(task.id) {
            Some(idx) => {
                self.tasks[idx] = task;
                sort_tasks(&mut self.tasks);
                true
            }
            None => false,
        }
    }

    /// Apply a partial update in place, returning the pre-patch snapshot.
    pub fn patch(&mut self, patch: &TaskPatch) -> Option<Task> {
        let idx = self.position(patch.id)?;
        let previous = self.tasks[idx].clone();
        self.tasks[idx].apply(patch);
        sort_tasks(&mut self.tasks);
        Some(previous)
    }

    pub fn remove(&mut self, id: i64) -> Option<Task> {
        let idx = self.position(id)?;
        Some(self.tasks.remove(idx))
    }
}

/// The trash board: soft-deleted tasks awaiting recycle or permanent delete.
#[derive(Debug, Clone, Default)]
pub struct DeletedBoard {
    tasks: Vec<Task>,
    search: String,
    epoch: u64,
    loaded: bool,
}

impl DeletedBoard {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            ..Default::default()
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks.clear();
        for task in tasks {
            self.add(task);
        }
        self.loaded = true;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.get(id).is_some()
    }

    pub fn set_search(&mut self, term: impl Into<String>) {
        self.search = term.into();
    }

    /// Tasks whose title contains the search term.
    pub fn visible(&self) -> impl Iterator<Item = &Task> {
        let term = self.search.to_lowercase();
        self.tasks
            .iter()
            .filter(move |t| term.is_empty() || t.title.to_lowercase().contains(&term))
    }

    /// Append a task, or replace the entry with the same id.
    pub fn add(&mut self, task: Task) {
        match self.tasks.iter().position(|t| t.id == task.id) {
            Some(idx) => self.tasks[idx] = task,
            None => self.tasks.push(task),
        }
    }

    pub fn remove(&mut self, id: i64) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn task(id: i64, status: TaskStatus, author: &str) -> Task {
        Task {
            id,
            title: format!("Task {id}"),
            description: format!("description of {id}"),
            status,
            priority: 1,
            start_date: None,
            end_date: None,
            category_type: "work".to_string(),
            username_author: author.to_string(),
            deleted: false,
        }
    }

    #[test]
    fn test_replace_all_dedupes_and_skips_deleted() {
        let mut board = TaskBoard::new(TaskFilter::default(), 1);
        let mut gone = task(3, TaskStatus::Todo, "bob");
        gone.deleted = true;
        board.replace_all(vec![
            task(1, TaskStatus::Todo, "alice"),
            task(1, TaskStatus::Doing, "alice"),
            gone,
        ]);
        assert!(board.is_loaded());
        assert_eq!(board.len(), 1);
        assert_eq!(board.get(1).unwrap().status, TaskStatus::Doing);
    }

    #[test]
    fn test_insert_respects_filter() {
        let mut board = TaskBoard::new(TaskFilter::new(Some("alice"), None), 1);
        assert!(!board.insert_if_matching(task(1, TaskStatus::Todo, "bob")));
        assert!(board.insert_if_matching(task(2, TaskStatus::Todo, "alice")));
        assert!(board.insert_if_matching(task(2, TaskStatus::Todo, "alice")));
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_replace_missing_is_dropped() {
        let mut board = TaskBoard::new(TaskFilter::default(), 1);
        assert!(!board.replace(task(9, TaskStatus::Done, "alice")));
        assert!(board.is_empty());
    }

    #[test]
    fn test_counts_follow_search() {
        let mut board = TaskBoard::new(TaskFilter::default(), 1);
        let mut report = task(1, TaskStatus::Todo, "alice");
        report.title = "Quarterly report".to_string();
        board.replace_all(vec![
            report,
            task(2, TaskStatus::Doing, "alice"),
            task(3, TaskStatus::Done, "bob"),
        ]);
        assert_eq!(board.counts(), ColumnCounts { todo: 1, doing: 1, done: 1 });
        board.set_search("REPORT");
        assert_eq!(board.counts(), ColumnCounts { todo: 1, doing: 0, done: 0 });
        assert_eq!(board.len(), 3);
    }

    #[test]
    fn test_set_filter_reports_change() {
        let mut board = TaskBoard::new(TaskFilter::default(), 1);
        board.replace_all(vec![]);
        assert!(!board.set_filter(TaskFilter::default()));
        assert!(board.is_loaded());
        assert!(board.set_filter(TaskFilter::new(None, Some("home"))));
        assert!(!board.is_loaded());
    }

    #[test]
    fn test_deleted_board_search_by_title() {
        let mut trash = DeletedBoard::new(1);
        trash.replace_all(vec![task(1, TaskStatus::Todo, "a"), task(2, TaskStatus::Todo, "b")]);
        trash.set_search("task 2");
        let ids: Vec<i64> = trash.visible().map(|t| t.id).collect();
        assert_eq!(ids, vec![2]);
    }
}
