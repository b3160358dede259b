//! Board ordering: priority descending, then start date descending, then end
//! date descending. A missing date sorts after any present date.

use std::cmp::Ordering;

use chrono::NaiveDate;

use super::model::Task;

/// Compare two tasks in board order.
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| compare_dates_desc(a.start_date, b.start_date))
        .then_with(|| compare_dates_desc(a.end_date, b.end_date))
}

fn compare_dates_desc(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable sort into board order.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}
