//! Dashboard statistics snapshots.
//!
//! Every pushed slice replaces the previous one wholesale; there is no merge.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::DashboardEvent;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStatistics {
    pub total_users: i64,
    pub confirmed_users: i64,
    pub unconfirmed_users: i64,
    pub average_tasks_per_user: f64,
    /// Confirmed registrations keyed by `YYYY-MM`.
    pub users_per_month: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStatistics {
    #[serde(rename = "numberOfTODO")]
    pub number_of_todo: i64,
    #[serde(rename = "numberOfDOING")]
    pub number_of_doing: i64,
    #[serde(rename = "numberOfDONE")]
    pub number_of_done: i64,
    #[serde(rename = "averageCompletionTime")]
    pub average_completion_time: f64,
    /// Completed tasks keyed by ISO week (`YYYY-Www`).
    #[serde(rename = "tasksPerWeek")]
    pub tasks_per_week: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatistic {
    #[serde(rename = "type")]
    pub category_type: String,
    #[serde(default)]
    pub task_count: i64,
}

/// REST snapshot of all dashboard slices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatisticsSnapshot {
    pub users_statistics: UserStatistics,
    pub tasks_statistics: TaskStatistics,
    pub category_statistics: CategorySlice,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategorySlice {
    pub categories: Vec<CategoryStatistic>,
}

/// Aggregate dashboard state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DashboardStatistics {
    pub users: UserStatistics,
    pub tasks: TaskStatistics,
    pub categories: Vec<CategoryStatistic>,
}

impl DashboardStatistics {
    /// Replace every slice from a REST snapshot.
    pub fn load(&mut self, snapshot: StatisticsSnapshot) {
        self.users = snapshot.users_statistics;
        self.tasks = snapshot.tasks_statistics;
        self.categories = snapshot.category_statistics.categories;
    }

    /// Replace the slice carried by a pushed frame (last write wins).
    pub fn apply(&mut self, event: DashboardEvent) {
        match event {
            DashboardEvent::Users(users) => self.users = users,
            DashboardEvent::Tasks(tasks) => self.tasks = tasks,
            DashboardEvent::Categories(categories) => self.categories = categories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_are_replaced_wholesale() {
        let mut stats = DashboardStatistics::default();
        stats.apply(DashboardEvent::Categories(vec![
            CategoryStatistic { category_type: "work".into(), task_count: 3 },
            CategoryStatistic { category_type: "home".into(), task_count: 1 },
        ]));
        stats.apply(DashboardEvent::Categories(vec![CategoryStatistic {
            category_type: "work".into(),
            task_count: 4,
        }]));
        assert_eq!(stats.categories.len(), 1);
        assert_eq!(stats.categories[0].task_count, 4);
    }

    #[test]
    fn test_decode_task_statistics() {
        let json = r#"{"numberOfTODO": 2, "numberOfDOING": 1, "numberOfDONE": 5,
                       "averageCompletionTime": 1.5, "tasksPerWeek": {"2024-W01": 3}}"#;
        let tasks: TaskStatistics = serde_json::from_str(json).unwrap();
        assert_eq!(tasks.number_of_done, 5);
        assert_eq!(tasks.tasks_per_week.get("2024-W01"), Some(&3));
    }
}
