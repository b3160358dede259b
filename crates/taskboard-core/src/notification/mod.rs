//! Pending notifications grouped by counterpart.

pub mod model;

pub use model::Notification;

use std::collections::BTreeMap;

/// Mapping from counterpart to its pending notifications, oldest first.
///
/// An entry is cleared only after the server confirmed a mark-as-read
/// round trip ([`NotificationMap::confirm_read`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationMap {
    entries: BTreeMap<String, Vec<Notification>>,
}

impl NotificationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with a REST snapshot.
    pub fn replace_all(&mut self, entries: BTreeMap<String, Vec<Notification>>) {
        self.entries = entries
            .into_iter()
            .filter(|(_, list)| !list.is_empty())
            .collect();
    }

    /// Append a pushed notification under its counterpart. A notification
    /// whose id is already pending is not added twice.
    pub fn push(&mut self, notification: Notification) -> bool {
        let list = self
            .entries
            .entry(notification.counterpart().to_string())
            .or_default();
        if list.iter().any(|n| n.id == notification.id) {
            return false;
        }
        list.push(notification);
        true
    }

    pub fn pending(&self, counterpart: &str) -> &[Notification] {
        self.entries
            .get(counterpart)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn count_for(&self, counterpart: &str) -> usize {
        self.pending(counterpart).len()
    }

    /// Total number of pending notifications.
    pub fn total(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Counterparts with pending notifications and the most recent one.
    pub fn summary(&self) -> Vec<(&str, usize, Option<&Notification>)> {
        self.entries
            .iter()
            .map(|(who, list)| (who.as_str(), list.len(), list.last()))
            .collect()
    }

    /// Drop a counterpart's entries after the server confirmed them read.
    pub fn confirm_read(&mut self, counterpart: &str) -> usize {
        self.entries
            .remove(counterpart)
            .map(|list| list.len())
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(id: i64, from: &str) -> Notification {
        Notification {
            id,
            content: from.to_string(),
            sent_at: Some("2024-01-01T10:00:00".to_string()),
            photo_url: None,
            read: false,
        }
    }

    #[test]
    fn test_push_groups_by_counterpart() {
        let mut map = NotificationMap::new();
        map.push(notification(1, "bob"));
        map.push(notification(2, "bob"));
        map.push(notification(3, "carol"));
        assert!(!map.push(notification(2, "bob")));
        assert_eq!(map.count_for("bob"), 2);
        assert_eq!(map.total(), 3);
        let summary = map.summary();
        assert_eq!(summary[0].0, "bob");
        assert_eq!(summary[0].2.unwrap().id, 2);
    }

    #[test]
    fn test_confirm_read_clears_one_counterpart() {
        let mut map = NotificationMap::new();
        map.push(notification(1, "bob"));
        map.push(notification(2, "carol"));
        assert_eq!(map.confirm_read("bob"), 1);
        assert_eq!(map.count_for("bob"), 0);
        assert_eq!(map.total(), 1);
        assert_eq!(map.confirm_read("nobody"), 0);
    }
}
