//! Notification domain models.

use serde::{Deserialize, Serialize};

/// A pending notification. For message notifications `content` holds the
/// username of the counterpart who wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub content: String,
    #[serde(default)]
    pub sent_at: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    /// Key of the notification map this entry belongs to.
    pub fn counterpart(&self) -> &str {
        &self.content
    }
}
