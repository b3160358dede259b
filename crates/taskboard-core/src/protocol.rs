//! WebSocket wire vocabulary.
//!
//! Every frame is a JSON object `{ "type": ..., "data": ... }`. Each channel
//! accepts a closed set of inbound types, decoded here into a typed enum.
//! Types outside the set decode to [`Decoded::Unknown`] so that servers can
//! add new frame types without breaking older clients.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::model::{Message, OutgoingMessage};
use crate::notification::model::Notification;
use crate::statistics::{CategoryStatistic, TaskStatistics, UserStatistics};
use crate::task::model::Task;

/// Frame type the server may push on any channel to end the session.
pub const FORCED_LOGOUT: &str = "forcedLogout";

/// One logical realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Task,
    Chat,
    Notification,
    Global,
    Dashboard,
}

impl ChannelKind {
    /// URL path segment of the channel endpoint.
    pub fn path(self) -> &'static str {
        match self {
            Self::Task => "taskws",
            Self::Chat => "chat",
            Self::Notification => "notification",
            Self::Global => "global",
            Self::Dashboard => "dashboard",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Chat => "chat",
            Self::Notification => "notification",
            Self::Global => "global",
            Self::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of decoding one frame against a channel vocabulary.
#[derive(Debug)]
pub enum Decoded<T> {
    Event(T),
    /// The type is not part of this channel's vocabulary.
    Unknown,
    /// The type is known but `data` has the wrong shape.
    Invalid(serde_json::Error),
}

impl<T> Decoded<T> {
    fn from_data<D, F>(data: Value, wrap: F) -> Self
    where
        D: DeserializeOwned,
        F: FnOnce(D) -> T,
    {
        match serde_json::from_value::<D>(data) {
            Ok(value) => Self::Event(wrap(value)),
            Err(e) => Self::Invalid(e),
        }
    }
}

/// The closed frame vocabulary of one channel.
pub trait Vocabulary: Sized + Send + 'static {
    /// Outbound command type accepted by the channel.
    type Command: Serialize + Send + fmt::Debug;

    const CHANNEL: ChannelKind;

    /// Decode the `data` of a frame whose discriminator is `kind`.
    fn decode(kind: &str, data: Value) -> Decoded<Self>;
}

/// Command type of channels that never send anything.
#[derive(Debug, Clone, Serialize)]
pub enum NoCommand {}

/// Inbound frames of the task channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// `updatedTask`; the `deleted` flag selects the merge rule.
    Updated(Task),
    /// `createTask`
    Created(Task),
    /// `deletedTaskPermanentely` (the server's spelling)
    DeletedPermanently(Task),
    /// `recycleTask`
    Recycled(Task),
}

impl TaskEvent {
    pub fn task(&self) -> &Task {
        match self {
            Self::Updated(t) | Self::Created(t) | Self::DeletedPermanently(t) | Self::Recycled(t) => t,
        }
    }
}

impl Vocabulary for TaskEvent {
    type Command = NoCommand;
    const CHANNEL: ChannelKind = ChannelKind::Task;

    fn decode(kind: &str, data: Value) -> Decoded<Self> {
        match kind {
            "updatedTask" => Decoded::from_data(data, Self::Updated),
            "createTask" => Decoded::from_data(data, Self::Created),
            "deletedTaskPermanentely" | "deletedTaskPermanently" => {
                Decoded::from_data(data, Self::DeletedPermanently)
            }
            "recycleTask" => Decoded::from_data(data, Self::Recycled),
            _ => Decoded::Unknown,
        }
    }
}

/// Inbound frames of the chat channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// `receivedMessage`
    Received(Message),
    /// `markedAsReadMessages`: ids confirmed as read by the server.
    MarkedAsRead(Vec<i64>),
}

/// Entries of a `markedAsReadMessages` batch: either bare ids or message
/// objects carrying one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageRef {
    Id(i64),
    Entity { id: i64 },
}

impl MessageRef {
    fn id(&self) -> i64 {
        match self {
            Self::Id(id) | Self::Entity { id } => *id,
        }
    }
}

impl Vocabulary for ChatEvent {
    type Command = ChatCommand;
    const CHANNEL: ChannelKind = ChannelKind::Chat;

    fn decode(kind: &str, data: Value) -> Decoded<Self> {
        match kind {
            "receivedMessage" => Decoded::from_data(data, Self::Received),
            "markedAsReadMessages" => Decoded::from_data(data, |refs: Vec<MessageRef>| {
                Self::MarkedAsRead(refs.iter().map(MessageRef::id).collect())
            }),
            _ => Decoded::Unknown,
        }
    }
}

/// Outbound commands of the chat channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatCommand {
    #[serde(rename = "sendMessage")]
    SendMessage(OutgoingMessage),
    #[serde(rename = "markAsRead")]
    MarkAsRead(Vec<i64>),
}

/// Inbound frames of the notification channel.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    /// `receivedNotification`
    Received(Notification),
}

impl Vocabulary for NotificationEvent {
    type Command = NoCommand;
    const CHANNEL: ChannelKind = ChannelKind::Notification;

    fn decode(kind: &str, data: Value) -> Decoded<Self> {
        match kind {
            "receivedNotification" => Decoded::from_data(data, Self::Received),
            _ => Decoded::Unknown,
        }
    }
}

/// Inbound frames of the global channel. `forcedLogout` is not listed: the
/// router intercepts it on every channel before vocabulary decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum GlobalEvent {
    /// `receivedNotification`
    Notification(Notification),
}

impl Vocabulary for GlobalEvent {
    type Command = NoCommand;
    const CHANNEL: ChannelKind = ChannelKind::Global;

    fn decode(kind: &str, data: Value) -> Decoded<Self> {
        match kind {
            "receivedNotification" => Decoded::from_data(data, Self::Notification),
            _ => Decoded::Unknown,
        }
    }
}

/// Inbound frames of the dashboard channel. Each one is a full snapshot of
/// its slice.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    /// `userStatistics`
    Users(UserStatistics),
    /// `taskStatistics`
    Tasks(TaskStatistics),
    /// `categoryStatistics`
    Categories(Vec<CategoryStatistic>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryPayload {
    Wrapped { categories: Vec<CategoryStatistic> },
    Bare(Vec<CategoryStatistic>),
}

impl Vocabulary for DashboardEvent {
    type Command = NoCommand;
    const CHANNEL: ChannelKind = ChannelKind::Dashboard;

    fn decode(kind: &str, data: Value) -> Decoded<Self> {
        match kind {
            "userStatistics" => Decoded::from_data(data, Self::Users),
            "taskStatistics" => Decoded::from_data(data, Self::Tasks),
            "categoryStatistics" => Decoded::from_data(data, |payload: CategoryPayload| match payload {
                CategoryPayload::Wrapped { categories } | CategoryPayload::Bare(categories) => {
                    Self::Categories(categories)
                }
            }),
            _ => Decoded::Unknown,
        }
    }
}
