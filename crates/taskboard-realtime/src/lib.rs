//! Realtime layer of the task board client.
//!
//! [`SyncEngine`] owns one [`ConnectionManager`] per channel and the local
//! collections they feed.

pub mod command;
pub mod connection;
pub mod endpoint;
pub mod engine;
pub mod router;

#[cfg(test)]
mod testing;

pub use command::{Step, UiCommand};
pub use connection::{ChannelEvent, ConnectionManager, Phase};
pub use endpoint::Endpoints;
pub use engine::SyncEngine;
