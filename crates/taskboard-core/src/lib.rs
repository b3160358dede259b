//! Taskboard Core Library
//!
//! Domain models, wire vocabulary and local state for the realtime task board
//! client. Nothing in this crate performs I/O.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod notification;
pub mod protocol;
pub mod session;
pub mod signal;
pub mod statistics;
pub mod task;

pub use error::{SyncError, SyncResult};
