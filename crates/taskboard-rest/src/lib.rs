//! Taskboard REST Client
//!
//! `reqwest` implementation of the [`BoardApi`] collaborator. Every request
//! carries the session token as a bearer `Authorization` header.

mod client;

pub use client::RestClient;
pub use taskboard_core::api::{ApiError, ApiResult, BoardApi};
