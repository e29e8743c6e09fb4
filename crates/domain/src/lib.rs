//! Shared types for simplechat: errors, configuration, stored documents,
//! provider stream events and structured trace events.

pub mod chat;
pub mod config;
pub mod error;
pub mod model;
pub mod stream;
pub mod trace;
