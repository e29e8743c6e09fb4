//! simplechat gateway: HTTP API, send-message pipeline and server bootstrap.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
