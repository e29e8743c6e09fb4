//! Request runtime: the send-message pipeline.
//!
//! Entry point: [`MessagePipeline::send_message`] validates and persists the
//! user turn, then returns a lazy stream of [`ChatEvent`]s that the
//! transport relays to the client. Each request carries a
//! `CancellationToken` that the transport trips on disconnect or timeout.

pub mod pipeline;

pub use pipeline::{ChatEvent, MessagePipeline, SendMessageInput};
