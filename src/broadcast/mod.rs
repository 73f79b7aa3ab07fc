//! # Live status broadcast
//!
//! Pushes [`StatusEvent`](crate::events::StatusEvent)s to connected browsers
//! over WebSockets.
//!
//! - [`BroadcastManager`]: client registry, batching, rate limiting, heartbeats
//! - [`ClientSocket`]: transport seam; [`ChannelSocket`] is the production one
//! - [`wire`]: compact JSON message format
//! - [`ws`]: axum handler and router

mod client;
mod manager;
pub mod wire;
pub mod ws;

pub use client::{
    ChannelSocket, ClientId, ClientInfo, ClientSocket, OutboundFrame, OutboundReceiver, SocketError,
};
pub use manager::{BroadcastManager, BroadcastStats};
pub use wire::{ClientMessage, OptimizedStatusEvent, ServerMessage};
pub use ws::status_router;
