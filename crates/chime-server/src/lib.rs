//! # chime-server
//!
//! WebSocket fan-out for progress sessions plus the HTTP surface.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-subscriber state: outbound queue, subscriptions, drop count |
//! | `manager` | [`manager::WebSocketManager`]: register/unregister, serialize-once fan-out, slow-client eviction |
//! | `protocol` | Wire messages: client requests, server replies, push events |
//! | `handler` | Request dispatch against the progress session table |
//! | `server` | Axum router: WebSocket upgrade, agent creation, health |
//!
//! ## Data Flow
//!
//! The pipeline reports through its `ProgressBroadcaster` seam, which
//! `WebSocketManager` implements: every session update is serialized once
//! and pushed to each subscriber's bounded queue. Inbound client messages
//! go through `handler` and get a direct reply on the same connection.

#![deny(unsafe_code)]

pub mod connection;
pub mod handler;
pub mod manager;
pub mod protocol;
pub mod server;

pub use connection::{SendOutcome, SubscriberConnection};
pub use manager::WebSocketManager;
pub use server::{AppState, router};
