//! tether - an async client bridge for Google-Workspace-style APIs
//!
//! The remote calendar and mail services are strictly synchronous: one
//! blocking call per network round trip. This crate bridges that surface
//! into async Rust: an [`ExecutionBridge`](bridge::ExecutionBridge) worker
//! pool runs the blocking calls, fluent [`query`] builders split constraints
//! between server and client, a [`batch`] coordinator fans operations out
//! with fail-fast or collect-all semantics, and eagerly validated [`domain`]
//! entities keep invalid state from ever reaching the wire.

pub mod batch;
pub mod bridge;
pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod query;
pub mod remote;

pub use batch::{BatchCoordinator, BatchPolicy, ItemOutcome};
pub use bridge::{ExecutionBridge, TaskHandle};
pub use client::{CalendarClient, EventRef, MailClient, MessageRef};
pub use config::BridgeConfig;
pub use error::{ApiError, ApiResult};
pub use query::{EventQuery, MessageQuery};
