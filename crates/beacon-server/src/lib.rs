//! # beacon-server
//!
//! The HTTP surface of the Beacon sync server:
//!
//! - [`server::SyncServer`]: axum router + listener with graceful shutdown
//! - [`routes`]: the read/write endpoints and their wire types
//! - [`auth`]: bearer-token authorization for write endpoints
//! - [`sse`]: the live fanout registry for `/api/events`
//! - [`maintenance`]: cancellable trim / flush / backup interval tasks
//! - [`shutdown`]: shutdown coordination and signal handling

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod maintenance;
pub mod routes;
pub mod server;
pub mod shutdown;
pub mod sse;

pub use config::ServerConfig;
pub use server::SyncServer;
pub use shutdown::ShutdownCoordinator;
pub use sse::SseRegistry;
