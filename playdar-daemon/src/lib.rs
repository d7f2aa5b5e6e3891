//! # Playdar Daemon
//!
//! HTTP-facing half of Playdar: turns the in-process resolution engine
//! ([`playdar_resolver`]) into the wire protocol spec.md §6 describes —
//! the `/queries`, `/sid/<sid>`, `/comet` and `/quickplay` routes, the
//! localhost-or-bearer-token auth gate, and the streaming bridge that turns
//! a [`playdar_resolver::StreamingStrategy`] into a chunked HTTP response
//! body.
//!
//! Module layout mirrors the teacher gateway's (`server.rs` assembles the
//! router, `handlers/` holds the route bodies, `gateway_error.rs` is the
//! HTTP-facing error type, `config.rs` loads and validates the daemon's
//! configuration file).

pub mod auth;
pub mod comet;
pub mod config;
pub mod gateway_error;
pub mod handlers;
pub mod server;
pub mod streaming_bridge;

pub use auth::{InMemoryTokenStore, SharedTokenStore, TokenStore};
pub use config::Config;
pub use gateway_error::GatewayError;
pub use server::{create_server, AppState};
