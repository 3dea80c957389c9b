//! # wisp-server
//!
//! HTTP/WebSocket front end for the Wisp relay. Accepts WebSocket upgrades,
//! hands each connection to a `wisp_relay::Session`, and serves the health
//! endpoints. TLS is terminated upstream.

pub mod config;
pub mod server;
pub mod telemetry;

pub use config::{Cli, ConfigError, LogFormat, ServerConfig};
