//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! - `PORT`: TCP port for HTTP and WebSocket traffic. Default: `8080`
//! - `WISP_BIND_ADDR`: Interface to bind. Default: `0.0.0.0`
//! - `WISP_SWEEP_INTERVAL_SECS`: Seconds between liveness sweeps. Default: `30`
//! - `WISP_OUTBOUND_CAPACITY`: Per-connection outbound queue size. Default: `256`
//! - `WISP_MAX_FRAME_BYTES`: Largest accepted WebSocket message. Default: `65536`
//! - `WISP_CORS_ORIGINS`: Comma-separated allowed origins. Default: permissive
//! - `WISP_LOG_FORMAT`: `pretty` or `json`. Default: `pretty`
//!
//! Command-line flags (see [`Cli`]) override the environment.
//!
//! # Examples
//!
//! ```bash
//! PORT=9000 WISP_SWEEP_INTERVAL_SECS=10 cargo run -p wisp-server
//! cargo run -p wisp-server -- --port 9000
//! ```

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::info;
use wisp_relay::RelayConfig;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Raw value
        value: String,
        /// What was expected
        reason: &'static str,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Command-line overrides.
#[derive(Debug, Default, Parser)]
#[command(name = "wisp-server", version, about = "Wallet-addressed WebSocket message relay")]
pub struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides WISP_BIND_ADDR)
    #[arg(long)]
    pub bind: Option<IpAddr>,

    /// Seconds between liveness sweeps (overrides WISP_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub bind_addr: IpAddr,
    /// Port to bind
    pub port: u16,
    /// Interval between liveness sweeps
    pub sweep_interval: Duration,
    /// Per-connection outbound queue size
    pub outbound_capacity: usize,
    /// Largest accepted WebSocket message in bytes
    pub max_frame_bytes: usize,
    /// Allowed CORS origins; empty means permissive
    pub cors_origins: Vec<String>,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            sweep_interval: Duration::from_secs(30),
            outbound_capacity: 256,
            max_frame_bytes: 64 * 1024,
            cors_origins: Vec::new(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(v) => parse(&v, "PORT", "expected a port number")?,
            None => defaults.port,
        };

        let bind_addr = match var("WISP_BIND_ADDR") {
            Some(v) => parse(&v, "WISP_BIND_ADDR", "expected an IP address")?,
            None => defaults.bind_addr,
        };

        let sweep_interval = match var("WISP_SWEEP_INTERVAL_SECS") {
            Some(v) => {
                let secs: u64 = parse(&v, "WISP_SWEEP_INTERVAL_SECS", "expected whole seconds")?;
                positive(secs, &v, "WISP_SWEEP_INTERVAL_SECS")?;
                Duration::from_secs(secs)
            }
            None => defaults.sweep_interval,
        };

        let outbound_capacity = match var("WISP_OUTBOUND_CAPACITY") {
            Some(v) => {
                let n: usize = parse(&v, "WISP_OUTBOUND_CAPACITY", "expected a queue size")?;
                positive(n as u64, &v, "WISP_OUTBOUND_CAPACITY")?;
                n
            }
            None => defaults.outbound_capacity,
        };

        let max_frame_bytes = match var("WISP_MAX_FRAME_BYTES") {
            Some(v) => {
                let n: usize = parse(&v, "WISP_MAX_FRAME_BYTES", "expected a byte count")?;
                positive(n as u64, &v, "WISP_MAX_FRAME_BYTES")?;
                n
            }
            None => defaults.max_frame_bytes,
        };

        let cors_origins = var("WISP_CORS_ORIGINS")
            .map(|v| {
                v.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let log_format = match var("WISP_LOG_FORMAT").as_deref().map(str::to_lowercase) {
            None => defaults.log_format,
            Some(v) if v == "pretty" => LogFormat::Pretty,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => {
                return Err(ConfigError::InvalidValue {
                    name: "WISP_LOG_FORMAT",
                    value: v,
                    reason: "expected pretty or json",
                })
            }
        };

        Ok(Self {
            bind_addr,
            port,
            sweep_interval,
            outbound_capacity,
            max_frame_bytes,
            cors_origins,
            log_format,
        })
    }

    /// Apply command-line overrides.
    pub fn with_cli(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(bind) = cli.bind {
            self.bind_addr = bind;
        }
        if let Some(secs) = cli.sweep_interval_secs {
            positive(secs, &secs.to_string(), "--sweep-interval-secs")?;
            self.sweep_interval = Duration::from_secs(secs);
        }
        Ok(self)
    }

    /// Socket address to listen on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Relay core settings derived from this configuration.
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig::default()
            .with_sweep_interval(self.sweep_interval)
            .with_outbound_capacity(self.outbound_capacity)
    }

    /// Log the current server configuration.
    pub fn log_config(&self) {
        info!("Listening address: {}", self.socket_addr());
        info!("Sweep interval: {}s", self.sweep_interval.as_secs());
        info!("Outbound queue capacity: {}", self.outbound_capacity);
        info!("Max frame size: {} bytes", self.max_frame_bytes);
        if self.cors_origins.is_empty() {
            info!("CORS: permissive");
        } else {
            info!("CORS origins: {}", self.cors_origins.join(", "));
        }
    }
}

fn parse<T: std::str::FromStr>(
    value: &str,
    name: &'static str,
    reason: &'static str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason,
    })
}

fn positive(n: u64, raw: &str, name: &'static str) -> Result<(), ConfigError> {
    if n == 0 {
        return Err(ConfigError::InvalidValue {
            name,
            value: raw.to_string(),
            reason: "must be greater than zero",
        });
    }
    Ok(())
}
