//! RelayProxy - A single-upstream HTTP forwarding gateway
//!
//! Every inbound request is relayed to one fixed upstream origin:
//! - Method, path, query and body are preserved
//! - `Host` and `Connection` are dropped on the way in, `Connection` and
//!   `Transfer-Encoding` on the way out
//! - Security headers are set on every response
//! - Upstream failures and timeouts become `502 Bad Gateway`

pub mod body;
pub mod config;
pub mod error;
pub mod headers;
pub mod io;
pub mod proxy;

pub use config::{GatewayConfig, Upstream};
pub use error::{ConfigError, GatewayError};
pub use proxy::GatewayServer;
