//! Gateway error types and their mapping onto HTTP responses

use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while forwarding a single request.
///
/// Every variant is handled inside the request pipeline and turned into a
/// response; none of them escape a connection task.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("method {0} is not supported")]
    MethodNotSupported(String),

    #[error("path rejected: {0}")]
    PathRejected(String),

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("timed out reading request body after {0:?}")]
    RequestBodyTimeout(Duration),

    #[error("invalid upstream request: {0}")]
    RequestBuild(String),

    #[error("connection to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("upstream handshake failed: {0}")]
    Handshake(#[source] hyper::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper::Error),

    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),
}

impl GatewayError {
    /// Status code sent back to the caller for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotSupported(_) => StatusCode::NOT_IMPLEMENTED,
            Self::PathRejected(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RequestBody(_) => StatusCode::BAD_REQUEST,
            Self::RequestBodyTimeout(_)
            | Self::RequestBuild(_)
            | Self::Connect { .. }
            | Self::Handshake(_)
            | Self::Upstream(_)
            | Self::UpstreamTimeout(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the failure happened while talking to the upstream, as
    /// opposed to while reading or preparing the inbound request.
    pub fn is_upstream_failure(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Handshake(_) | Self::Upstream(_) | Self::UpstreamTimeout(_)
        )
    }

    /// Plain-text body sent back to the caller.
    pub fn body(&self) -> String {
        match self.status() {
            StatusCode::BAD_GATEWAY => format!("Bad Gateway: {}", self),
            StatusCode::NOT_IMPLEMENTED => format!("Not Implemented: {}", self),
            StatusCode::PAYLOAD_TOO_LARGE => format!("Payload Too Large: {}", self),
            _ => format!("Bad Request: {}", self),
        }
    }
}

/// Errors raised while validating the gateway configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid upstream URL {url:?}: {reason}")]
    InvalidUpstream { url: String, reason: String },

    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}
