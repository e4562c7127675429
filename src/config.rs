//! Gateway configuration
//! Holds the listener address and the single fixed upstream origin

use crate::error::ConfigError;
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

/// Default inbound listener.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8090";

/// Default upstream origin.
pub const DEFAULT_UPSTREAM: &str = "http://127.0.0.1:4000";

/// Default ceiling for every blocking network step.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default request body ceiling (64 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// The fixed upstream origin every request is forwarded to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    host: String,
    port: u16,
    origin: String,
    host_header: String,
}

impl Upstream {
    /// Parse and validate an upstream origin such as `http://127.0.0.1:4000`.
    ///
    /// Only plain `http` origins are accepted, without path, query or fragment.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidUpstream {
            url: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| invalid(&e.to_string()))?;

        if url.scheme() != "http" {
            return Err(invalid("only http upstreams are supported"));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(invalid("credentials are not allowed"));
        }
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(invalid("must be a bare origin without path, query or fragment"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();
        let port = url.port_or_known_default().unwrap_or(80);

        let host_header = match url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.clone(),
        };
        let origin = format!("http://{}", host_header);

        Ok(Self {
            host,
            port,
            origin,
            host_header,
        })
    }

    /// Address handed to `TcpStream::connect`.
    pub fn connect_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Value of the `Host` header sent upstream.
    pub fn host_header(&self) -> &str {
        &self.host_header
    }

    /// Origin without trailing slash, e.g. `http://127.0.0.1:4000`.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Full upstream URL for an inbound path and query, used for logging.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.origin, path_and_query)
    }
}

/// Gateway configuration, fixed at process start
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub upstream: Upstream,
    pub timeout: Duration,
    pub max_body_bytes: usize,
    pub reject_traversal: bool,
}

impl GatewayConfig {
    /// Build a configuration for the given listener and upstream origin,
    /// using default limits.
    pub fn new(listen_addr: SocketAddr, upstream: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr,
            upstream: Upstream::parse(upstream)?,
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            reject_traversal: false,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.timeout = timeout;
        Ok(self)
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn with_reject_traversal(mut self, reject: bool) -> Self {
        self.reject_traversal = reject;
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
            upstream: Upstream {
                host: "127.0.0.1".to_string(),
                port: 4000,
                origin: DEFAULT_UPSTREAM.to_string(),
                host_header: "127.0.0.1:4000".to_string(),
            },
            timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            reject_traversal: false,
        }
    }
}
