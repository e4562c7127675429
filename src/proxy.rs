//! Forwarding gateway
//! Relays every inbound request to the fixed upstream origin and streams the
//! reply back with filtered headers and the security headers applied

use crate::body::{full_body, BoxError, IdleTimeoutBody, ProxyBody};
use crate::config::{GatewayConfig, Upstream};
use crate::error::GatewayError;
use crate::headers::{
    apply_security_headers, filter_headers, BODYLESS_DENY_LIST, REQUEST_DENY_LIST,
    RESPONSE_DENY_LIST,
};
use crate::io::WriteTimeoutIo;
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE, HOST};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode, Uri, Version};
use hyper_util::rt::{TokioIo, TokioTimer};
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Methods the gateway forwards.
const SUPPORTED_METHODS: [Method; 4] = [Method::GET, Method::POST, Method::PUT, Method::DELETE];

/// Gateway server
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    /// Create a new gateway server
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run_until<F>(self: Arc<Self>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        self.serve_until(listener, shutdown).await
    }

    /// Accept connections on an already bound listener until `shutdown`
    /// resolves. Connections already accepted keep running on their own tasks.
    pub async fn serve_until<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!(
            "Gateway listening on {}, forwarding to {}",
            local_addr,
            self.config.upstream.origin()
        );

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            continue;
                        }
                    };
                    let config = self.config.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_connection(stream, remote_addr, config).await {
                            debug!("Connection from {} closed with error: {}", remote_addr, e);
                        }
                    });
                }
            }
        }
    }

    /// Handle a single inbound connection
    async fn handle_connection(
        stream: TcpStream,
        remote_addr: SocketAddr,
        config: Arc<GatewayConfig>,
    ) -> Result<()> {
        let _ = stream.set_nodelay(true);
        let io = TokioIo::new(WriteTimeoutIo::new(stream, config.timeout));

        http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(config.timeout)
            .serve_connection(
                io,
                service_fn(move |req| {
                    let cfg = config.clone();
                    async move { Self::handle_request(req, remote_addr, cfg).await }
                }),
            )
            .await
            .map_err(|e| anyhow!("HTTP service error: {}", e))
    }

    /// Handle incoming request, always producing exactly one response
    async fn handle_request(
        req: Request<Incoming>,
        remote_addr: SocketAddr,
        config: Arc<GatewayConfig>,
    ) -> Result<Response<ProxyBody>, Infallible> {
        let request_id = Uuid::new_v4();
        let span = info_span!("request", id = %request_id);

        async move {
            let started = Instant::now();
            let method = req.method().clone();
            let path = Self::path_and_query(req.uri()).to_string();

            let response = match Self::forward(req, &config).await {
                Ok(response) => response,
                Err(e) if e.is_upstream_failure() => {
                    error!(
                        upstream = %config.upstream.url_for(&path),
                        "Upstream exchange failed: {}", e
                    );
                    Self::error_response(e.status(), e.body())
                }
                Err(e) if e.status() == StatusCode::BAD_GATEWAY => {
                    warn!("Failed to forward request: {}", e);
                    Self::error_response(e.status(), e.body())
                }
                Err(e) => {
                    warn!("Request rejected: {}", e);
                    Self::error_response(e.status(), e.body())
                }
            };

            info!(
                client = %remote_addr,
                status = response.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "{} {}",
                method,
                path
            );

            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Run one request through the pipeline: build, send, relay
    async fn forward(
        req: Request<Incoming>,
        config: &GatewayConfig,
    ) -> Result<Response<ProxyBody>, GatewayError> {
        let outbound = Self::build_outbound(req, config).await?;

        let exchange = Self::send_upstream(outbound, &config.upstream);
        let response = match timeout(config.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(GatewayError::UpstreamTimeout(config.timeout)),
        };

        Ok(Self::relay_response(response, config.timeout))
    }

    /// Build the outbound request from the inbound one
    async fn build_outbound<B>(
        req: Request<B>,
        config: &GatewayConfig,
    ) -> Result<Request<Full<Bytes>>, GatewayError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let method = req.method().clone();
        if !SUPPORTED_METHODS.contains(&method) {
            return Err(GatewayError::MethodNotSupported(method.to_string()));
        }

        if config.reject_traversal && Self::has_traversal(req.uri().path()) {
            return Err(GatewayError::PathRejected(req.uri().path().to_string()));
        }

        let uri: Uri = Self::path_and_query(req.uri())
            .parse()
            .map_err(|e: hyper::http::uri::InvalidUri| GatewayError::RequestBuild(e.to_string()))?;

        let (parts, body) = req.into_parts();
        let mut headers = filter_headers(&parts.headers, &REQUEST_DENY_LIST);

        let body_bytes = if Self::carries_body(&method) {
            Self::read_body(body, config).await?
        } else {
            for name in BODYLESS_DENY_LIST.iter() {
                headers.remove(name);
            }
            Bytes::new()
        };

        let host = HeaderValue::from_str(config.upstream.host_header())
            .map_err(|e| GatewayError::RequestBuild(e.to_string()))?;
        headers.insert(HOST, host);

        let mut outbound = Request::builder()
            .method(method)
            .uri(uri)
            .version(Version::HTTP_11)
            .body(Full::new(body_bytes))
            .map_err(|e| GatewayError::RequestBuild(e.to_string()))?;
        *outbound.headers_mut() = headers;

        Ok(outbound)
    }

    /// Read a request body fully, bounded by the size ceiling and timeout
    async fn read_body<B>(body: B, config: &GatewayConfig) -> Result<Bytes, GatewayError>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<BoxError>,
    {
        let limited = Limited::new(body, config.max_body_bytes);

        match timeout(config.timeout, limited.collect()).await {
            Err(_) => Err(GatewayError::RequestBodyTimeout(config.timeout)),
            Ok(Err(e)) if e.downcast_ref::<LengthLimitError>().is_some() => {
                Err(GatewayError::PayloadTooLarge(config.max_body_bytes))
            }
            Ok(Err(e)) => Err(GatewayError::RequestBody(e.to_string())),
            Ok(Ok(collected)) => Ok(collected.to_bytes()),
        }
    }

    /// Send the request over a fresh connection and wait for the response head
    async fn send_upstream(
        req: Request<Full<Bytes>>,
        upstream: &Upstream,
    ) -> Result<Response<Incoming>, GatewayError> {
        let addr = upstream.connect_addr();

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| GatewayError::Connect { addr, source })?;
        let _ = stream.set_nodelay(true);

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(GatewayError::Handshake)?;

        // Dropping the relayed body ends this task and closes the upstream socket.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("Upstream connection error: {}", e);
            }
        });

        sender.send_request(req).await.map_err(GatewayError::Upstream)
    }

    /// Turn the upstream response into the caller's response
    fn relay_response(response: Response<Incoming>, idle_timeout: Duration) -> Response<ProxyBody> {
        let (parts, body) = response.into_parts();

        let mut headers = filter_headers(&parts.headers, &RESPONSE_DENY_LIST);
        apply_security_headers(&mut headers);

        let body = IdleTimeoutBody::new(body, idle_timeout).boxed_unsync();
        let mut relayed = Response::new(body);
        *relayed.status_mut() = parts.status;
        *relayed.headers_mut() = headers;
        relayed
    }

    fn carries_body(method: &Method) -> bool {
        method == Method::POST || method == Method::PUT
    }

    fn path_and_query(uri: &Uri) -> &str {
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Whether a path contains a `..` segment, plain or percent-encoded
    fn has_traversal(path: &str) -> bool {
        let normalized = path
            .to_ascii_lowercase()
            .replace("%2e", ".")
            .replace("%2f", "/")
            .replace("%5c", "/")
            .replace('\\', "/");

        normalized.split('/').any(|segment| segment == "..")
    }

    /// Create error response
    fn error_response(status: StatusCode, message: String) -> Response<ProxyBody> {
        let mut response = Response::new(full_body(message));
        *response.status_mut() = status;
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        apply_security_headers(response.headers_mut());
        response
    }
}
