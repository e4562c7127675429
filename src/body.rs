//! Response body helpers and the idle-timeout wrapper used while relaying
//! upstream bodies

use bytes::Bytes;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use hyper::body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{sleep, Instant, Sleep};
use tracing::warn;

/// Boxed error type carried by relayed bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Body type of every response the gateway produces.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

/// Create full body
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Raised when the upstream stops producing body frames for too long.
#[derive(Debug)]
pub struct BodyIdleTimeout(pub Duration);

impl fmt::Display for BodyIdleTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "upstream body idle for more than {:?}", self.0)
    }
}

impl std::error::Error for BodyIdleTimeout {}

pin_project! {
    /// Passes frames through untouched, failing the stream when the inner body
    /// stays pending for longer than `timeout`.
    ///
    /// The timer only runs while the inner body is pending, so a slow reader
    /// on the caller side does not count as upstream idleness.
    pub struct IdleTimeoutBody<B> {
        #[pin]
        inner: B,
        #[pin]
        sleep: Sleep,
        timeout: Duration,
        armed: bool,
    }
}

impl<B> IdleTimeoutBody<B> {
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self {
            inner,
            sleep: sleep(timeout),
            timeout,
            armed: false,
        }
    }
}

impl<B> Body for IdleTimeoutBody<B>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    type Data = B::Data;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let mut this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                *this.armed = false;
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => {
                let e = e.into();
                warn!("Upstream body failed mid-stream: {}", e);
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => {
                if !*this.armed {
                    this.sleep.as_mut().reset(Instant::now() + *this.timeout);
                    *this.armed = true;
                }
                match this.sleep.poll(cx) {
                    Poll::Ready(()) => {
                        warn!("Upstream body idle for {:?}, aborting relay", this.timeout);
                        Poll::Ready(Some(Err(Box::new(BodyIdleTimeout(*this.timeout)))))
                    }
                    Poll::Pending => Poll::Pending,
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
