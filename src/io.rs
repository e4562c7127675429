//! Caller-side socket wrapper enforcing a write stall timeout

use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::{sleep, Instant, Sleep};

pin_project! {
    /// Wraps a stream so that writes blocked for longer than `timeout` fail
    /// with `TimedOut`. Reads are passed through; hyper bounds those itself.
    pub struct WriteTimeoutIo<S> {
        #[pin]
        inner: S,
        sleep: Pin<Box<Sleep>>,
        timeout: Duration,
        armed: bool,
    }
}

impl<S> WriteTimeoutIo<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            sleep: Box::pin(sleep(timeout)),
            timeout,
            armed: false,
        }
    }
}

/// Shared bookkeeping for every write-side poll.
fn check_stall<T>(
    result: Poll<io::Result<T>>,
    mut sleep: Pin<&mut Sleep>,
    armed: &mut bool,
    timeout: Duration,
    cx: &mut Context<'_>,
) -> Poll<io::Result<T>> {
    match result {
        Poll::Ready(r) => {
            *armed = false;
            Poll::Ready(r)
        }
        Poll::Pending => {
            if !*armed {
                sleep.as_mut().reset(Instant::now() + timeout);
                *armed = true;
            }
            match sleep.poll(cx) {
                Poll::Ready(()) => Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("write stalled for more than {:?}", timeout),
                ))),
                Poll::Pending => Poll::Pending,
            }
        }
    }
}

impl<S: AsyncRead> AsyncRead for WriteTimeoutIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl<S: AsyncWrite> AsyncWrite for WriteTimeoutIo<S> {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.project();
        let result = this.inner.poll_write(cx, buf);
        check_stall(result, this.sleep.as_mut(), this.armed, *this.timeout, cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.project();
        let result = this.inner.poll_write_vectored(cx, bufs);
        check_stall(result, this.sleep.as_mut(), this.armed, *this.timeout, cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.project();
        let result = this.inner.poll_flush(cx);
        check_stall(result, this.sleep.as_mut(), this.armed, *this.timeout, cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }
}
