//! Byte-count based throttling reader.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Sleep;
use tracing::trace;

use crate::THROTTLE_THRESHOLD;

/// Sleeps for `delay` every time `threshold` bytes have been read.
///
/// The policy counts bytes, not time: one pause per threshold crossing
/// whatever the read size, so throughput is roughly `threshold / delay`.
/// A zero delay disables throttling.
pub struct ThrottledReader<R> {
    inner: R,
    delay: Duration,
    threshold: usize,
    counter: usize,
    pauses: u64,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<R> ThrottledReader<R> {
    /// Creates a reader pausing every [`THROTTLE_THRESHOLD`] bytes.
    pub fn new(inner: R, delay: Duration) -> Self {
        Self::with_threshold(inner, delay, THROTTLE_THRESHOLD)
    }

    pub fn with_threshold(inner: R, delay: Duration, threshold: usize) -> Self {
        Self {
            inner,
            delay,
            threshold: threshold.max(1),
            counter: 0,
            pauses: 0,
            sleep: None,
        }
    }

    /// Number of pauses taken so far.
    pub fn pauses(&self) -> u64 {
        self.pauses
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ThrottledReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if !this.delay.is_zero() && this.counter >= this.threshold {
            let delay = this.delay;
            let sleep = this
                .sleep
                .get_or_insert_with(|| Box::pin(tokio::time::sleep(delay)));
            ready!(sleep.as_mut().poll(cx));

            this.sleep = None;
            this.counter = 0;
            this.pauses += 1;
            trace!(pauses = this.pauses, "throttle pause elapsed");
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.counter += buf.filled().len() - before;
        Poll::Ready(Ok(()))
    }
}
