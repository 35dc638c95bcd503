//! Progress-sampling reader.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Publishes the byte count of every successful read on a progress channel.
///
/// Samples are additive: the receiver sums them to get the running total.
/// The push is blocking, so a slow reporter stalls the producer. A sample
/// that cannot be delivered right away is held and delivered before the
/// next read is issued; copy loops always read until end-of-stream, which
/// flushes the last non-empty sample.
///
/// Dropping the reader drops its sender, which is how the owner closes the
/// channel and lets the reporter finish draining.
pub struct ProgressReader<R> {
    inner: R,
    progress: PollSender<usize>,
    pending: Option<usize>,
}

impl<R> ProgressReader<R> {
    pub fn new(inner: R, progress: mpsc::Sender<usize>) -> Self {
        Self {
            inner,
            progress: PollSender::new(progress),
            pending: None,
        }
    }

    /// Delivers the held sample, if any. A closed channel discards it.
    fn poll_deliver(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(n) = self.pending else {
            return Poll::Ready(());
        };
        if ready!(self.progress.poll_reserve(cx)).is_ok() {
            let _ = self.progress.send_item(n);
        }
        self.pending = None;
        Poll::Ready(())
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_deliver(cx));

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let n = buf.filled().len() - before;

        this.pending = Some(n);
        let _ = this.poll_deliver(cx);
        Poll::Ready(Ok(()))
    }
}
