//! Bounded in-memory pipe coupling a producer task with a consumer task.
//!
//! The pipe carries byte chunks over a channel of capacity one: a write
//! completes only once the previous chunk has been taken by the reader, so
//! the producer runs at most one chunk ahead. The writer can close the pipe
//! cleanly (reader sees end-of-stream) or with an error (reader sees that
//! error instead of a bare end-of-stream).

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

/// Creates a connected writer/reader pair.
pub fn pipe() -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(1);
    (PipeWriter { tx }, PipeReader { rx, done: false })
}

/// Write end of a [`pipe`].
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
}

impl PipeWriter {
    /// Hands a chunk to the reader, waiting while the pipe is full.
    ///
    /// Fails with [`io::ErrorKind::BrokenPipe`] once the reader is gone.
    pub async fn write(&self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }

    /// Copies `data` into a new chunk and writes it.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        self.write(Bytes::copy_from_slice(data)).await
    }

    /// Returns `true` if the reader has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Closes the pipe; the reader sees end-of-stream after draining.
    pub fn close(self) {}

    /// Closes the pipe so the reader observes `err` after draining.
    pub async fn close_with_error(self, err: io::Error) {
        // Nobody to tell if the reader already left.
        let _ = self.tx.send(Err(err)).await;
    }
}

/// Read end of a [`pipe`], consumed as a stream of chunks.
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<io::Result<Bytes>>,
    done: bool,
}

impl Stream for PipeReader {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match ready!(this.rx.poll_recv(cx)) {
            Some(Ok(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Some(Err(err)) => {
                this.done = true;
                this.rx.close();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}
