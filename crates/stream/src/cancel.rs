//! Cancellation-aware reader.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

use crate::error::Cancelled;

/// Fails every read once its token has fired.
///
/// The token is checked on each call, not only at construction, so a
/// cancellation that lands mid-stream stops the copy at the next read.
/// A read already in progress on the inner source is not interrupted.
#[derive(Debug)]
pub struct CancelableReader<R> {
    inner: R,
    cancel: CancellationToken,
}

impl<R> CancelableReader<R> {
    pub fn new(inner: R, cancel: CancellationToken) -> Self {
        Self { inner, cancel }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for CancelableReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.cancel.is_cancelled() {
            return Poll::Ready(Err(Cancelled.into()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_cancelled;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn delegates_while_active() {
        let cancel = CancellationToken::new();
        let mut reader = CancelableReader::new(&b"hello"[..], cancel);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello");
    }

    #[tokio::test]
    async fn fails_before_touching_source() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut reader = CancelableReader::new(&b"hello"[..], cancel);

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert!(is_cancelled(&err));

        // Nothing was consumed from the inner source.
        assert_eq!(reader.into_inner(), b"hello");
    }

    #[tokio::test]
    async fn cancellation_mid_stream() {
        let cancel = CancellationToken::new();
        let mut reader = CancelableReader::new(&b"abcdef"[..], cancel.clone());

        let mut buf = [0u8; 3];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf, b"abc");

        cancel.cancel();
        let err = reader.read(&mut buf).await.unwrap_err();
        assert!(is_cancelled(&err));
    }

    #[tokio::test]
    async fn passes_through_end_of_stream() {
        let cancel = CancellationToken::new();
        let mut reader = CancelableReader::new(&b""[..], cancel);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }
}
