//! Incremental multipart reader (consumer side).
//!
//! Parts are pulled one at a time with [`MultipartReader::next_part`].
//! Each [`Part`] is itself an [`AsyncRead`] over that part's body, served
//! straight from a small look-ahead buffer: only the bytes that might
//! belong to the next delimiter are held back.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::io::poll_read_buf;
use tracing::trace;

use crate::error::MultipartError;
use crate::wire::{PartHeaders, boundary_from_content_type, parse_part_headers};
use crate::{MAX_FIELD_SIZE, MAX_PART_HEADER_SIZE};

/// Bytes requested from the source per fill.
const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    /// Before the first delimiter.
    Preamble,
    /// Inside a part body.
    Body,
    /// Just past a delimiter; either part headers or `--` follow.
    AfterDelimiter,
    /// Closing delimiter consumed.
    Done,
}

/// Pulls parts off a multipart body without buffering it.
pub struct MultipartReader<R> {
    inner: R,
    delimiter: Vec<u8>,
    buf: BytesMut,
    state: ReadState,
    eof: bool,
}

impl<R: AsyncRead + Unpin> MultipartReader<R> {
    pub fn new(inner: R, boundary: &str) -> Self {
        let delimiter = format!("\r\n--{boundary}").into_bytes();
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        // The first delimiter has no leading CRLF; pretend it does so every
        // delimiter is matched the same way.
        buf.extend_from_slice(b"\r\n");
        Self {
            inner,
            delimiter,
            buf,
            state: ReadState::Preamble,
            eof: false,
        }
    }

    /// Builds a reader from a request `Content-Type` header value.
    pub fn from_content_type(inner: R, content_type: &str) -> Result<Self, MultipartError> {
        let boundary = boundary_from_content_type(content_type)?;
        Ok(Self::new(inner, &boundary))
    }

    /// Advances to the next part. Returns `None` after the closing delimiter.
    ///
    /// Whatever is left unread of the previous part is discarded.
    pub async fn next_part(&mut self) -> Result<Option<Part<'_, R>>, MultipartError> {
        match self.state {
            ReadState::Done => return Ok(None),
            ReadState::Preamble | ReadState::Body => self.skip_past_delimiter().await?,
            ReadState::AfterDelimiter => {}
        }

        self.fill_at_least(2).await?;
        if self.buf.starts_with(b"--") {
            self.buf.advance(2);
            self.state = ReadState::Done;
            trace!("closing delimiter reached");
            return Ok(None);
        }

        // Optional transport padding, then the line break.
        loop {
            self.fill_at_least(2).await?;
            match self.buf[0] {
                b' ' | b'\t' => self.buf.advance(1),
                _ => break,
            }
        }
        if !self.buf.starts_with(b"\r\n") {
            return Err(MultipartError::Malformed(
                "expected line break after boundary".into(),
            ));
        }
        self.buf.advance(2);

        let headers = self.read_headers().await?;
        self.state = ReadState::Body;
        trace!(name = %headers.name, filename = ?headers.filename, "part started");
        Ok(Some(Part {
            headers,
            reader: self,
        }))
    }

    /// Reads more input into the look-ahead buffer. Returns bytes added.
    async fn fill(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        self.buf.reserve(READ_CHUNK);
        let n = self.inner.read_buf(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    async fn fill_at_least(&mut self, len: usize) -> Result<(), MultipartError> {
        while self.buf.len() < len {
            if self.fill().await? == 0 {
                return Err(MultipartError::UnexpectedEof);
            }
        }
        Ok(())
    }

    /// Discards input up to and including the next delimiter.
    async fn skip_past_delimiter(&mut self) -> Result<(), MultipartError> {
        loop {
            let found = match locate_delimiter(&self.buf, &self.delimiter) {
                Delimiter::Found(pos) => Some(pos),
                Delimiter::Undecided(pos) if self.eof => Some(pos),
                Delimiter::Undecided(pos) => {
                    self.buf.advance(pos);
                    None
                }
                Delimiter::Absent => {
                    let keep = self.delimiter.len() - 1;
                    if self.buf.len() > keep {
                        let discard = self.buf.len() - keep;
                        self.buf.advance(discard);
                    }
                    None
                }
            };
            if let Some(pos) = found {
                self.buf.advance(pos + self.delimiter.len());
                self.state = ReadState::AfterDelimiter;
                return Ok(());
            }

            if self.fill().await? == 0 && self.buf.len() < self.delimiter.len() {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }

    async fn read_headers(&mut self) -> Result<PartHeaders, MultipartError> {
        loop {
            if self.buf.starts_with(b"\r\n") {
                self.buf.advance(2);
                return parse_part_headers(&[]);
            }
            if let Some(pos) = find(&self.buf, b"\r\n\r\n") {
                let block = self.buf.split_to(pos);
                self.buf.advance(4);
                return parse_part_headers(&block);
            }
            if self.buf.len() > MAX_PART_HEADER_SIZE {
                return Err(MultipartError::HeaderTooLarge(MAX_PART_HEADER_SIZE));
            }
            if self.fill().await? == 0 {
                return Err(MultipartError::UnexpectedEof);
            }
        }
    }

    /// Serves body bytes of the current part.
    fn poll_read_part(
        &mut self,
        cx: &mut Context<'_>,
        out: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.state != ReadState::Body || out.remaining() == 0 {
                return Poll::Ready(Ok(()));
            }

            // Body runs up to the delimiter, or up to a possible delimiter
            // prefix at the end of the buffer.
            let (end, at_delimiter) = match locate_delimiter(&self.buf, &self.delimiter) {
                Delimiter::Found(pos) => (pos, true),
                Delimiter::Undecided(pos) => (pos, self.eof),
                Delimiter::Absent => (
                    self.buf.len().saturating_sub(self.delimiter.len() - 1),
                    false,
                ),
            };
            if end == 0 && at_delimiter {
                self.buf.advance(self.delimiter.len());
                self.state = ReadState::AfterDelimiter;
                return Poll::Ready(Ok(()));
            }
            if end > 0 {
                let n = end.min(out.remaining());
                out.put_slice(&self.buf[..n]);
                self.buf.advance(n);
                return Poll::Ready(Ok(()));
            }

            if self.eof {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "multipart body ended inside a part",
                )));
            }
            self.buf.reserve(READ_CHUNK);
            let n = ready!(poll_read_buf(Pin::new(&mut self.inner), cx, &mut self.buf))?;
            if n == 0 {
                self.eof = true;
            }
        }
    }
}

/// One part of a multipart body, readable until its closing delimiter.
pub struct Part<'a, R> {
    headers: PartHeaders,
    reader: &'a mut MultipartReader<R>,
}

impl<R: AsyncRead + Unpin> Part<'_, R> {
    /// Form field name.
    pub fn name(&self) -> &str {
        &self.headers.name
    }

    /// Declared file name, if the part is a file.
    pub fn filename(&self) -> Option<&str> {
        self.headers.filename.as_deref()
    }

    pub fn headers(&self) -> &PartHeaders {
        &self.headers
    }

    /// Reads the whole part as UTF-8 text, up to [`MAX_FIELD_SIZE`] bytes.
    pub async fn text(&mut self) -> Result<String, MultipartError> {
        let mut buf = Vec::new();
        let limit = MAX_FIELD_SIZE as u64 + 1;
        (&mut *self).take(limit).read_to_end(&mut buf).await?;
        if buf.len() > MAX_FIELD_SIZE {
            return Err(MultipartError::FieldTooLarge(MAX_FIELD_SIZE));
        }
        String::from_utf8(buf)
            .map_err(|_| MultipartError::Malformed(format!("field {} is not UTF-8", self.name())))
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for Part<'_, R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.get_mut().reader.poll_read_part(cx, buf)
    }
}

/// Outcome of searching the look-ahead buffer for a delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delimiter {
    Found(usize),
    /// The delimiter bytes match at this offset but what follows them has
    /// not arrived yet.
    Undecided(usize),
    Absent,
}

/// Finds the first delimiter in `haystack` that is followed by `--`, a
/// line break, or transport padding. Other matches are part of the body.
fn locate_delimiter(haystack: &[u8], delimiter: &[u8]) -> Delimiter {
    let mut from = 0;
    while let Some(offset) = find(&haystack[from..], delimiter) {
        let pos = from + offset;
        match &haystack[pos + delimiter.len()..] {
            [] | [b'-'] | [b'\r'] => return Delimiter::Undecided(pos),
            [b'-', b'-', ..] | [b'\r', b'\n', ..] | [b' ' | b'\t', ..] => {
                return Delimiter::Found(pos);
            }
            _ => from = pos + 1,
        }
    }
    Delimiter::Absent
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
