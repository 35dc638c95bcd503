//! Error types for multipart encoding and decoding.

use std::io;

use pipeload_stream::Cancelled;

/// Errors produced while encoding or decoding a multipart body.
#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("failed to write field: {0}")]
    WriteField(#[source] io::Error),

    #[error("failed to create form file: {0}")]
    CreateObject(#[source] io::Error),

    #[error("failed to copy file data: {0}")]
    CopyObject(#[source] io::Error),

    #[error("failed to close writer: {0}")]
    Finish(#[source] io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("missing multipart boundary")]
    MissingBoundary,

    #[error("invalid multipart boundary: {0}")]
    InvalidBoundary(String),

    #[error("malformed multipart body: {0}")]
    Malformed(String),

    #[error("part headers exceed {0} bytes")]
    HeaderTooLarge(usize),

    #[error("field exceeds {0} bytes")]
    FieldTooLarge(usize),

    #[error("unexpected end of multipart body")]
    UnexpectedEof,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl MultipartError {
    /// Builds the error handed to the pipe reader when encoding aborts.
    ///
    /// Cancellation keeps its marker so the consumer can still tell a user
    /// abort from a fault.
    pub fn to_io_error(&self) -> io::Error {
        match self {
            Self::Cancelled => Cancelled.into(),
            Self::WriteField(e) | Self::CreateObject(e) | Self::CopyObject(e) | Self::Finish(e) => {
                io::Error::new(e.kind(), self.to_string())
            }
            _ => io::Error::other(self.to_string()),
        }
    }
}
