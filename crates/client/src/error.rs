//! Client error taxonomy.

use std::io;

use pipeload_multipart::MultipartError;

/// Errors produced by an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Connection-level failure before a response arrived.
    #[error("failed to send request: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local file could not be inspected, opened or read.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The body could not be encoded into the pipe.
    #[error("{0}")]
    Encode(MultipartError),

    /// The user aborted the upload.
    #[error("cancelled")]
    Cancelled,

    /// The server answered with something other than 200 OK.
    #[error("server returned status code: {status} [{body}]")]
    ServerRejected { status: u16, body: String },

    #[error("invalid file path: {0}")]
    InvalidPath(String),
}

impl UploadError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns `true` for a user abort as opposed to a fault.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<MultipartError> for UploadError {
    fn from(value: MultipartError) -> Self {
        match value {
            MultipartError::Cancelled => Self::Cancelled,
            other => Self::Encode(other),
        }
    }
}
