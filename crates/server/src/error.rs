//! Server error taxonomy.

use std::io;

use hyper::StatusCode;
use pipeload_multipart::MultipartError;

/// Why a single upload request failed.
///
/// The display text is for logs. Clients only ever see
/// [`UploadFailure::public_message`], which never carries causes or paths.
#[derive(Debug, thiserror::Error)]
pub enum UploadFailure {
    #[error("unsupported media type: {0:?}")]
    UnsupportedMediaType(String),

    #[error("error parsing request: {0}")]
    Protocol(#[source] MultipartError),

    #[error("error reading request body: {0}")]
    BodyRead(#[source] io::Error),

    #[error("object part without filename")]
    MissingFilename,

    #[error("no object part in request")]
    MissingPayload,

    #[error("more than one object part in request")]
    DuplicatePayload,

    #[error("error saving file: {0}")]
    Sink(#[source] io::Error),
}

impl UploadFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Protocol(_)
            | Self::BodyRead(_)
            | Self::MissingFilename
            | Self::MissingPayload
            | Self::DuplicatePayload => StatusCode::BAD_REQUEST,
            Self::Sink(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response body text.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::UnsupportedMediaType(_) => "Unsupported Media Type\n",
            Self::Protocol(_) | Self::BodyRead(_) => "Error parsing request\n",
            Self::MissingFilename => "Cannot process object without filename\n",
            Self::MissingPayload => "No file uploaded\n",
            Self::DuplicatePayload => "Only one file per request\n",
            Self::Sink(_) => "Error saving file\n",
        }
    }
}

impl From<MultipartError> for UploadFailure {
    fn from(value: MultipartError) -> Self {
        match value {
            MultipartError::UnsupportedMediaType(ct) => Self::UnsupportedMediaType(ct),
            other => Self::Protocol(other),
        }
    }
}

/// Errors that stop the server itself.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("could not listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("accept error: {0}")]
    Accept(#[source] io::Error),

    #[error("shutdown deadline of {0:?} elapsed with connections still open")]
    ShutdownTimeout(std::time::Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
