//! Transmitter: streams the pipe as the HTTP request body.

use pipeload_stream::PipeReader;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::UploadError;

/// Accepted response from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitResponse {
    pub status: u16,
    pub body: String,
}

/// POSTs `body` to `endpoint` and checks the response.
///
/// `content_type` must carry the boundary the encoder writes with; it is
/// sent before the first body byte exists. A failure before any response
/// arrives is a [`UploadError::Transport`]; a response other than 200 is a
/// [`UploadError::ServerRejected`] carrying the response text. A server
/// closing the connection after replying is not an error.
pub async fn transmit(
    http: &reqwest::Client,
    endpoint: &str,
    content_type: String,
    body: PipeReader,
    cancel: CancellationToken,
) -> Result<TransmitResponse, UploadError> {
    debug!(endpoint, "sending request");
    let request = http
        .post(endpoint)
        .header(CONTENT_TYPE, content_type)
        .body(reqwest::Body::wrap_stream(body))
        .send();

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        result = request => result.map_err(|e| {
            error!(error = %e, "error sending request");
            UploadError::Transport(e)
        })?,
    };
    let status = response.status();
    debug!(status = status.as_u16(), "response received");

    // Error bodies are short; an unreadable body is reported as empty.
    let text = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(UploadError::Cancelled),
        text = response.text() => text.unwrap_or_default(),
    };

    if status != StatusCode::OK {
        error!(status = status.as_u16(), body = %text, "server rejected upload");
        return Err(UploadError::ServerRejected {
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(TransmitResponse {
        status: status.as_u16(),
        body: text,
    })
}
