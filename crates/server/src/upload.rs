//! `POST /upload/` handler.
//!
//! Walks the multipart body part by part. Attribute fields are small and
//! kept in memory; the `object` part is streamed straight into the
//! destination without being buffered.

use std::path::PathBuf;

use tokio::io::AsyncRead;
use tracing::{debug, error, info, warn};

use pipeload_multipart::{
    FILENAME_ATTRIBUTE, FORM_DATA, MultipartReader, OBJECT_FIELD, PartHeaders,
    TransferAttributes,
};
use pipeload_stream::ThrottledReader;

use crate::config::ServerConfig;
use crate::error::UploadFailure;
use crate::sink::{CopyError, Sink};

/// What a part carries, decided from its headers.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PartKind {
    /// Small text field kept in the attribute map.
    Attribute(String),
    /// The payload, with its non-empty file name.
    Object(String),
}

/// Sorts a part into attribute or object. `object_seen` is set once an
/// object part has already been stored.
fn classify(headers: &PartHeaders, object_seen: bool) -> Result<PartKind, UploadFailure> {
    if headers.name != OBJECT_FIELD {
        return Ok(PartKind::Attribute(headers.name.clone()));
    }
    if object_seen {
        warn!("second object part in request");
        return Err(UploadFailure::DuplicatePayload);
    }
    match headers.filename.as_deref() {
        Some(name) if !name.is_empty() => Ok(PartKind::Object(name.to_string())),
        _ => {
            error!("object part without filename");
            Err(UploadFailure::MissingFilename)
        }
    }
}

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedUpload {
    /// Attribute fields plus `filename`.
    pub attributes: TransferAttributes,
    pub filename: String,
    pub destination: PathBuf,
    pub bytes_written: u64,
}

impl ReceivedUpload {
    /// Response body sent on success.
    pub fn confirmation(&self) -> String {
        format!("File '{}' uploaded successfully\n", self.filename)
    }
}

/// Decodes one upload request and stores its payload.
///
/// `content_type` is the raw request header. Nothing is written unless the
/// body holds an `object` part with a filename; a body without one leaves
/// the destination untouched.
pub async fn receive_upload<R>(
    content_type: Option<&str>,
    body: R,
    config: &ServerConfig,
) -> Result<ReceivedUpload, UploadFailure>
where
    R: AsyncRead + Unpin,
{
    let content_type = content_type.unwrap_or_default();
    if !content_type.starts_with(FORM_DATA) {
        error!(content_type, "unsupported media type");
        return Err(UploadFailure::UnsupportedMediaType(content_type.to_string()));
    }
    let mut reader = MultipartReader::from_content_type(body, content_type).inspect_err(|e| {
        error!(error = %e, "error creating multipart reader");
    })?;

    let mut attributes = TransferAttributes::new();
    let mut stored: Option<(String, PathBuf, u64)> = None;

    while let Some(mut part) = reader.next_part().await.inspect_err(|e| {
        error!(error = %e, "error reading next part");
    })? {
        match classify(part.headers(), stored.is_some())? {
            PartKind::Attribute(name) => {
                debug!(attribute = %name, "processing attribute");
                let value = part.text().await.inspect_err(|e| {
                    error!(attribute = %name, error = %e, "error reading attribute");
                })?;
                attributes.insert(name, value);
            }
            PartKind::Object(filename) => {
                debug!(filename = %filename, "processing object");
                attributes.insert(FILENAME_ATTRIBUTE.to_string(), filename.clone());
                let (path, written) = store_object(&mut part, config).await?;
                stored = Some((filename, path, written));
            }
        }
    }

    let Some((filename, destination, bytes_written)) = stored else {
        error!("no file uploaded");
        return Err(UploadFailure::MissingPayload);
    };

    info!(
        ?attributes,
        destination = %destination.display(),
        bytes_written,
        "file uploaded successfully"
    );
    Ok(ReceivedUpload {
        attributes,
        filename,
        destination,
        bytes_written,
    })
}

/// Streams an object part into a fresh sink, throttled by `upload_delay`.
async fn store_object<R>(part: &mut R, config: &ServerConfig) -> Result<(PathBuf, u64), UploadFailure>
where
    R: AsyncRead + Unpin,
{
    let mut sink = Sink::create(&config.destination).await.map_err(|e| {
        error!(error = %e, "error creating destination");
        UploadFailure::Sink(e)
    })?;
    let mut source = ThrottledReader::new(part, config.upload_delay);
    let written = sink.copy_from(&mut source).await.map_err(|e| {
        error!(error = %e, path = %sink.path().display(), "error saving file");
        match e {
            CopyError::Read(e) => UploadFailure::BodyRead(e),
            CopyError::Write(e) => UploadFailure::Sink(e),
        }
    })?;
    if source.pauses() > 0 {
        debug!(pauses = source.pauses(), "upload was throttled");
    }
    let path = sink.finish().await.map_err(|e| {
        error!(error = %e, "error syncing destination");
        UploadFailure::Sink(e)
    })?;
    Ok((path, written))
}
