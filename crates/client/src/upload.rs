//! Upload orchestration.

use std::path::Path;

use pipeload_multipart::{MultipartError, StreamingEncoder, TransferAttributes, encode_upload};
use pipeload_stream::{CancelableReader, ProgressReader, pipe};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::UploadError;
use crate::group::TaskGroup;
use crate::reporter::{progress_bar, report_progress};
use crate::transmit::{TransmitResponse, transmit};
use crate::DEFAULT_ENDPOINT;

/// Client settings.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub endpoint: String,
    /// Draw a progress bar on the terminal.
    pub show_progress: bool,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            show_progress: false,
        }
    }
}

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    /// Payload bytes read from the file and encoded.
    pub bytes_sent: u64,
    pub status: u16,
    /// Server response text.
    pub response: String,
}

/// What each task in the upload groups hands back.
enum Step {
    Encoded(u64),
    Reported(u64),
    Transmitted(TransmitResponse),
}

/// Uploads files to a single endpoint.
#[derive(Debug, Clone)]
pub struct Uploader {
    http: reqwest::Client,
    config: UploaderConfig,
}

impl Uploader {
    pub fn new(config: UploaderConfig) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: reqwest::Client, config: UploaderConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Streams the file at `path` with `attributes` as form fields.
    ///
    /// Memory use does not depend on the file size. Cancelling `cancel`
    /// stops the transfer at the next read or network wait and yields
    /// [`UploadError::Cancelled`]; any other failure cancels the rest of the
    /// operation and is returned as is.
    pub async fn upload_file(
        &self,
        path: &Path,
        attributes: &TransferAttributes,
        cancel: CancellationToken,
    ) -> Result<UploadReport, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        let display_path = path.display().to_string();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| UploadError::io(format!("failed to get file info for {display_path}"), e))?;
        if !meta.is_file() {
            return Err(UploadError::InvalidPath(display_path));
        }
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .ok_or_else(|| UploadError::InvalidPath(display_path.clone()))?;

        let size = meta.len();
        info!(file = %display_path, size, endpoint = %self.config.endpoint, "uploading file");

        let bar = progress_bar(size, self.config.show_progress);
        let (writer, reader) = pipe();
        let encoder = StreamingEncoder::new(writer);
        let content_type = encoder.content_type();

        let operation = cancel.child_token();
        let mut group: TaskGroup<Step, UploadError> = TaskGroup::new(operation.clone());

        {
            let path = path.to_path_buf();
            let attributes = attributes.clone();
            let operation = operation.clone();
            group.spawn(async move {
                let file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(e) => {
                        let context = format!("failed to open {}", path.display());
                        encoder
                            .abort(&MultipartError::Io(std::io::Error::new(e.kind(), context.clone())))
                            .await;
                        return Err(UploadError::io(context, e));
                    }
                };

                let (progress_tx, progress_rx) = mpsc::channel(1);
                let source = ProgressReader::new(
                    CancelableReader::new(file, operation.clone()),
                    progress_tx,
                );

                let mut producer: TaskGroup<Step, UploadError> =
                    TaskGroup::new(operation.child_token());
                producer.spawn(async move {
                    Ok(Step::Reported(report_progress(progress_rx, bar).await))
                });
                producer.spawn(async move {
                    let written = encode_upload(encoder, &attributes, &filename, source).await?;
                    Ok(Step::Encoded(written))
                });

                let mut written = 0;
                for step in producer.wait().await? {
                    match step {
                        Step::Encoded(n) => written = n,
                        Step::Reported(n) => debug!(reported = n, "progress reporter finished"),
                        Step::Transmitted(_) => {}
                    }
                }
                Ok(Step::Encoded(written))
            });
        }

        {
            let http = self.http.clone();
            let endpoint = self.config.endpoint.clone();
            let operation = operation.clone();
            group.spawn(async move {
                let response = transmit(&http, &endpoint, content_type, reader, operation).await?;
                Ok(Step::Transmitted(response))
            });
        }

        let steps = match group.wait().await {
            Ok(steps) => steps,
            Err(_) if cancel.is_cancelled() => return Err(UploadError::Cancelled),
            Err(e) => return Err(e),
        };

        let mut bytes_sent = 0;
        let mut response = None;
        for step in steps {
            match step {
                Step::Encoded(n) => bytes_sent = n,
                Step::Transmitted(r) => response = Some(r),
                Step::Reported(_) => {}
            }
        }
        let response = response.ok_or(UploadError::Cancelled)?;

        debug!(bytes_sent, status = response.status, "upload complete");
        Ok(UploadReport {
            bytes_sent,
            status: response.status,
            response: response.body,
        })
    }
}
