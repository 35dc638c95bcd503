//! Streaming multipart encoder (producer side).

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error};

use pipeload_stream::{COPY_BUFFER_SIZE, PipeWriter, is_cancelled};

use crate::error::MultipartError;
use crate::wire::{closing_delimiter, field_header, file_header, form_data_content_type};
use crate::{OBJECT_FIELD, TransferAttributes, generate_boundary};

/// Writes a multipart body into a pipe, one frame at a time.
///
/// The boundary is fixed at construction so the request content type can
/// be sent before the first byte of the body exists.
#[derive(Debug)]
pub struct StreamingEncoder {
    writer: PipeWriter,
    boundary: String,
    parts: usize,
}

impl StreamingEncoder {
    /// Creates an encoder with a freshly generated boundary.
    pub fn new(writer: PipeWriter) -> Self {
        Self::with_boundary(writer, generate_boundary())
    }

    pub fn with_boundary(writer: PipeWriter, boundary: String) -> Self {
        Self {
            writer,
            boundary,
            parts: 0,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// `multipart/form-data; boundary=...` for the request header.
    pub fn content_type(&self) -> String {
        form_data_content_type(&self.boundary)
    }

    /// Writes one attribute field frame.
    pub async fn write_field(&mut self, name: &str, value: &str) -> Result<(), MultipartError> {
        let header = field_header(&self.boundary, name, self.parts == 0);
        self.writer
            .write_all(header.as_bytes())
            .await
            .map_err(MultipartError::WriteField)?;
        self.writer
            .write_all(value.as_bytes())
            .await
            .map_err(MultipartError::WriteField)?;
        self.parts += 1;
        Ok(())
    }

    /// Writes the object frame, streaming `source` until end-of-stream.
    ///
    /// Returns the number of payload bytes written.
    pub async fn write_object<R>(
        &mut self,
        name: &str,
        filename: &str,
        mut source: R,
    ) -> Result<u64, MultipartError>
    where
        R: AsyncRead + Unpin,
    {
        let header = file_header(&self.boundary, name, filename, self.parts == 0);
        self.writer
            .write_all(header.as_bytes())
            .await
            .map_err(MultipartError::CreateObject)?;
        self.parts += 1;
        debug!(filename, "created form file");

        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;
        loop {
            let n = source.read(&mut buf).await.map_err(|e| {
                if is_cancelled(&e) {
                    MultipartError::Cancelled
                } else {
                    MultipartError::CopyObject(e)
                }
            })?;
            if n == 0 {
                break;
            }

            self.writer
                .write_all(&buf[..n])
                .await
                .map_err(MultipartError::CopyObject)?;
            written += n as u64;
        }

        debug!(written, "copied file data");
        Ok(written)
    }

    /// Writes the closing delimiter and closes the pipe cleanly. If the
    /// trailer cannot be written the pipe is closed with the error instead.
    pub async fn finish(self) -> Result<(), MultipartError> {
        let trailer = closing_delimiter(&self.boundary, self.parts == 0);
        if let Err(e) = self.writer.write_all(trailer.as_bytes()).await {
            let err = MultipartError::Finish(e);
            error!(error = %err, "multipart encoding failed");
            self.abort(&err).await;
            return Err(err);
        }
        self.writer.close();
        Ok(())
    }

    /// Closes the pipe with `err` so the reader fails the same way.
    pub async fn abort(self, err: &MultipartError) {
        self.writer.close_with_error(err.to_io_error()).await;
    }
}

/// Encodes a whole transfer: every attribute, then the object, then the
/// trailer.
///
/// On failure the pipe is closed with the error and no further frame is
/// written. `source` is dropped before returning on every path, which
/// closes any progress channel it feeds.
pub async fn encode_upload<R>(
    mut encoder: StreamingEncoder,
    attributes: &TransferAttributes,
    filename: &str,
    source: R,
) -> Result<u64, MultipartError>
where
    R: AsyncRead + Unpin,
{
    let result = async {
        for (key, value) in attributes {
            encoder.write_field(key, value).await?;
        }
        encoder.write_object(OBJECT_FIELD, filename, source).await
    }
    .await;

    match result {
        Ok(written) => {
            encoder.finish().await?;
            Ok(written)
        }
        Err(e) => {
            error!(error = %e, "multipart encoding failed");
            encoder.abort(&e).await;
            Err(e)
        }
    }
}
