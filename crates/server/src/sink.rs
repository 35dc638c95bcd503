//! Destination files.

use std::io;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use pipeload_stream::COPY_BUFFER_SIZE;

use crate::config::Destination;

/// Which side of a copy failed.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("read failed: {0}")]
    Read(#[source] io::Error),
    #[error("write failed: {0}")]
    Write(#[source] io::Error),
}

/// An open destination file, exclusively owned by one request.
#[derive(Debug)]
pub struct Sink {
    file: File,
    path: PathBuf,
}

impl Sink {
    /// Creates (or truncates) the file the next payload goes to.
    pub async fn create(destination: &Destination) -> io::Result<Self> {
        match destination {
            Destination::Fixed { path } => {
                let file = File::create(path).await?;
                Ok(Self {
                    file,
                    path: path.clone(),
                })
            }
            Destination::Unique { dir } => {
                let dir = dir.clone();
                let (file, path) = tokio::task::spawn_blocking(move || {
                    tempfile::Builder::new()
                        .prefix("upload-")
                        .tempfile_in(dir)?
                        .keep()
                        .map_err(|e| e.error)
                })
                .await
                .map_err(io::Error::other)??;
                Ok(Self {
                    file: File::from_std(file),
                    path,
                })
            }
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Streams `source` into the file until end-of-stream.
    pub async fn copy_from<R>(&mut self, source: &mut R) -> Result<u64, CopyError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut written: u64 = 0;
        loop {
            let n = source.read(&mut buf).await.map_err(CopyError::Read)?;
            if n == 0 {
                return Ok(written);
            }
            self.file
                .write_all(&buf[..n])
                .await
                .map_err(CopyError::Write)?;
            written += n as u64;
        }
    }

    /// Flushes and syncs the file to disk, returning its path.
    pub async fn finish(mut self) -> io::Result<PathBuf> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(self.path)
    }
}
