//! Upload receiver.
//!
//! An HTTP/1 server with three routes:
//!
//! - `POST /upload/` decodes a streamed `multipart/form-data` body and
//!   writes its `object` part to the configured destination.
//! - `GET /` answers `OK`.
//! - `POST /` writes the raw body to the destination.
//!
//! The upload route has no body deadline; an optional per-32 KB delay is
//! the only brake on ingest. The other routes run under the API timeout.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;
pub mod sink;
pub mod upload;

pub use config::{Destination, ServerConfig, parse_duration};
pub use error::{ServerError, UploadFailure};
pub use server::{ServerState, UploadServer, shutdown_signal};
pub use upload::{ReceivedUpload, receive_upload};
