//! Streaming upload client.
//!
//! Sends one file as `multipart/form-data` without ever holding it in
//! memory. Two groups of tasks cooperate through a bounded pipe:
//!
//! ```text
//! outer group
//! ├── producer: inner group
//! │   ├── encoder   file -> cancel check -> progress -> multipart -> pipe
//! │   └── reporter  progress channel -> progress bar
//! └── transmitter   pipe -> HTTP request body -> response check
//! ```
//!
//! The first task to fail cancels the whole operation and its error is the
//! one returned.

pub mod error;
pub mod group;
pub mod reporter;
pub mod transmit;
pub mod upload;

pub use error::UploadError;
pub use group::TaskGroup;
pub use reporter::{progress_bar, report_progress};
pub use transmit::{TransmitResponse, transmit};
pub use upload::{UploadReport, Uploader, UploaderConfig};

pub use pipeload_multipart::TransferAttributes;

/// Default upload endpoint.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8980/upload/";
