//! Incremental `multipart/form-data` encoding and decoding.
//!
//! Neither side ever holds a whole body in memory:
//!
//! - [`StreamingEncoder`] writes attribute fields and one binary object
//!   field into a [`pipeload_stream::PipeWriter`] as the source is read.
//! - [`MultipartReader`] pulls parts off any [`tokio::io::AsyncRead`] and
//!   exposes each part body as an `AsyncRead` of its own, so the payload
//!   can be copied straight into a sink.
//!
//! # Wire format
//!
//! See the [`wire`] module for the framing rules.

pub mod boundary;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod wire;

pub use boundary::{generate_boundary, is_valid_boundary};
pub use decoder::{MultipartReader, Part};
pub use encoder::{StreamingEncoder, encode_upload};
pub use error::MultipartError;
pub use wire::{PartHeaders, boundary_from_content_type, form_data_content_type};

use std::collections::HashMap;

/// Opaque key/value metadata sent alongside the payload.
pub type TransferAttributes = HashMap<String, String>;

/// Reserved field name of the binary payload part.
pub const OBJECT_FIELD: &str = "object";

/// Attribute the receiver fills with the payload's declared file name.
pub const FILENAME_ATTRIBUTE: &str = "filename";

/// Media type prefix every upload request must carry.
pub const FORM_DATA: &str = "multipart/form-data";

/// Largest accepted header block of a single part (8 KiB).
pub const MAX_PART_HEADER_SIZE: usize = 8 * 1024;

/// Largest attribute value kept in memory (1 MiB).
pub const MAX_FIELD_SIZE: usize = 1024 * 1024;
