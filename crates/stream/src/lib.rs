//! Read adapters and a bounded byte pipe for streaming uploads.
//!
//! Every adapter wraps an inner [`tokio::io::AsyncRead`] and exposes the
//! same capability, so they compose as a decorator chain:
//!
//! ```text
//! file -> CancelableReader -> ProgressReader -> encoder -> pipe -> HTTP body
//! request part -> ThrottledReader -> destination file
//! ```
//!
//! The [`pipe`] couples a producer and a consumer running on different
//! tasks. It holds at most one chunk, so the producer is throttled by the
//! consumer and nothing is buffered without bound.

pub mod cancel;
pub mod error;
pub mod pipe;
pub mod progress;
pub mod throttle;

pub use cancel::CancelableReader;
pub use error::{Cancelled, is_cancelled};
pub use pipe::{PipeReader, PipeWriter, pipe};
pub use progress::ProgressReader;
pub use throttle::ThrottledReader;

/// Cumulative bytes after which a [`ThrottledReader`] pauses.
pub const THROTTLE_THRESHOLD: usize = 32_000;

/// Buffer size used when copying between sources and sinks (32 KiB).
pub const COPY_BUFFER_SIZE: usize = 32 * 1024;
