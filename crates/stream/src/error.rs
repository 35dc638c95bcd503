//! Error types shared by the read adapters.

use std::io;

/// Cooperative cancellation observed at a read boundary.
///
/// Travels inside an [`io::Error`] so adapters keep the `AsyncRead`
/// contract; use [`is_cancelled`] to tell it apart from real I/O faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cancelled")]
pub struct Cancelled;

impl From<Cancelled> for io::Error {
    fn from(value: Cancelled) -> Self {
        io::Error::other(value)
    }
}

/// Returns `true` if `err` carries a [`Cancelled`] marker.
pub fn is_cancelled(err: &io::Error) -> bool {
    err.get_ref().is_some_and(|inner| inner.is::<Cancelled>())
}
