//! Multipart boundary generation and validation.

use rand::Rng;

/// Random bytes per boundary (produces 60 hex characters).
const BOUNDARY_BYTES: usize = 30;

/// Longest boundary allowed by RFC 2046.
const MAX_BOUNDARY_LEN: usize = 70;

/// Generates a random boundary as a lowercase hex string.
pub fn generate_boundary() -> String {
    let mut bytes = [0u8; BOUNDARY_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Checks a boundary against the RFC 2046 character set and length.
pub fn is_valid_boundary(boundary: &str) -> bool {
    if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
        return false;
    }
    if boundary.ends_with(' ') {
        return false;
    }
    boundary.bytes().all(|b| {
        b.is_ascii_alphanumeric()
            || matches!(
                b,
                b'\'' | b'(' | b')' | b'+' | b'_' | b',' | b'-' | b'.' | b'/' | b':' | b'=' | b'?' | b' '
            )
    })
}
