//! Multipart framing helpers.
//!
//! # Wire format
//!
//! ```text
//! --<boundary>\r\n
//! Content-Disposition: form-data; name="<key>"\r\n
//! \r\n
//! <value>
//! \r\n--<boundary>\r\n
//! Content-Disposition: form-data; name="object"; filename="<name>"\r\n
//! Content-Type: application/octet-stream\r\n
//! \r\n
//! <file bytes>
//! \r\n--<boundary>--\r\n
//! ```
//!
//! Every part after the first is introduced by the delimiter
//! `\r\n--<boundary>`; the body ends with the delimiter followed by `--`.

use crate::error::MultipartError;
use crate::{FORM_DATA, is_valid_boundary};

/// Content type of the binary object part.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Headers of a single part, reduced to what the receiver needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    /// Form field name from `Content-Disposition`.
    pub name: String,
    /// Declared file name (base name only), if any.
    pub filename: Option<String>,
    /// Part `Content-Type`, if present.
    pub content_type: Option<String>,
}

/// Returns the request content type for `boundary`.
pub fn form_data_content_type(boundary: &str) -> String {
    if boundary.contains(|c: char| !c.is_ascii_alphanumeric() && c != '-' && c != '_') {
        format!("{FORM_DATA}; boundary=\"{boundary}\"")
    } else {
        format!("{FORM_DATA}; boundary={boundary}")
    }
}

/// Opening of a part: delimiter line (preceded by CRLF unless first).
fn part_opening(boundary: &str, first: bool) -> String {
    if first {
        format!("--{boundary}\r\n")
    } else {
        format!("\r\n--{boundary}\r\n")
    }
}

/// Encodes the headers of a plain form field.
pub fn field_header(boundary: &str, name: &str, first: bool) -> String {
    format!(
        "{}Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
        part_opening(boundary, first),
        escape_quotes(name)
    )
}

/// Encodes the headers of a file part.
pub fn file_header(boundary: &str, name: &str, filename: &str, first: bool) -> String {
    format!(
        "{}Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {OCTET_STREAM}\r\n\r\n",
        part_opening(boundary, first),
        escape_quotes(name),
        escape_quotes(filename)
    )
}

/// Encodes the final delimiter.
pub fn closing_delimiter(boundary: &str, first: bool) -> String {
    if first {
        format!("--{boundary}--\r\n")
    } else {
        format!("\r\n--{boundary}--\r\n")
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Extracts the boundary from a request `Content-Type`.
///
/// The value must start with `multipart/form-data`; anything else is an
/// [`MultipartError::UnsupportedMediaType`].
pub fn boundary_from_content_type(value: &str) -> Result<String, MultipartError> {
    if !value.starts_with(FORM_DATA) {
        return Err(MultipartError::UnsupportedMediaType(value.to_string()));
    }

    let mut segments = split_params(value).into_iter();
    let media_type = segments.next().unwrap_or_default();
    if !media_type.trim().eq_ignore_ascii_case(FORM_DATA) {
        return Err(MultipartError::UnsupportedMediaType(value.to_string()));
    }

    let boundary = segments
        .filter_map(|segment| parse_param(&segment))
        .find(|(key, _)| key.eq_ignore_ascii_case("boundary"))
        .map(|(_, v)| v)
        .ok_or(MultipartError::MissingBoundary)?;

    if !is_valid_boundary(&boundary) {
        return Err(MultipartError::InvalidBoundary(boundary));
    }
    Ok(boundary)
}

/// Parses a raw header block (without the terminating blank line).
pub fn parse_part_headers(block: &[u8]) -> Result<PartHeaders, MultipartError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| MultipartError::Malformed("part headers are not valid UTF-8".into()))?;

    let mut headers = PartHeaders::default();
    let mut saw_disposition = false;

    for line in text.split("\r\n").filter(|l| !l.is_empty()) {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| MultipartError::Malformed(format!("invalid header line: {line}")))?;
        let value = value.trim();

        if key.trim().eq_ignore_ascii_case("content-disposition") {
            saw_disposition = true;
            parse_disposition(value, &mut headers)?;
        } else if key.trim().eq_ignore_ascii_case("content-type") {
            headers.content_type = Some(value.to_string());
        }
    }

    if !saw_disposition {
        return Err(MultipartError::Malformed(
            "part without Content-Disposition".into(),
        ));
    }
    Ok(headers)
}

fn parse_disposition(value: &str, headers: &mut PartHeaders) -> Result<(), MultipartError> {
    let mut segments = split_params(value).into_iter();
    let kind = segments.next().unwrap_or_default();
    if !kind.trim().eq_ignore_ascii_case("form-data") {
        return Err(MultipartError::Malformed(format!(
            "unexpected disposition: {}",
            kind.trim()
        )));
    }

    for (key, val) in segments.filter_map(|s| parse_param(&s)) {
        if key.eq_ignore_ascii_case("name") {
            headers.name = val;
        } else if key.eq_ignore_ascii_case("filename") {
            headers.filename = base_name(&val);
        }
    }
    Ok(())
}

/// Strips any directory components a sender put in a file name.
fn base_name(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match base {
        "" | "." | ".." => None,
        b => Some(b.to_string()),
    }
}

/// Splits a header value on `;`, leaving quoted strings intact.
fn split_params(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ';' if !in_quotes => out.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    out.push(current);
    out
}

/// Parses `key=value` or `key="quoted \"value\""`.
fn parse_param(segment: &str) -> Option<(String, String)> {
    let (key, raw) = segment.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    let value = match raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        Some(quoted) => {
            let mut out = String::with_capacity(quoted.len());
            let mut chars = quoted.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(next) = chars.next() {
                        out.push(next);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => raw.to_string(),
    };
    Some((key.to_string(), value))
}
