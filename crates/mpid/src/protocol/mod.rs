//! HTTP-shaped framing for MPI requests and responses.
//!
//! A request is a request line (`<METHOD> <target> <version>`), headers up to
//! a blank line, then exactly `Content-Length` body bytes. The final `/`
//! segment of the target names the operation. One request and one response
//! travel per connection.

use std::fmt;
use std::io::{self, BufRead, Read};

use thiserror::Error;

/// Upper bound on the request line plus headers.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Default bound a client places on response bodies.
pub const MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;

const SERVER_NAME: &str = "OSConfig";
const CONTENT_TYPE: &str = "application/json";

/// Errors raised while decoding a request or response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer closed the connection before sending a request line.
    #[error("connection closed before a request line was received")]
    MissingRequestLine,
    /// The request line does not carry a target.
    #[error("malformed request line '{line}'")]
    MalformedRequestLine {
        /// Offending line.
        line: String,
    },
    /// The target has no final path segment.
    #[error("request target '{target}' does not name an operation")]
    MissingUri {
        /// Offending target.
        target: String,
    },
    /// The status line of a response could not be parsed.
    #[error("malformed status line '{line}'")]
    MalformedStatusLine {
        /// Offending line.
        line: String,
    },
    /// A header line lacks a `:` separator.
    #[error("malformed header '{line}'")]
    MalformedHeader {
        /// Offending line.
        line: String,
    },
    /// Header bytes are not valid UTF-8.
    #[error("header block is not valid UTF-8")]
    NotUtf8,
    /// No `Content-Length` header was sent.
    #[error("missing Content-Length header")]
    MissingContentLength,
    /// `Content-Length` is not a non-negative integer.
    #[error("invalid Content-Length '{value}'")]
    InvalidContentLength {
        /// Header value as received.
        value: String,
    },
    /// The header block or body exceeds its limit.
    #[error("{part} exceeds the {limit} byte limit")]
    RequestTooLarge {
        /// Which part of the message overflowed.
        part: &'static str,
        /// Limit in bytes.
        limit: usize,
    },
    /// The peer closed the connection mid-message.
    #[error("connection closed after {received} of {expected} body bytes")]
    Truncated {
        /// Declared body length.
        expected: usize,
        /// Bytes actually read.
        received: usize,
    },
    /// The peer closed the connection inside the header block.
    #[error("connection closed inside the header block")]
    IncompleteHeaders,
    /// Reading from the stream failed.
    #[error("failed to read message: {0}")]
    Io(#[from] io::Error),
}

/// A decoded MPI request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    uri: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Request {
    /// Request method; informational only.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Operation token taken from the last path segment of the target.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Headers in the order and case received.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Body bytes; exactly `Content-Length` long.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

/// Status codes emitted by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// `200 OK`.
    pub const OK: Self = Self(200);
    /// `400 Bad Request`.
    pub const BAD_REQUEST: Self = Self(400);
    /// `404 Not Found`.
    pub const NOT_FOUND: Self = Self(404);
    /// `500 Internal Server Error`.
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    /// Wraps a raw status code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Reason phrase derived from the code alone.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            500 => "Internal Server Error",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} {}", self.0, self.reason())
    }
}

/// A response ready to be framed onto the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: StatusCode,
    body: String,
}

impl Response {
    /// Builds a response with the given body.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Builds a bodiless response.
    #[must_use]
    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, String::new())
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Response body.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Frames the response as status line, fixed headers and body.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let head = format!(
            "HTTP/1.1 {status}\r\nServer: {SERVER_NAME}\r\nContent-Type: {CONTENT_TYPE}\r\nContent-Length: {length}\r\n\r\n",
            status = self.status,
            length = self.body.len(),
        );
        let mut framed = head.into_bytes();
        framed.extend_from_slice(self.body.as_bytes());
        framed
    }
}

/// Decodes one request, bounding the body to `max_body_bytes`.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the stream does not carry a complete,
/// well-formed request within the limits.
pub fn parse_request<R: BufRead>(
    reader: &mut R,
    max_body_bytes: usize,
) -> Result<Request, ProtocolError> {
    let mut budget = MAX_HEADER_BYTES;
    let line = read_line(reader, &mut budget)?.ok_or(ProtocolError::MissingRequestLine)?;

    let mut parts = line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ProtocolError::MalformedRequestLine { line });
    };
    let uri = target
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| ProtocolError::MissingUri {
            target: target.to_owned(),
        })?
        .to_owned();
    let method = method.to_owned();

    let headers = read_headers(reader, &mut budget)?;
    let length = content_length(&headers)?;
    if length > max_body_bytes {
        return Err(ProtocolError::RequestTooLarge {
            part: "request body",
            limit: max_body_bytes,
        });
    }
    let body = read_body(reader, length)?;

    Ok(Request {
        method,
        uri,
        headers,
        body,
    })
}

/// Decodes one response, bounding the body to `max_body_bytes`; used by
/// clients of the socket.
///
/// # Errors
///
/// Returns a [`ProtocolError`] when the stream does not carry a complete,
/// well-formed response within the limits.
pub fn parse_response<R: BufRead>(
    reader: &mut R,
    max_body_bytes: usize,
) -> Result<Response, ProtocolError> {
    let mut budget = MAX_HEADER_BYTES;
    let line = read_line(reader, &mut budget)?.ok_or(ProtocolError::MissingRequestLine)?;
    let code = line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| ProtocolError::MalformedStatusLine { line: line.clone() })?;

    let headers = read_headers(reader, &mut budget)?;
    let length = content_length(&headers)?;
    if length > max_body_bytes {
        return Err(ProtocolError::RequestTooLarge {
            part: "response body",
            limit: max_body_bytes,
        });
    }
    let body = read_body(reader, length)?;
    let text = String::from_utf8(body).map_err(|_| ProtocolError::NotUtf8)?;
    Ok(Response::new(StatusCode::new(code), text))
}

fn read_headers<R: BufRead>(
    reader: &mut R,
    budget: &mut usize,
) -> Result<Vec<(String, String)>, ProtocolError> {
    let mut headers = Vec::new();
    loop {
        let line = read_line(reader, budget)?.ok_or(ProtocolError::IncompleteHeaders)?;
        if line.is_empty() {
            return Ok(headers);
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(ProtocolError::MalformedHeader { line });
        };
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }
}

fn content_length(headers: &[(String, String)]) -> Result<usize, ProtocolError> {
    let (_, value) = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Content-Length"))
        .ok_or(ProtocolError::MissingContentLength)?;
    value
        .parse()
        .map_err(|_| ProtocolError::InvalidContentLength {
            value: value.clone(),
        })
}

// Reads one CRLF- or LF-terminated line, charging it against `budget`.
fn read_line<R: BufRead>(reader: &mut R, budget: &mut usize) -> Result<Option<String>, ProtocolError> {
    let mut buffer = Vec::new();
    let limit = u64::try_from(budget.saturating_add(1)).unwrap_or(u64::MAX);
    reader.by_ref().take(limit).read_until(b'\n', &mut buffer)?;

    if buffer.is_empty() {
        return Ok(None);
    }
    if buffer.len() > *budget {
        return Err(ProtocolError::RequestTooLarge {
            part: "header block",
            limit: MAX_HEADER_BYTES,
        });
    }
    if buffer.last() != Some(&b'\n') {
        return Err(ProtocolError::IncompleteHeaders);
    }
    *budget = budget.saturating_sub(buffer.len());

    let text = String::from_utf8(buffer).map_err(|_| ProtocolError::NotUtf8)?;
    Ok(Some(text.trim_end_matches(['\r', '\n']).to_owned()))
}

fn read_body<R: Read>(reader: &mut R, length: usize) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::with_capacity(length);
    let limit = u64::try_from(length).unwrap_or(u64::MAX);
    reader.by_ref().take(limit).read_to_end(&mut body)?;
    if body.len() < length {
        return Err(ProtocolError::Truncated {
            expected: length,
            received: body.len(),
        });
    }
    Ok(body)
}
