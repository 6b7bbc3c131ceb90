//! Request routing
//!
//! Accepts only `GET /<secret>[?query] HTTP/1.0|1.1`. The method and protocol
//! tokens are matched as fixed byte prefix/suffix, the path must equal the
//! secret exactly, and the `q` query parameter picks the route. Everything else
//! is rejected, and a rejected request gets no response at all.

use url::form_urlencoded;

/// End of the header block
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

const METHOD_PREFIX: &[u8] = b"GET /";
const PROTOCOL_PREFIX: &[u8] = b" HTTP/1.";

/// Response protocol selected for an accepted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// multipart/x-mixed-replace frame stream
    Stream,
    /// Heartbeat lines for liveness monitors
    Ping,
    /// One-shot HTML viewer page
    Viewer,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Stream => "stream",
            Route::Ping => "ping",
            Route::Viewer => "viewer",
        }
    }

    fn from_query(q: Option<&str>) -> Self {
        match q {
            Some("ping") => Route::Ping,
            Some("viewer") => Route::Viewer,
            _ => Route::Stream,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a request was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Peer closed before sending a complete header block
    Incomplete,
    /// Header block exceeded the configured size limit
    TooLarge,
    /// No request line
    Empty,
    /// Request line is not `GET /... HTTP/1.x`
    MalformedRequestLine,
    /// Request target is not valid UTF-8
    InvalidEncoding,
    /// Path does not match the secret
    WrongSecret,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            RejectReason::Incomplete => "incomplete request",
            RejectReason::TooLarge => "request too large",
            RejectReason::Empty => "empty request",
            RejectReason::MalformedRequestLine => "malformed request line",
            RejectReason::InvalidEncoding => "invalid request encoding",
            RejectReason::WrongSecret => "wrong secret",
        };
        f.write_str(msg)
    }
}

/// Find the end of the header block
///
/// Returns the offset just past `\r\n\r\n`.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Classify a raw request
///
/// `raw` holds at least the complete header block; anything past the
/// terminator is ignored.
pub fn parse_request(raw: &[u8], secret: &str) -> Result<Route, RejectReason> {
    let end = find_header_end(raw).ok_or(RejectReason::Incomplete)?;
    let head = &raw[..end - HEADER_TERMINATOR.len()];

    let line = head.split(|b| *b == b'\n').next().unwrap_or_default();
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return Err(RejectReason::Empty);
    }

    let target = request_target(line).ok_or(RejectReason::MalformedRequestLine)?;
    let target = std::str::from_utf8(target).map_err(|_| RejectReason::InvalidEncoding)?;

    // Drop any fragment, then split path and query
    let target = target.split('#').next().unwrap_or_default();
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };

    if path != secret {
        return Err(RejectReason::WrongSecret);
    }

    // Blank values are treated as absent
    let q = form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == "q" && !value.is_empty())
        .map(|(_, value)| value.into_owned());

    Ok(Route::from_query(q.as_deref()))
}

/// Extract `<target>` from `GET /<target> HTTP/1.<0|1>`
fn request_target(line: &[u8]) -> Option<&[u8]> {
    let suffix_len = PROTOCOL_PREFIX.len() + 1;
    if line.len() < METHOD_PREFIX.len() + suffix_len || !line.starts_with(METHOD_PREFIX) {
        return None;
    }

    let (rest, version) = line.split_at(line.len() - 1);
    if !matches!(version, [b'0'] | [b'1']) || !rest.ends_with(PROTOCOL_PREFIX) {
        return None;
    }

    Some(&rest[METHOD_PREFIX.len()..rest.len() - PROTOCOL_PREFIX.len()])
}
