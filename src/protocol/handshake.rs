//! HTTP Upgrade handshake (RFC 6455 Section 4).
//!
//! Builds and validates both halves of the opening handshake. The head of
//! the HTTP message ends at the first blank line; callers locate it with
//! [`find_head_end`] and hand the bytes before it to [`HttpHead::parse`].

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Response written by a server that refuses an upgrade.
pub const BAD_REQUEST: &[u8] = b"HTTP/1.1 400 Bad Request\r\n\r\n";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Headers that must appear at most once.
const SINGLETON_HEADERS: [&str; 6] = [
    "host",
    "upgrade",
    "connection",
    "sec-websocket-key",
    "sec-websocket-version",
    "sec-websocket-accept",
];

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// # Example
///
/// ```
/// use streamws::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Fresh Sec-WebSocket-Key: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the OS random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce).map_err(|e| Error::Io(e.to_string()))?;
    Ok(BASE64.encode(nonce))
}

/// Offset just past the first CR LF CR LF at or after `from`.
///
/// `from` lets a caller resume scanning without re-reading bytes that were
/// already searched; it is moved back three bytes so a terminator split
/// across two reads is still found.
#[must_use]
pub fn find_head_end(buf: &[u8], from: usize) -> Option<usize> {
    let start = from.saturating_sub(HEAD_TERMINATOR.len() - 1);
    buf.get(start..)?
        .windows(HEAD_TERMINATOR.len())
        .position(|w| w == HEAD_TERMINATOR)
        .map(|pos| start + pos + HEAD_TERMINATOR.len())
}

fn validate_header_value(header: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Comma-separated, case-insensitive token membership (`Connection: keep-alive, Upgrade`).
fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Start line plus header map of an HTTP request or response head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead {
    /// Request line or status line.
    pub start_line: String,
    /// Header values keyed by lower-cased name.
    pub headers: HashMap<String, String>,
}

impl HttpHead {
    /// Parse a head (with or without its terminating blank line).
    ///
    /// Lines without a colon are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the head is not UTF-8, is empty,
    /// or repeats a header that must be unique.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::InvalidHandshake("Invalid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let start_line = lines
            .next()
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| Error::InvalidHandshake("Empty head".into()))?
            .trim()
            .to_string();

        let mut headers = HashMap::new();
        for line in lines.take_while(|l| !l.is_empty()) {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            if SINGLETON_HEADERS.contains(&name.as_str()) && headers.contains_key(&name) {
                return Err(Error::InvalidHandshake(format!("Duplicate header: {}", name)));
            }
            headers.insert(name, value.trim().to_string());
        }

        Ok(Self {
            start_line,
            headers,
        })
    }

    /// Header value by lower-cased name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    fn require(&self, name: &str, display: &str) -> Result<&str> {
        self.header(name)
            .ok_or_else(|| Error::InvalidHandshake(format!("Missing {} header", display)))
    }

    /// Checks shared by both directions: `Upgrade: websocket` and a
    /// `Connection` list containing `upgrade`.
    fn check_upgrade(&self) -> Result<()> {
        let upgrade = self.require("upgrade", "Upgrade")?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Upgrade header: {}",
                upgrade
            )));
        }
        let connection = self.require("connection", "Connection")?;
        if !has_token(connection, "upgrade") {
            return Err(Error::InvalidHandshake(format!(
                "Invalid Connection header: {}",
                connection
            )));
        }
        Ok(())
    }
}

/// Client side of the opening handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequest {
    /// Value of the Host header.
    pub host: String,
    /// Request target, e.g. `/chat`.
    pub path: String,
    /// Sub-protocols to offer, in preference order.
    pub protocols: Vec<String>,
    /// Additional headers written verbatim after the standard ones.
    pub headers: Vec<(String, String)>,
}

impl ClientRequest {
    #[must_use]
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
            protocols: Vec::new(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Serialize the upgrade request using `key` as Sec-WebSocket-Key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHeaderValue` if any caller-supplied value
    /// contains CR or LF.
    pub fn build(&self, key: &str) -> Result<Vec<u8>> {
        validate_header_value("Host", &self.host)?;
        validate_header_value("path", &self.path)?;

        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        buf.extend_from_slice(format!("Host: {}\r\n", self.host).as_bytes());
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        buf.extend_from_slice(format!("Sec-WebSocket-Key: {}\r\n", key).as_bytes());
        buf.extend_from_slice(b"Sec-WebSocket-Version: 13\r\n");

        if !self.protocols.is_empty() {
            let joined = self.protocols.join(", ");
            validate_header_value("Sec-WebSocket-Protocol", &joined)?;
            buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {}\r\n", joined).as_bytes());
        }

        for (name, value) in &self.headers {
            validate_header_value(name, name)?;
            validate_header_value(name, value)?;
            buf.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
        }

        buf.extend_from_slice(b"\r\n");
        Ok(buf)
    }
}

/// Validate a server's response to our upgrade request.
///
/// Returns the sub-protocol the server picked, if any.
///
/// # Errors
///
/// Returns `Error::InvalidHandshake` if:
/// - the status line is not `HTTP/1.x 101`
/// - `Upgrade`, `Connection` or `Sec-WebSocket-Accept` is missing or wrong
/// - protocols were requested and the server named none of them, or none
///   were requested and the server named one anyway
pub fn check_response(head: &HttpHead, sent_key: &str, requested: &[String]) -> Result<Option<String>> {
    let mut status = head.start_line.split_whitespace();
    let version = status.next().unwrap_or_default();
    let code = status.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") || code != "101" {
        return Err(Error::InvalidHandshake(format!(
            "Expected 101 status, got: {}",
            head.start_line
        )));
    }

    head.check_upgrade()?;

    let accept = head.require("sec-websocket-accept", "Sec-WebSocket-Accept")?;
    if accept != compute_accept_key(sent_key) {
        return Err(Error::InvalidHandshake("Sec-WebSocket-Accept mismatch".into()));
    }

    let protocol = head.header("sec-websocket-protocol");
    match (requested.is_empty(), protocol) {
        (true, None) => Ok(None),
        (true, Some(p)) => Err(Error::InvalidHandshake(format!(
            "Server selected protocol {} that was not requested",
            p
        ))),
        (false, None) => Err(Error::InvalidHandshake(
            "Server did not select a protocol".into(),
        )),
        (false, Some(p)) if requested.iter().any(|r| r == p) => Ok(Some(p.to_string())),
        (false, Some(p)) => Err(Error::InvalidHandshake(format!(
            "Server selected unknown protocol {}",
            p
        ))),
    }
}

/// Parsed upgrade request received by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request path (e.g., "/chat").
    pub path: String,
    /// The Host header value.
    pub host: String,
    /// The Sec-WebSocket-Key header value.
    pub key: String,
    /// Offered sub-protocols, in the client's order.
    pub protocols: Vec<String>,
}

impl HandshakeRequest {
    /// Validate an upgrade request head.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandshake`] if:
    /// - the request line is not `GET <path> HTTP/1.x`
    /// - `Host`, `Upgrade`, `Connection` or `Sec-WebSocket-Key` is missing
    /// - `Upgrade` is not `websocket` or `Connection` lacks `upgrade`
    /// - the key does not decode to 16 bytes
    /// - `Sec-WebSocket-Version` is not `13`
    pub fn from_head(head: &HttpHead) -> Result<Self> {
        let parts: Vec<&str> = head.start_line.split_whitespace().collect();
        let [method, path, version] = parts[..] else {
            return Err(Error::InvalidHandshake("Invalid request line".into()));
        };
        if method != "GET" {
            return Err(Error::InvalidHandshake(format!(
                "Expected GET method, got {}",
                method
            )));
        }
        if !version.starts_with("HTTP/1.") {
            return Err(Error::InvalidHandshake(format!(
                "Expected HTTP/1.x, got {}",
                version
            )));
        }

        let host = head.require("host", "Host")?.to_string();
        head.check_upgrade()?;

        let key = head.require("sec-websocket-key", "Sec-WebSocket-Key")?;
        match BASE64.decode(key) {
            Ok(nonce) if nonce.len() == 16 => {}
            Ok(nonce) => {
                return Err(Error::InvalidHandshake(format!(
                    "Sec-WebSocket-Key must be 16 bytes, got {}",
                    nonce.len()
                )));
            }
            Err(_) => {
                return Err(Error::InvalidHandshake(
                    "Invalid Sec-WebSocket-Key: not valid Base64".into(),
                ));
            }
        }

        let version = head.require("sec-websocket-version", "Sec-WebSocket-Version")?;
        if version != "13" {
            return Err(Error::InvalidHandshake(format!(
                "Unsupported WebSocket version: {} (expected 13)",
                version
            )));
        }

        let protocols = head
            .header("sec-websocket-protocol")
            .map(split_list)
            .unwrap_or_default();

        Ok(Self {
            path: path.to_string(),
            host,
            key: key.to_string(),
            protocols,
        })
    }

    /// Parse and validate a raw request head.
    ///
    /// # Errors
    ///
    /// See [`HttpHead::parse`] and [`HandshakeRequest::from_head`].
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_head(&HttpHead::parse(data)?)
    }
}

/// Serialize the `101 Switching Protocols` answer to a request carrying `key`.
///
/// # Errors
///
/// Returns `Error::InvalidHeaderValue` if `protocol` contains CR or LF.
pub fn build_response(key: &str, protocol: Option<&str>) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(160);
    buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.extend_from_slice(b"Upgrade: websocket\r\n");
    buf.extend_from_slice(b"Connection: Upgrade\r\n");
    buf.extend_from_slice(format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(key)).as_bytes());
    if let Some(proto) = protocol {
        validate_header_value("Sec-WebSocket-Protocol", proto)?;
        buf.extend_from_slice(format!("Sec-WebSocket-Protocol: {}\r\n", proto).as_bytes());
    }
    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}

/// Outcome of a completed handshake, delivered with the connected event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Negotiated {
    /// Agreed sub-protocol.
    pub protocol: Option<String>,
    /// Request path (the one sent, or the one received).
    pub path: String,
    /// Headers of the peer's handshake message, keyed by lower-cased name.
    pub headers: HashMap<String, String>,
}
