//! Session handshake and WebSocket upgrade.
//!
//! # Session Handshake
//!
//! An HTTP GET on `{url}/{io_path}/{protocol}` allocates a session. The
//! body is four colon-separated fields:
//!
//! ```text
//! {session_id}:{heartbeat_timeout}:{connection_timeout}:{transport,transport,...}
//! ```
//!
//! # Upgrade
//!
//! ```http
//! GET /socket.io/1/websocket/{session_id} HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! The server must answer with a status line starting `HTTP/1.1 101`.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rustc_hash::FxHashSet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Transport name that must be offered by the server.
pub const WEBSOCKET_TRANSPORT: &str = "websocket";

/// WebSocket protocol version sent in the upgrade request.
pub const WEBSOCKET_VERSION: u8 = 13;

/// Raw length of the `Sec-WebSocket-Key` nonce.
const KEY_LENGTH: usize = 16;

/// Bytes drawn from the RNG per block when building a key.
const KEY_BLOCK: usize = 16;

/// Expected prefix of the upgrade status line.
const SWITCHING_PROTOCOLS: &str = "HTTP/1.1 101";

// ============================================================================
// Session
// ============================================================================

/// Metadata negotiated by the session handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server-allocated session id.
    pub session_id: String,
    /// Heartbeat timeout in seconds (0 disables client heartbeats).
    pub heartbeat_timeout: u64,
    /// Connection timeout in seconds.
    pub connection_timeout: u64,
    /// Transports offered by the server.
    pub supported_transports: FxHashSet<String>,
}

impl Session {
    /// Parses a handshake response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] if the body has fewer than four
    /// fields, the timeouts are not integers, or `websocket` is not among
    /// the offered transports.
    pub fn parse(body: &str) -> Result<Self> {
        let fields: Vec<&str> = body.trim().split(':').collect();
        let [session_id, heartbeat, connection, transports, ..] = fields.as_slice() else {
            return Err(Error::handshake(format!("malformed handshake body: {body}")));
        };

        let heartbeat_timeout = parse_timeout("heartbeat", heartbeat)?;
        let connection_timeout = parse_timeout("connection", connection)?;

        let supported_transports: FxHashSet<String> = transports
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
            .collect();

        if !supported_transports.contains(WEBSOCKET_TRANSPORT) {
            return Err(Error::handshake(
                "server does not support the websocket transport",
            ));
        }

        Ok(Self {
            session_id: (*session_id).to_owned(),
            heartbeat_timeout,
            connection_timeout,
            supported_transports,
        })
    }

    /// Returns `true` if the server offered `transport`.
    #[inline]
    #[must_use]
    pub fn supports(&self, transport: &str) -> bool {
        self.supported_transports.contains(transport)
    }

    /// Returns the heartbeat timeout as a duration.
    #[inline]
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout)
    }
}

fn parse_timeout(name: &str, value: &str) -> Result<u64> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|_| Error::handshake(format!("invalid {name} timeout: {value}")))
}

// ============================================================================
// HandshakeResponse
// ============================================================================

/// HTTP status and headers of the session handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
}

impl HandshakeResponse {
    /// Returns the first header value matching `name`, case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Renders the headers one `name: value` per line.
    #[must_use]
    pub fn headers_text(&self) -> String {
        self.headers
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Negotiate
// ============================================================================

/// Options for the session handshake request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Connect and overall timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Verify the server certificate.
    pub verify_tls: bool,
    /// Log the negotiated session at debug level.
    pub debug: bool,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            verify_tls: true,
            debug: false,
        }
    }
}

/// Performs the session handshake.
///
/// # Errors
///
/// - [`Error::Handshake`] on transport failure, an empty or malformed
///   body, or a server without websocket support
/// - [`Error::HandshakeStatus`] if the status is not 200
pub async fn negotiate(
    url: &str,
    options: &HandshakeOptions,
) -> Result<(Session, HandshakeResponse)> {
    let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(!options.verify_tls);

    if let Some(ms) = options.timeout_ms {
        let timeout = Duration::from_millis(ms);
        builder = builder.connect_timeout(timeout).timeout(timeout);
    }

    let client = builder
        .build()
        .map_err(|e| Error::handshake(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::handshake(e.to_string()))?;

    let handshake_response = HandshakeResponse {
        status: response.status().as_u16(),
        headers: response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_owned(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect(),
    };

    if handshake_response.status != 200 {
        return Err(Error::handshake_status(
            handshake_response.status,
            handshake_response.headers_text(),
        ));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::handshake(e.to_string()))?;

    if body.is_empty() {
        return Err(Error::handshake("empty handshake response"));
    }

    let session = Session::parse(&body)?;

    if options.debug {
        debug!(
            session_id = %session.session_id,
            heartbeat_timeout = session.heartbeat_timeout,
            connection_timeout = session.connection_timeout,
            "Session handshake completed"
        );
    }

    Ok((session, handshake_response))
}

// ============================================================================
// Upgrade
// ============================================================================

/// Generates a base64 `Sec-WebSocket-Key` of `length` random bytes.
#[must_use]
pub fn generate_key(length: usize) -> String {
    let mut bytes = Vec::with_capacity(length + KEY_BLOCK);
    while bytes.len() < length {
        bytes.extend_from_slice(&rand::random::<[u8; KEY_BLOCK]>());
    }
    bytes.truncate(length);
    STANDARD.encode(bytes)
}

/// HTTP/1.1 upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request target.
    pub uri: String,
    /// `Host` header value.
    pub host: String,
    /// `Sec-WebSocket-Key` header value.
    pub key: String,
    /// `Sec-WebSocket-Version` header value.
    pub version: u8,
}

impl UpgradeRequest {
    /// Creates a request with a freshly generated key.
    #[must_use]
    pub fn new(uri: impl Into<String>, host: impl Into<String>) -> Self {
        Self::with_key(uri, host, generate_key(KEY_LENGTH))
    }

    /// Creates a request with the given key.
    #[must_use]
    pub fn with_key(uri: impl Into<String>, host: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            host: host.into(),
            key: key.into(),
            version: WEBSOCKET_VERSION,
        }
    }

    /// Renders the request head.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: {}\r\n\
             \r\n",
            self.uri, self.host, self.key, self.version
        )
        .into_bytes()
    }
}

/// Writes the upgrade request and consumes the response head.
///
/// Bytes after the blank line stay in `stream`'s buffer.
///
/// # Errors
///
/// - [`Error::Socket`] if the server closes without a status line or
///   before the headers end
/// - [`Error::Handshake`] if the status line is not `HTTP/1.1 101`
pub async fn upgrade<S>(stream: &mut S, request: &UpgradeRequest) -> Result<()>
where
    S: AsyncBufRead + AsyncWrite + Unpin,
{
    stream.write_all(&request.to_bytes()).await?;
    stream.flush().await?;

    let mut status_line = String::new();
    if stream.read_line(&mut status_line).await? == 0 {
        return Err(Error::socket(
            "server did not respond to the upgrade request",
        ));
    }

    if !status_line.starts_with(SWITCHING_PROTOCOLS) {
        return Err(Error::handshake(format!(
            "unexpected upgrade response, expected {SWITCHING_PROTOCOLS} got '{}'",
            status_line.trim_end()
        )));
    }

    loop {
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Err(Error::socket("upgrade response ended before the headers"));
        }
        if line.trim().is_empty() {
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
