//! Client configuration.
//!
//! [`ClientOptions`] holds every connection knob and derives the pieces the
//! engine needs: the handshake URL, the network [`Endpoint`], the
//! [`HandshakeOptions`] and the [`EngineConfig`].
//!
//! # Example
//!
//! ```
//! use socketio_legacy::ClientOptions;
//!
//! let options = ClientOptions::new("http://localhost:3000")
//!     .with_namespace("/chat")
//!     .with_query([("token", "abc")])
//!     .with_handshake_timeout(2_000);
//!
//! assert_eq!(options.handshake_url(), "http://localhost:3000/socket.io/1?token=abc");
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::error::Result;
use crate::protocol::FrameCodec;
use crate::session::{ConnectTarget, EngineConfig};
use crate::transport::{Endpoint, HandshakeOptions};

// ============================================================================
// Constants
// ============================================================================

/// Default path segment of the socket.io endpoint.
pub const DEFAULT_IO_PATH: &str = "socket.io";

/// Default socket.io protocol version.
pub const DEFAULT_PROTOCOL: u32 = 1;

// ============================================================================
// ClientOptions
// ============================================================================

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Server base URL (`http` or `https`).
    pub url: String,

    /// Path segment of the socket.io endpoint.
    pub io_path: String,

    /// Protocol version segment.
    pub protocol: u32,

    /// Require the `1::` frame after the upgrade.
    pub read_connect_ack: bool,

    /// Verify the server certificate.
    pub verify_tls: bool,

    /// Log traffic at debug level.
    pub debug: bool,

    /// Namespace to join after connecting.
    pub namespace: Option<String>,

    /// Encoded query string including the leading `?`.
    pub query: Option<String>,

    /// Handshake connect and overall timeout in milliseconds.
    pub handshake_timeout_ms: Option<u64>,

    /// Accept frames with 64-bit extended lengths.
    pub large_frames: bool,
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientOptions {
    /// Creates options for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            io_path: DEFAULT_IO_PATH.to_owned(),
            protocol: DEFAULT_PROTOCOL,
            read_connect_ack: true,
            verify_tls: true,
            debug: false,
            namespace: None,
            query: None,
            handshake_timeout_ms: None,
            large_frames: false,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientOptions {
    /// Sets the socket.io path segment.
    #[inline]
    #[must_use]
    pub fn with_io_path(mut self, io_path: impl Into<String>) -> Self {
        self.io_path = io_path.into();
        self
    }

    /// Sets the protocol version segment.
    #[inline]
    #[must_use]
    pub fn with_protocol(mut self, protocol: u32) -> Self {
        self.protocol = protocol;
        self
    }

    /// Enables or disables the connect acknowledgement check.
    #[inline]
    #[must_use]
    pub fn with_read_connect_ack(mut self, enabled: bool) -> Self {
        self.read_connect_ack = enabled;
        self
    }

    /// Enables or disables certificate verification.
    #[inline]
    #[must_use]
    pub fn with_verify_tls(mut self, enabled: bool) -> Self {
        self.verify_tls = enabled;
        self
    }

    /// Enables or disables debug logging.
    #[inline]
    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Sets the namespace.
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the query parameters.
    ///
    /// An empty iterator leaves any existing query untouched.
    #[must_use]
    pub fn with_query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if let Some(query) = encode_query(params) {
            self.query = Some(query);
        }
        self
    }

    /// Sets the handshake timeout in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, ms: u64) -> Self {
        self.handshake_timeout_ms = Some(ms);
        self
    }

    /// Enables or disables 64-bit frame lengths on decode.
    #[inline]
    #[must_use]
    pub fn with_large_frames(mut self, enabled: bool) -> Self {
        self.large_frames = enabled;
        self
    }
}

// ============================================================================
// Derived Settings
// ============================================================================

impl ClientOptions {
    /// Returns `{url}/{io_path}/{protocol}` without the query.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.url.trim_end_matches('/'),
            self.io_path.trim_matches('/'),
            self.protocol
        )
    }

    /// Returns the session handshake URL including the query.
    #[must_use]
    pub fn handshake_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url(),
            self.query.as_deref().unwrap_or_default()
        )
    }

    /// Parses the network endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid URL.
    pub fn endpoint(&self) -> Result<Endpoint> {
        Endpoint::parse(&self.base_url())
    }

    /// Returns the handshake request options.
    #[inline]
    #[must_use]
    pub fn handshake_options(&self) -> HandshakeOptions {
        HandshakeOptions {
            timeout_ms: self.handshake_timeout_ms,
            verify_tls: self.verify_tls,
            debug: self.debug,
        }
    }

    /// Returns the engine settings.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            namespace: self.namespace.clone(),
            read_connect_ack: self.read_connect_ack,
            debug: self.debug,
            codec: FrameCodec::new().with_large_frames(self.large_frames),
        }
    }

    /// Returns everything needed to connect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid URL.
    pub fn connect_target(&self) -> Result<ConnectTarget> {
        Ok(ConnectTarget {
            handshake_url: self.handshake_url(),
            endpoint: self.endpoint()?,
            query: self.query.clone(),
            handshake: self.handshake_options(),
        })
    }
}

/// Percent-encodes `params` as `?k=v&k=v`, or `None` when empty.
fn encode_query<K, V>(params: impl IntoIterator<Item = (K, V)>) -> Option<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let pairs: Vec<String> = params
        .into_iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key.as_ref()),
                urlencoding::encode(value.as_ref())
            )
        })
        .collect();

    (!pairs.is_empty()).then(|| format!("?{}", pairs.join("&")))
}

// ============================================================================
// Tests
// ============================================================================
