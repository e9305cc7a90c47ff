//! Client entry point.
//!
//! [`Client`] wraps [`ClientOptions`] with a fluent surface and produces a
//! connected [`Socket`].

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::error::Result;
use crate::session::SessionEngine;
use crate::transport::MaybeTlsStream;

use super::options::ClientOptions;

// ============================================================================
// Types
// ============================================================================

/// Engine over a network stream, as returned by [`Client::connect`].
pub type Socket = SessionEngine<MaybeTlsStream>;

// ============================================================================
// Client
// ============================================================================

/// Connection factory.
///
/// # Example
///
/// ```no_run
/// use serde_json::json;
/// use socketio_legacy::{Callback, Client, Result};
///
/// # async fn example() -> Result<()> {
/// let mut socket = Client::new("http://localhost:3000")
///     .of("/chat")
///     .query([("token", "abc")])
///     .connect()
///     .await?;
///
/// socket.on("message", Callback::new(|data| {
///     println!("{data}");
///     Ok(())
/// }));
/// socket.emit("hello", vec![json!("world")]).await?;
/// socket.keep_alive().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    options: ClientOptions,
}

impl Client {
    /// Creates a client for `url` with default options.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_options(ClientOptions::new(url))
    }

    /// Creates a client from prepared options.
    #[inline]
    #[must_use]
    pub fn with_options(options: ClientOptions) -> Self {
        Self { options }
    }

    /// Returns the options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Returns `{url}/{io_path}/{protocol}`.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> String {
        self.options.base_url()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Sets the socket.io path segment.
    #[must_use]
    pub fn io_path(mut self, io_path: impl Into<String>) -> Self {
        self.options = self.options.with_io_path(io_path);
        self
    }

    /// Sets the protocol version segment.
    #[must_use]
    pub fn protocol(mut self, protocol: u32) -> Self {
        self.options = self.options.with_protocol(protocol);
        self
    }

    /// Enables or disables the connect acknowledgement check.
    #[must_use]
    pub fn read_connect_ack(mut self, enabled: bool) -> Self {
        self.options = self.options.with_read_connect_ack(enabled);
        self
    }

    /// Accepts any server certificate.
    #[must_use]
    pub fn skip_tls_verify(mut self) -> Self {
        self.options = self.options.with_verify_tls(false);
        self
    }

    /// Enables or disables debug logging.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.options = self.options.with_debug(enabled);
        self
    }

    /// Joins `namespace` after connecting.
    #[must_use]
    pub fn of(mut self, namespace: impl Into<String>) -> Self {
        self.options = self.options.with_namespace(namespace);
        self
    }

    /// Adds query parameters to the handshake and upgrade requests.
    ///
    /// Ignored when `params` is empty.
    #[must_use]
    pub fn query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.options = self.options.with_query(params);
        self
    }

    /// Sets the handshake timeout in milliseconds.
    #[must_use]
    pub fn handshake_timeout(mut self, ms: u64) -> Self {
        self.options = self.options.with_handshake_timeout(ms);
        self
    }

    /// Enables or disables 64-bit frame lengths on decode.
    #[must_use]
    pub fn large_frames(mut self, enabled: bool) -> Self {
        self.options = self.options.with_large_frames(enabled);
        self
    }

    // ========================================================================
    // Connecting
    // ========================================================================

    /// Connects and returns the socket.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) for an invalid URL
    /// - any error of [`SessionEngine::connect`]
    pub async fn connect(&self) -> Result<Socket> {
        let target = self.options.connect_target()?;
        let mut socket = Socket::new(self.options.engine_config());
        socket.connect(&target).await?;

        if self.options.debug {
            debug!(url = %self.options.url, "Client connected");
        }
        Ok(socket)
    }

    /// Connects, then runs `on_ready` on the socket.
    ///
    /// Use `on_ready` to register callbacks and emit the first events
    /// before calling [`SessionEngine::keep_alive`]. If it fails, the
    /// socket is disconnected and the error returned.
    ///
    /// # Errors
    ///
    /// As [`connect`](Self::connect), plus the error of `on_ready`.
    pub async fn connection<F>(&self, on_ready: F) -> Result<Socket>
    where
        F: AsyncFnOnce(&mut Socket) -> Result<()>,
    {
        let mut socket = self.connect().await?;

        if let Err(e) = on_ready(&mut socket).await {
            // Keep the callback error over a failed disconnect write.
            let _ = socket.disconnect().await;
            return Err(e);
        }
        Ok(socket)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::error::Error;

    #[test]
    fn test_fluent_configuration() {
        let client = Client::new("https://example.com")
            .io_path("io")
            .protocol(2)
            .read_connect_ack(false)
            .skip_tls_verify()
            .debug(true)
            .of("/chat")
            .query([("a", "1")])
            .handshake_timeout(500)
            .large_frames(true);

        let options = client.options();
        assert_eq!(client.base_url(), "https://example.com/io/2");
        assert!(!options.read_connect_ack);
        assert!(!options.verify_tls);
        assert!(options.debug);
        assert_eq!(options.namespace.as_deref(), Some("/chat"));
        assert_eq!(options.query.as_deref(), Some("?a=1"));
        assert_eq!(options.handshake_timeout_ms, Some(500));
        assert!(options.large_frames);
    }

    #[test]
    fn test_empty_query_ignored() {
        let client = Client::new("http://localhost").query(Vec::<(String, String)>::new());
        assert!(client.options().query.is_none());
    }

    #[tokio::test]
    async fn test_connect_invalid_url() {
        let err = Client::new("ws://localhost:3000").connect().await.unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_connect_handshake_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let err = Client::new(format!("http://127.0.0.1:{port}"))
            .handshake_timeout(5_000)
            .connect()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::HandshakeStatus { status: 403, .. }));
        server.await.unwrap();
    }
}
