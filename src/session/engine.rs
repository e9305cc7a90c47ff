//! Session engine and keepalive loop.
//!
//! A [`SessionEngine`] owns one upgraded stream and drives it from a single
//! task. Every operation takes `&mut self`, so sends, heartbeats and frame
//! reads never interleave.
//!
//! # Keepalive Loop
//!
//! Each iteration of [`SessionEngine::keep_alive`]:
//!
//! 1. Honours a pending [`DisconnectHandle`] request
//! 2. Sends a heartbeat when one is due
//! 3. Waits up to 5 seconds for the stream to become readable
//! 4. Decodes one frame and dispatches it if it is an event
//!
//! The loop ends when the peer closes the stream or the engine is
//! disconnected. Decode and callback errors end it with an `Err`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{FrameCodec, Opcode, Packet, PacketType};
use crate::transport::{
    Endpoint, HandshakeOptions, HandshakeResponse, MaybeTlsStream, Session, UpgradeRequest,
    handshake, stream,
};

use super::callbacks::{Callback, CallbackRegistry};
use super::state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Pause after every send.
const SEND_THROTTLE: Duration = Duration::from_millis(100);

/// Maximum wait for the stream to become readable per loop iteration.
const READ_WAIT: Duration = Duration::from_secs(5);

/// Heartbeats are sent this long before the server timeout expires.
const HEARTBEAT_MARGIN: Duration = Duration::from_secs(5);

/// Payload the server sends once the client is connected.
const CONNECT_ACK: &[u8] = b"1::";

// ============================================================================
// EngineConfig
// ============================================================================

/// Per-engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Namespace joined after the upgrade and attached to emitted events.
    pub namespace: Option<String>,
    /// Require the `1::` frame after the upgrade.
    pub read_connect_ack: bool,
    /// Log traffic at debug level.
    pub debug: bool,
    /// Frame codec.
    pub codec: FrameCodec,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            read_connect_ack: true,
            debug: false,
            codec: FrameCodec::new(),
        }
    }
}

// ============================================================================
// ConnectTarget
// ============================================================================

/// Everything [`SessionEngine::connect`] needs to reach a server.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    /// Full handshake URL including the query string.
    pub handshake_url: String,
    /// Host, port and base path of the server.
    pub endpoint: Endpoint,
    /// Query string appended to the upgrade URI, with its leading `?`.
    pub query: Option<String>,
    /// Handshake request options.
    pub handshake: HandshakeOptions,
}

impl ConnectTarget {
    /// Returns the upgrade request target for `session_id`.
    #[must_use]
    pub fn upgrade_uri(&self, session_id: &str) -> String {
        format!(
            "{}/{}/{session_id}{}",
            self.endpoint.path,
            handshake::WEBSOCKET_TRANSPORT,
            self.query.as_deref().unwrap_or_default()
        )
    }
}

// ============================================================================
// DisconnectHandle
// ============================================================================

/// Requests a disconnect from outside the keepalive loop.
///
/// Callbacks run inside the loop and cannot borrow the engine, so they
/// hold a clone of this handle instead. The request is honoured at the
/// start of the next loop iteration.
#[derive(Debug, Clone, Default)]
pub struct DisconnectHandle(Arc<AtomicBool>);

impl DisconnectHandle {
    /// Requests a disconnect.
    #[inline]
    pub fn disconnect(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once a disconnect was requested.
    #[inline]
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// SessionEngine
// ============================================================================

/// Outcome of waiting for one frame.
enum Incoming {
    /// Nothing arrived within the read wait.
    Idle,
    /// The peer closed the stream.
    Closed,
    /// One frame payload.
    Frame(Vec<u8>),
}

/// Connection state machine over a single stream.
///
/// The stream stays wrapped in a [`BufReader`] for the engine's lifetime so
/// bytes that arrive together with the upgrade response are not lost.
///
/// # Drop
///
/// Dropping a connected engine sends a best-effort disconnect packet on a
/// spawned task when a tokio runtime is available.
pub struct SessionEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Current lifecycle state.
    state: ConnectionState,
    /// Upgraded stream, present while connected.
    stream: Option<BufReader<S>>,
    /// Negotiated session, present while connected.
    session: Option<Session>,
    /// Status and headers of the session handshake.
    response: Option<HandshakeResponse>,
    /// Engine settings.
    config: EngineConfig,
    /// Event callbacks.
    callbacks: CallbackRegistry,
    /// When the last heartbeat (or the connection) was sent.
    last_heartbeat: Instant,
    /// Shared disconnect request flag.
    disconnect: DisconnectHandle,
}

impl<S> SessionEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Creates an unconnected engine.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            state: ConnectionState::Unconnected,
            stream: None,
            session: None,
            response: None,
            config,
            callbacks: CallbackRegistry::new(),
            last_heartbeat: Instant::now(),
            disconnect: DisconnectHandle::default(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Returns `true` while frames can be exchanged.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected && self.stream.is_some()
    }

    /// Returns the negotiated session while connected.
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Returns the session handshake status and headers.
    #[inline]
    #[must_use]
    pub fn handshake_response(&self) -> Option<&HandshakeResponse> {
        self.response.as_ref()
    }

    /// Returns the configured namespace.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.config.namespace.as_deref()
    }

    /// Returns a handle that requests a disconnect from a callback.
    #[inline]
    #[must_use]
    pub fn disconnect_handle(&self) -> DisconnectHandle {
        self.disconnect.clone()
    }

    // ========================================================================
    // Connection
    // ========================================================================

    /// Upgrades `stream` and joins the configured namespace.
    ///
    /// On success the engine is [`ConnectionState::Connected`] and the
    /// heartbeat clock starts. On failure it is reset to
    /// [`ConnectionState::Unconnected`] with no session.
    ///
    /// # Errors
    ///
    /// - [`Error::Socket`] if the engine was already connected or
    ///   disconnected, or the server sent nothing back
    /// - [`Error::Handshake`] for a non-101 status or a missing `1::`
    ///   acknowledgement
    pub async fn establish(
        &mut self,
        stream: S,
        session: Session,
        request: &UpgradeRequest,
    ) -> Result<()> {
        match self.state {
            ConnectionState::Unconnected | ConnectionState::Handshaking => {}
            other => {
                return Err(Error::socket(format!("cannot upgrade a {other} engine")));
            }
        }

        self.state = ConnectionState::Upgrading;
        let result = self.upgrade_stream(stream, session, request).await;
        if result.is_err() {
            self.reset();
        }
        result
    }

    async fn upgrade_stream(
        &mut self,
        stream: S,
        session: Session,
        request: &UpgradeRequest,
    ) -> Result<()> {
        let mut stream = BufReader::new(stream);
        handshake::upgrade(&mut stream, request).await?;
        if self.config.debug {
            debug!(uri = %request.uri, "WebSocket upgrade accepted");
        }

        if self.config.read_connect_ack {
            let payload = self.config.codec.decode(&mut stream).await?;
            if payload != CONNECT_ACK {
                return Err(Error::handshake(format!(
                    "server did not acknowledge the connection, got '{}'",
                    String::from_utf8_lossy(&payload)
                )));
            }
            if self.config.debug {
                debug!("Server acknowledged the connection");
            }
        }

        self.stream = Some(stream);
        self.session = Some(session);
        self.state = ConnectionState::Connected;

        if let Some(namespace) = self.config.namespace.clone() {
            self.send_packet(&Packet::connect(namespace)).await?;
        }

        self.last_heartbeat = Instant::now();

        if self.config.debug {
            debug!(
                session_id = self.session.as_ref().map(|s| s.session_id.as_str()),
                namespace = self.namespace(),
                "Connected"
            );
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.stream = None;
        self.session = None;
        self.response = None;
        self.state = ConnectionState::Unconnected;
    }

    fn mark_closed(&mut self) {
        self.stream = None;
        self.session = None;
        self.state = ConnectionState::Disconnected;
        if self.config.debug {
            debug!("Peer closed the connection");
        }
    }

    // ========================================================================
    // Sending
    // ========================================================================

    /// Sends a packet built from raw fields.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] if `packet_type` is above 8; nothing is
    ///   written
    /// - [`Error::ConnectionClosed`] if the engine is not connected
    pub async fn send(
        &mut self,
        packet_type: u8,
        id: Option<&str>,
        endpoint: Option<&str>,
        data: Option<&str>,
    ) -> Result<()> {
        let mut packet = Packet::new(PacketType::try_from(packet_type)?);
        if let Some(id) = id {
            packet = packet.with_id(id);
        }
        if let Some(endpoint) = endpoint {
            packet = packet.with_endpoint(endpoint);
        }
        if let Some(data) = data {
            packet = packet.with_data(data);
        }
        self.send_packet(&packet).await
    }

    /// Writes `packet` as one masked text frame, then pauses 100 ms.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the engine has no stream, or
    /// [`Error::Io`] if the write fails.
    pub async fn send_packet(&mut self, packet: &Packet) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;

        let raw = packet.to_string();
        let frame = self.config.codec.encode(raw.as_bytes(), Opcode::Text, true);
        stream.write_all(&frame).await?;
        stream.flush().await?;

        if self.config.debug {
            debug!(packet = %raw, "Sent packet");
        }

        sleep(SEND_THROTTLE).await;
        Ok(())
    }

    /// Emits an event to the configured namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if `args` cannot be serialized, otherwise
    /// as [`send_packet`](Self::send_packet).
    pub async fn emit(&mut self, event: &str, args: Vec<Value>) -> Result<()> {
        let packet = Packet::event(event, args, self.namespace())?;
        self.send_packet(&packet).await
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Registers `callback` for `event`.
    ///
    /// Returns `false` if the same handle is already registered for it.
    pub fn on(&mut self, event: impl Into<String>, callback: Callback) -> bool {
        let event = event.into();
        let added = self.callbacks.register(event.clone(), callback);
        if self.config.debug {
            debug!(event = %event, added, "Registered callback");
        }
        added
    }

    // ========================================================================
    // Keepalive
    // ========================================================================

    /// Runs the keepalive loop until the connection ends.
    ///
    /// Returns `Ok(())` when the peer closes the stream or a disconnect is
    /// requested through a [`DisconnectHandle`]. Returns immediately if the
    /// engine is not connected.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedFrameSize`] for a rejected 64-bit frame
    /// - [`Error::Json`] for an event with a malformed body
    /// - [`Error::Callback`] if a callback fails
    /// - [`Error::Io`] if a heartbeat write fails for a reason other than
    ///   the peer going away; the engine is left disconnected
    pub async fn keep_alive(&mut self) -> Result<()> {
        while self.is_connected() {
            if self.disconnect.is_requested() {
                self.disconnect().await?;
                break;
            }

            if self.heartbeat_due() {
                if let Err(e) = self.send_packet(&Packet::heartbeat()).await {
                    self.mark_closed();
                    if is_peer_gone(&e) {
                        break;
                    }
                    return Err(e);
                }
                self.last_heartbeat = Instant::now();
            }

            match self.next_frame().await? {
                Incoming::Idle => {}
                Incoming::Closed => {
                    self.mark_closed();
                    break;
                }
                Incoming::Frame(payload) => self.dispatch(&payload)?,
            }
        }
        Ok(())
    }

    fn heartbeat_due(&self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        session.heartbeat_timeout > 0
            && self.last_heartbeat.elapsed() + HEARTBEAT_MARGIN >= session.heartbeat_interval()
    }

    async fn next_frame(&mut self) -> Result<Incoming> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(Incoming::Closed);
        };

        match timeout(READ_WAIT, stream.fill_buf()).await {
            Err(_) => return Ok(Incoming::Idle),
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(buf)) if buf.is_empty() => return Ok(Incoming::Closed),
            Ok(Ok(_)) => {}
        }

        match self.config.codec.decode(stream).await {
            Ok(payload) => Ok(Incoming::Frame(payload)),
            Err(Error::ConnectionClosed) => Ok(Incoming::Closed),
            Err(e) => Err(e),
        }
    }

    fn dispatch(&self, payload: &[u8]) -> Result<()> {
        let raw = String::from_utf8_lossy(payload);
        if self.config.debug {
            debug!(packet = %raw, "Received packet");
        }

        let Some(packet) = Packet::parse(&raw) else {
            return Ok(());
        };
        let Some(message) = packet.event_message()? else {
            return Ok(());
        };

        let data = message.first_arg();
        let invoked = self
            .callbacks
            .dispatch(&message.name, &data)
            .map_err(|e| match e {
                Error::Callback { .. } => e,
                other => Error::callback(&message.name, other.to_string()),
            })?;

        if self.config.debug {
            debug!(event = %message.name, invoked, "Dispatched event");
        }
        Ok(())
    }

    // ========================================================================
    // Disconnect
    // ========================================================================

    /// Sends a disconnect packet and closes the stream.
    ///
    /// Returns `Ok(false)` without writing anything unless the engine is
    /// connected. The engine is [`ConnectionState::Disconnected`]
    /// afterwards even if the packet could not be written.
    ///
    /// # Errors
    ///
    /// Returns the write error of the disconnect packet.
    pub async fn disconnect(&mut self) -> Result<bool> {
        if !self.is_connected() {
            return Ok(false);
        }

        let packet = Packet::disconnect(self.namespace());
        let sent = self.send_packet(&packet).await;

        if let Some(mut stream) = self.stream.take() {
            // Peer may already be gone.
            let _ = stream.shutdown().await;
        }
        self.session = None;
        self.state = ConnectionState::Disconnected;

        if self.config.debug {
            debug!("Disconnected");
        }

        sent.map(|()| true)
    }
}

// ============================================================================
// Network Connect
// ============================================================================

impl SessionEngine<MaybeTlsStream> {
    /// Performs the session handshake, opens the stream and upgrades it.
    ///
    /// On failure the engine is reset to [`ConnectionState::Unconnected`]
    /// and may be connected again.
    ///
    /// # Errors
    ///
    /// - [`Error::Socket`] if the engine is not unconnected or the stream
    ///   cannot be opened
    /// - [`Error::Handshake`] / [`Error::HandshakeStatus`] from the session
    ///   handshake or upgrade
    pub async fn connect(&mut self, target: &ConnectTarget) -> Result<()> {
        if self.state != ConnectionState::Unconnected {
            return Err(Error::socket(format!(
                "cannot connect a {} engine",
                self.state
            )));
        }

        let result = self.connect_inner(target).await;
        if result.is_err() {
            self.reset();
        }
        result
    }

    async fn connect_inner(&mut self, target: &ConnectTarget) -> Result<()> {
        self.state = ConnectionState::Handshaking;
        if self.config.debug {
            debug!(url = %target.handshake_url, "Starting session handshake");
        }

        let (session, response) =
            handshake::negotiate(&target.handshake_url, &target.handshake).await?;
        self.response = Some(response);

        let raw = stream::open(&target.endpoint, target.handshake.verify_tls).await?;
        let request = UpgradeRequest::new(
            target.upgrade_uri(&session.session_id),
            target.endpoint.host_header(),
        );

        if self.config.debug {
            debug!(
                host = %target.endpoint.host,
                port = target.endpoint.port,
                tls = raw.is_tls(),
                "Stream opened"
            );
            debug!(uri = %request.uri, "Upgrading stream");
        }

        self.establish(raw, session, &request).await?;
        Ok(())
    }
}

/// Whether a write error means the peer has closed the connection.
fn is_peer_gone(err: &Error) -> bool {
    match err {
        Error::ConnectionClosed => true,
        Error::Io(e) => matches!(
            e.kind(),
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

// ============================================================================
// Debug
// ============================================================================

impl<S> fmt::Debug for SessionEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEngine")
            .field("state", &self.state)
            .field("session", &self.session)
            .field("namespace", &self.namespace())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Drop
// ============================================================================

impl<S> Drop for SessionEngine<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn drop(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(mut stream) = self.stream.take() else {
            return;
        };

        let raw = Packet::disconnect(self.namespace()).to_string();
        let frame = self.config.codec.encode(raw.as_bytes(), Opcode::Text, true);
        let debug = self.config.debug;

        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                let result = stream.write_all(&frame).await;
                let _ = stream.shutdown().await;
                if debug {
                    debug!(sent = result.is_ok(), "Disconnected on drop");
                }
            });
        } else if debug {
            debug!("No runtime on drop, closing without disconnect packet");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
