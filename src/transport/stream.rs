//! Raw stream transport.
//!
//! Opens the TCP connection that is later upgraded to WebSocket framing,
//! wrapping it in TLS for `https` targets.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Endpoint
// ============================================================================

/// Network location derived from the client URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,
    /// Port, defaulting to 80 for `http` and 443 for `https`.
    pub port: u16,
    /// Whether the stream is wrapped in TLS.
    pub tls: bool,
    /// URL path without a trailing slash.
    pub path: String,
}

impl Endpoint {
    /// Parses an `http` or `https` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed URLs, other schemes or a
    /// missing host.
    pub fn parse(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid URL {url}: {e}")))?;

        let tls = match parsed.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(Error::config(format!(
                    "unsupported URL scheme '{other}', expected http or https"
                )));
            }
        };

        let host = parsed
            .host_str()
            .ok_or_else(|| Error::config(format!("URL has no host: {url}")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_owned();

        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::config(format!("URL has no port: {url}")))?;

        Ok(Self {
            host,
            port,
            tls,
            path: parsed.path().trim_end_matches('/').to_owned(),
        })
    }

    /// Returns the `Host` header value.
    ///
    /// The port is omitted when it is the scheme default.
    #[must_use]
    pub fn host_header(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        if self.port == default_port {
            host
        } else {
            format!("{host}:{}", self.port)
        }
    }
}

// ============================================================================
// MaybeTlsStream
// ============================================================================

/// A plain TCP stream or a TLS stream over TCP.
#[derive(Debug)]
pub enum MaybeTlsStream {
    /// Unencrypted stream.
    Plain(TcpStream),
    /// TLS client stream.
    Tls(Box<TlsStream<TcpStream>>),
}

impl MaybeTlsStream {
    /// Returns `true` for TLS streams.
    #[inline]
    #[must_use]
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}

// ============================================================================
// Open
// ============================================================================

/// Opens a stream to the endpoint.
///
/// # Errors
///
/// Returns [`Error::Socket`] if the TCP connection or TLS handshake fails.
pub async fn open(endpoint: &Endpoint, verify_tls: bool) -> Result<MaybeTlsStream> {
    let host = endpoint.host.as_str();
    let port = endpoint.port;

    let tcp = TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::socket(format!("failed to connect to {host}:{port}: {e}")))?;
    tcp.set_nodelay(true)?;

    if !endpoint.tls {
        return Ok(MaybeTlsStream::Plain(tcp));
    }

    let connector = TlsConnector::from(Arc::new(tls_config(verify_tls)?));
    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|e| Error::socket(format!("invalid TLS server name {host}: {e}")))?;

    let stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::socket(format!("TLS handshake with {host}:{port} failed: {e}")))?;

    Ok(MaybeTlsStream::Tls(Box::new(stream)))
}

/// Builds the rustls client configuration.
fn tls_config(verify_tls: bool) -> Result<ClientConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::socket(format!("TLS configuration failed: {e}")))?;

    let config = if verify_tls {
        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification { provider }))
            .with_no_client_auth()
    };

    Ok(config)
}

// ============================================================================
// SkipServerVerification
// ============================================================================

/// Accepts any server certificate.
///
/// Only used when the client is configured to skip peer verification.
#[derive(Debug)]
struct SkipServerVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ============================================================================
// Tests
// ============================================================================
