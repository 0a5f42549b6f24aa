//! Connection establishment and the raw transport stream.
//!
//! The connection core does not care how bytes reach the peer; it only needs
//! a splittable byte stream. [`TransportStream`] provides that over plain TCP
//! or client-side TLS (native root store, or certificate verification
//! disabled for self-signed test servers).

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    ClientConfig, DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme,
};
use tokio_rustls::TlsConnector;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{info, warn};

use crate::codec::IrcCodec;
use crate::error::ConnectError;

/// TLS settings for an outbound connection.
#[derive(Clone, Debug)]
pub struct TlsOptions {
    /// Server name for SNI and certificate verification. Defaults to the
    /// host portion of the connect address.
    pub server_name: Option<String>,
    /// Verify the peer certificate against the native root store. Disable
    /// only for self-signed test servers.
    pub verify_certs: bool,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            server_name: None,
            verify_certs: true,
        }
    }
}

/// The established byte stream to the peer.
#[non_exhaustive]
pub enum TransportStream {
    /// Plain TCP.
    Tcp(TcpStream),
    /// Client-side TLS (boxed for size).
    Tls(Box<ClientTlsStream<TcpStream>>),
}

/// The framed reading half of a split transport.
pub type TransportReader = FramedRead<ReadHalf<TransportStream>, IrcCodec>;
/// The framed writing half of a split transport.
pub type TransportWriter = FramedWrite<WriteHalf<TransportStream>, IrcCodec>;

impl TransportStream {
    /// Connect to `address` (`host:port`), optionally upgrading to TLS.
    pub async fn connect(
        address: &str,
        tls: Option<&TlsOptions>,
    ) -> Result<Self, ConnectError> {
        let stream = TcpStream::connect(address).await?;

        if let Err(e) = enable_keepalive(&stream) {
            warn!(error = %e, "failed to enable TCP keepalive");
        }

        match tls {
            None => Ok(Self::Tcp(stream)),
            Some(options) => {
                let host = options
                    .server_name
                    .clone()
                    .unwrap_or_else(|| host_of(address).to_string());
                let tls_stream = upgrade_to_tls(stream, &host, options).await?;
                info!(host = %host, verify = options.verify_certs, "TLS handshake completed");
                Ok(Self::Tls(Box::new(tls_stream)))
            }
        }
    }

    /// Whether this transport is TLS-encrypted.
    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Split into framed reading and writing halves suitable for separate
    /// reader/writer tasks.
    pub fn split(self) -> (TransportReader, TransportWriter) {
        let (read, write) = tokio::io::split(self);
        (
            FramedRead::new(read, IrcCodec::new()),
            FramedWrite::new(write, IrcCodec::new()),
        )
    }
}

fn host_of(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, _port)) => host,
        None => address,
    }
}

fn enable_keepalive(stream: &TcpStream) -> std::io::Result<()> {
    use socket2::{SockRef, TcpKeepalive};
    use std::time::Duration;

    let sock = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(120))
        .with_interval(Duration::from_secs(30));

    sock.set_tcp_keepalive(&keepalive)
}

async fn upgrade_to_tls(
    tcp_stream: TcpStream,
    hostname: &str,
    options: &TlsOptions,
) -> Result<ClientTlsStream<TcpStream>, ConnectError> {
    let config = if options.verify_certs {
        let mut roots = RootCertStore::empty();
        let loaded = rustls_native_certs::load_native_certs();
        for cert in loaded.certs {
            if let Err(e) = roots.add(cert) {
                warn!(error = %e, "failed to add root cert");
            }
        }
        for e in &loaded.errors {
            warn!(error = %e, "error loading native certs");
        }

        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    } else {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    };

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| ConnectError::InvalidServerName(hostname.to_string()))?;

    connector
        .connect(server_name, tcp_stream)
        .await
        .map_err(ConnectError::Tls)
}

/// Certificate verifier that accepts any certificate. Only reachable when
/// [`TlsOptions::verify_certs`] is explicitly disabled.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

impl AsyncRead for TransportStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(inner) => Pin::new(inner).poll_read(cx, buf),
            Self::Tls(inner) => Pin::new(inner).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for TransportStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(inner) => Pin::new(inner).poll_write(cx, buf),
            Self::Tls(inner) => Pin::new(inner).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(inner) => Pin::new(inner).poll_flush(cx),
            Self::Tls(inner) => Pin::new(inner).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(inner) => Pin::new(inner).poll_shutdown(cx),
            Self::Tls(inner) => Pin::new(inner).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use futures_util::{SinkExt, StreamExt};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_tcp_connect_and_split() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = async move {
            let (mut stream, _peer) = listener.accept().await.unwrap();
            stream.write_all(b":server 001 me :Welcome\r\n").await.unwrap();

            // Read back what the client writes.
            let mut reader = tokio::io::BufReader::new(stream);
            let mut line = String::new();
            tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line)
                .await
                .unwrap();
            assert_eq!(line, "PONG :token\r\n");
        };

        let client = async move {
            let transport = TransportStream::connect(&addr.to_string(), None)
                .await
                .unwrap();
            assert!(!transport.is_tls());

            let (mut reader, mut writer) = transport.split();
            let msg = reader.next().await.unwrap().unwrap();
            assert_eq!(msg.command, "001");

            writer.send(Message::pong("token")).await.unwrap();
        };

        tokio::join!(server, client);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Port 1 on localhost is essentially never listening.
        let result = TransportStream::connect("127.0.0.1:1", None).await;
        assert!(matches!(result, Err(ConnectError::Io(_))));
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("irc.example.com:6697"), "irc.example.com");
        assert_eq!(host_of("irc.example.com"), "irc.example.com");
    }
}
