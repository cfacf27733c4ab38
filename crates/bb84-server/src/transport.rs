//! QUIC transport via Quinn.
//!
//! Participants connect over QUIC and open a single bidirectional control
//! stream. TLS material is loaded from PEM files when both paths are given;
//! otherwise a self-signed certificate for `localhost` is generated at
//! startup.

use std::{fs::File, io::BufReader, net::SocketAddr, path::Path, sync::Arc};

use quinn::crypto::rustls::QuicServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::ServerError;

/// An established QUIC connection.
pub type QuinnConnection = quinn::Connection;

/// QUIC listener.
pub struct QuinnTransport {
    endpoint: quinn::Endpoint,
}

impl QuinnTransport {
    /// Bind a QUIC endpoint. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` for an unparsable address or unusable TLS
    ///   material
    /// - `ServerError::Transport` if the socket cannot be bound
    pub fn bind(
        address: &str,
        cert_path: Option<String>,
        key_path: Option<String>,
    ) -> Result<Self, ServerError> {
        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid bind address {address}: {e}")))?;

        let tls = server_tls_config(cert_path.as_deref(), key_path.as_deref())?;
        let crypto = QuicServerConfig::try_from(tls)
            .map_err(|e| ServerError::Config(format!("QUIC crypto config error: {e}")))?;
        let server_config = quinn::ServerConfig::with_crypto(Arc::new(crypto));

        let endpoint = quinn::Endpoint::server(server_config, addr)?;
        tracing::debug!("QUIC endpoint bound to {}", addr);

        Ok(Self { endpoint })
    }

    /// Wait for the next incoming connection attempt.
    ///
    /// Returns `None` once the endpoint has been closed. The handshake is
    /// completed by awaiting the returned value, so a slow client never
    /// holds up the accept loop.
    pub async fn accept(&self) -> Option<quinn::Incoming> {
        self.endpoint.accept().await
    }

    /// Local address the endpoint is bound to.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the socket address is unavailable.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Stop accepting and close every connection.
    pub fn close(&self) {
        self.endpoint.close(0u32.into(), b"server shutdown");
    }
}

/// Build the rustls server configuration.
///
/// # Errors
///
/// Returns `ServerError::Config` if only one of the paths is given, a file
/// cannot be read, or the PEM contents are unusable.
pub fn server_tls_config(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> Result<rustls::ServerConfig, ServerError> {
    let (certs, key) = match (cert_path, key_path) {
        (Some(cert), Some(key)) => (load_certs(Path::new(cert))?, load_key(Path::new(key))?),
        (None, None) => self_signed()?,
        _ => {
            return Err(ServerError::Config(
                "--cert and --key must be given together".to_string(),
            ));
        },
    };

    rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ServerError::Config(format!("TLS protocol error: {e}")))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Config(format!("TLS certificate error: {e}")))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::Config(format!("cannot open {}: {e}", path.display())))?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Config(format!("invalid certificate PEM: {e}")))?;

    if certs.is_empty() {
        return Err(ServerError::Config(format!("no certificates in {}", path.display())));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::Config(format!("cannot open {}: {e}", path.display())))?;

    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ServerError::Config(format!("invalid key PEM: {e}")))?
        .ok_or_else(|| ServerError::Config(format!("no private key in {}", path.display())))
}

fn self_signed() -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>), ServerError> {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()])
            .map_err(|e| ServerError::Config(format!("self-signed certificate error: {e}")))?;

    let key = PrivatePkcs8KeyDer::from(key_pair.serialize_der());
    Ok((vec![cert.der().clone()], key.into()))
}
