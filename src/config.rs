//! Client configuration.
//!
//! `ClientOptions` is a plain chainable builder, the way
//! `MssqlConnectOptions` is built in the teacher crate, rather than a
//! `serde`-backed config file format; the handful of knobs this client has
//! (host, port, timeouts, buffering, compression, TLS) don't warrant one.

use std::fs::File;
use std::io::BufReader;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};

use crate::error::Error;

/// Configures how the client dials and wraps its transport stack.
///
/// ```
/// use flume_avro_client::config::ClientOptions;
/// use std::time::Duration;
///
/// let options = ClientOptions::new("flume.example.com", 41414)
///     .with_connect_timeout(Duration::from_secs(3))
///     .with_buffer_size(8192);
/// ```
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) send_timeout: Option<Duration>,
    pub(crate) buffer_size: usize,
    pub(crate) compression_level: u32,
    pub(crate) tls: Option<TlsOptions>,
}

impl ClientOptions {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        ClientOptions {
            host: host.into(),
            port,
            connect_timeout: None,
            send_timeout: None,
            buffer_size: 0,
            compression_level: 0,
            tls: None,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    /// Enables the buffered transport layer with the given capacity.
    /// Defaults to `0`, meaning the buffered layer is skipped entirely.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Enables the zlib transport layer at the given level (`1..=9`).
    /// Defaults to `0`, meaning compression is disabled.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_tls(mut self, tls: TlsOptions) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Rejects configurations the transport stack cannot act on: a
    /// compression level outside `1..=9`, or a TLS root certificate file
    /// that cannot be read.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.compression_level > 9 {
            return Err(Error::configuration(format!(
                "zlib: invalid compression level: {}",
                self.compression_level
            )));
        }

        if let Some(tls) = &self.tls {
            tls.validate()?;
        }

        Ok(())
    }
}

impl FromStr for ClientOptions {
    type Err = Error;

    /// Parses a bare `"host:port"` address into default options.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| Error::configuration(format!("bad address, expected host:port: {}", s)))?;

        let port: u16 = port
            .parse()
            .map_err(|_| Error::configuration(format!("bad port: {}", port)))?;

        if host.is_empty() {
            return Err(Error::configuration("bad address: empty host"));
        }

        Ok(ClientOptions::new(host, port))
    }
}

/// TLS configuration for the outermost-but-one transport layer.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// PEM file of additional trusted root certificates. When absent, the
    /// bundled Mozilla root store (`webpki-roots`) is used.
    pub root_cert: Option<String>,
    /// Disables certificate verification entirely: chain, signature, and
    /// hostname checks are all skipped, and any certificate the server
    /// presents is accepted. `rustls` has no narrower "verify the chain but
    /// skip only the name" extension point, so this is an all-or-nothing
    /// knob despite the name. Intended for test/dev endpoints reached by IP
    /// address or self-signed certificates; never enable it against a
    /// production endpoint.
    pub accept_invalid_hostnames: bool,
    /// The name to validate the server's certificate against (and to send
    /// via SNI), when it differs from the host being dialed.
    pub server_name: Option<String>,
}

impl TlsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_cert(mut self, path: impl Into<String>) -> Self {
        self.root_cert = Some(path.into());
        self
    }

    pub fn with_accept_invalid_hostnames(mut self, accept: bool) -> Self {
        self.accept_invalid_hostnames = accept;
        self
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if let Some(path) = &self.root_cert {
            File::open(path)
                .map_err(|e| Error::configuration(format!("cannot read root cert {}: {}", path, e)))?;
        }
        Ok(())
    }

    /// Builds the `rustls` client configuration and resolved server name
    /// this layer's handshake runs against.
    pub(crate) fn build(&self, host: &str) -> Result<(Arc<ClientConfig>, ServerName<'static>), Error> {
        let mut roots = RootCertStore::empty();

        if let Some(path) = &self.root_cert {
            let file = File::open(path)
                .map_err(|e| Error::configuration(format!("cannot read root cert {}: {}", path, e)))?;
            let mut reader = BufReader::new(file);
            for cert in rustls_pemfile::certs(&mut reader) {
                let cert = cert.map_err(|e| Error::configuration(format!("bad root cert {}: {}", path, e)))?;
                roots
                    .add(cert)
                    .map_err(|e| Error::configuration(format!("bad root cert {}: {}", path, e)))?;
            }
        } else {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let config = if self.accept_invalid_hostnames {
            ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .map_err(|e| Error::configuration(e.to_string()))?
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(danger::AcceptAnyServerName))
                .with_no_client_auth()
        } else {
            ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .map_err(|e| Error::configuration(e.to_string()))?
                .with_root_certificates(roots)
                .with_no_client_auth()
        };

        let server_name_str = self.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(server_name_str.to_string())
            .map_err(|e| Error::configuration(format!("bad TLS server name {}: {}", server_name_str, e)))?;

        Ok((Arc::new(config), server_name))
    }
}

/// The `accept_invalid_hostnames` verifier, reached through `rustls`'s
/// dangerous-configuration escape hatch. It performs no verification at
/// all: chain-of-trust, signature, and hostname checks are all skipped, and
/// every certificate is accepted. There is no narrower verifier here that
/// validates the chain and only skips the name check.
mod danger {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{verify_tls12_signature, verify_tls13_signature};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};

    #[derive(Debug)]
    pub(super) struct AcceptAnyServerName;

    impl ServerCertVerifier for AcceptAnyServerName {
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
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, TlsError> {
            verify_tls12_signature(
                message,
                cert,
                dss,
                &rustls::crypto::ring::default_provider().signature_verification_algorithms,
            )
        }

        fn verify_tls13_signature(
            &self,
            message: &[u8],
            cert: &CertificateDer<'_>,
            dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, TlsError> {
            verify_tls13_signature(
                message,
                cert,
                dss,
                &rustls::crypto::ring::default_provider().signature_verification_algorithms,
            )
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            rustls::crypto::ring::default_provider()
                .signature_verification_algorithms
                .supported_schemes()
        }
    }
}
