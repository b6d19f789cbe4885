//! TLS layering: session negotiation and the custom trust engine (spec §4.2)
//!
//! `TlsEngine` is built once per account and reused across reconnects so
//! the session trust cache (spec §3) actually accumulates across
//! `PopSession::open`/`reconnect` calls. It produces a [`TlsTransport`]
//! either directly (`pops://`) or by upgrading an existing
//! [`TcpTransport`] in place after `STLS` (spec §4.2.1).

mod cert_info;
mod hostname;
mod prompt;
mod trust_store;
mod verify;

pub use cert_info::{DnFields, ParsedCert};
pub use prompt::{CertPrompt, PromptChoice, PromptContext, RejectPrompt, ScriptedPrompt, StdioPrompt};
pub use trust_store::TrustStore;
pub use verify::VerifyPolicy;

use crate::config::{PopConfig, TlsVersions};
use crate::error::{Error, Result};
use crate::transport::{PollOutcome, TcpTransport, Transport};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned, SupportedProtocolVersion};
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

/// Built once per account; owns the long-lived trust state that must
/// survive reconnects (spec §3: the session trust sequence is
/// process-lifetime, not connection-lifetime).
pub struct TlsEngine {
    client_config: Arc<ClientConfig>,
}

impl TlsEngine {
    /// Assemble the `rustls::ClientConfig` for this account: root store
    /// (optionally the OS trust store via `rustls-native-certs`, per
    /// `ssl_use_system_certs`), client certificate (`ssl_client_cert`, if
    /// set), and the custom verifier wrapping the trust file + prompt.
    ///
    /// # Errors
    ///
    /// `Error::Trust` if the trust file or client certificate can't be
    /// loaded, or the system trust store can't be read.
    pub fn new(config: &PopConfig, prompt: Arc<dyn CertPrompt>) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        if config.ssl_use_system_certs {
            for cert in rustls_native_certs::load_native_certs().certs {
                roots.add(cert).map_err(|e| {
                    Error::Trust(format!("adding system root to trust store: {e}"))
                })?;
            }
        }

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| Error::Trust(format!("building verifier: {e}")))?;

        let trust_store = TrustStore::load(config.certificate_file.as_deref(), chrono::Utc::now())?;
        let policy = VerifyPolicy {
            verify_host: config.ssl_verify_host,
            verify_dates: config.ssl_verify_dates,
            allow_partial_chains: config.ssl_verify_partial_chains,
        };
        let verifier = Arc::new(verify::TrustVerifier::new(
            inner,
            provider,
            trust_store,
            prompt,
            policy,
        ));

        let versions = enabled_protocol_versions(&config.tls_versions);
        let builder = ClientConfig::builder_with_protocol_versions(&versions)
            .dangerous()
            .with_custom_certificate_verifier(verifier);

        let mut client_config = if let Some(client_cert_path) = &config.ssl_client_cert {
            let (chain, key) = load_client_identity(client_cert_path)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| Error::Trust(format!("loading client certificate: {e}")))?
        } else {
            builder.with_no_client_auth()
        };

        client_config.key_log = Arc::new(rustls::KeyLogFile::new());

        Ok(Self {
            client_config: Arc::new(client_config),
        })
    }

    /// Negotiate TLS over an already-connected `TcpTransport`, either as
    /// the first bytes on the wire (`pops://`) or right after a
    /// successful `STLS` (spec §4.2.1 "upgrades in place").
    ///
    /// # Errors
    ///
    /// `Error::Transport` if the handshake fails (including the trust
    /// engine rejecting the peer's certificate).
    pub fn negotiate(&self, transport: TcpTransport, host: &str) -> Result<TlsTransport> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| Error::Config(format!("invalid hostname {host}: {e}")))?;
        let conn = ClientConnection::new(self.client_config.clone(), server_name)
            .map_err(|e| Error::Transport(format!("starting TLS handshake: {e}")))?;
        let stream = StreamOwned::new(conn, transport.into_stream());
        Ok(TlsTransport { stream })
    }
}

/// rustls never implemented SSLv2/SSLv3/TLS1.0/1.1; only the TLS1.2-and-up
/// toggles in `TlsVersions` can have any effect.
fn enabled_protocol_versions(versions: &TlsVersions) -> Vec<&'static SupportedProtocolVersion> {
    let mut out = Vec::new();
    if versions.tls1_2 {
        out.push(&rustls::version::TLS12);
    }
    out.push(&rustls::version::TLS13);
    out
}

fn load_client_identity(
    path: &str,
) -> Result<(Vec<rustls::pki_types::CertificateDer<'static>>, rustls::pki_types::PrivateKeyDer<'static>)> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Trust(format!("reading client certificate {path}: {e}")))?;
    let mut reader = std::io::Cursor::new(&pem);
    let chain: Vec<_> = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| Error::Trust(format!("parsing client certificate {path}: {e}")))?;

    let mut reader = std::io::Cursor::new(&pem);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| Error::Trust(format!("parsing client key {path}: {e}")))?
        .ok_or_else(|| Error::Trust(format!("no private key found in {path}")))?;

    Ok((chain, key))
}

/// A TLS connection, either negotiated from the start (`pops://`) or
/// upgraded in place after `STLS`. Implements [`Transport`] the same as
/// [`TcpTransport`] so `PopSession` is agnostic to which is in use.
pub struct TlsTransport {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl Transport for TlsTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if crate::interrupt::is_set() {
            return Err(Error::Aborted);
        }
        self.stream.read(buf).map_err(map_io)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if crate::interrupt::is_set() {
            return Err(Error::Aborted);
        }
        self.stream.write_all(buf).map_err(map_io)?;
        Ok(buf.len())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<PollOutcome> {
        if self.stream.conn.wants_read() {
            return Ok(PollOutcome::Ready);
        }
        self.stream
            .sock
            .set_read_timeout(timeout)
            .map_err(|e| Error::Transport(e.to_string()))?;
        let mut probe = [0u8; 1];
        let outcome = match self.stream.sock.peek(&mut probe) {
            Ok(_) => PollOutcome::Ready,
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                PollOutcome::Empty
            }
            Err(e) => return Err(Error::Transport(e.to_string())),
        };
        self.stream
            .sock
            .set_read_timeout(None)
            .map_err(|e| Error::Transport(e.to_string()))?;
        Ok(outcome)
    }

    fn close(&mut self) -> Result<()> {
        self.stream.conn.send_close_notify();
        let _ = self.stream.conn.complete_io(&mut self.stream.sock);
        self.stream.sock.shutdown(std::net::Shutdown::Both).ok();
        Ok(())
    }
}

fn map_io(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::Interrupted {
        Error::Aborted
    } else {
        Error::Transport(e.to_string())
    }
}
