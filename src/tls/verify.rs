//! Custom certificate trust decision (spec §4.2.2)
//!
//! Delegates real chain-building and signature verification to
//! `rustls`'s `WebPkiServerVerifier` (and its `verify_tls12_signature`/
//! `verify_tls13_signature` free functions — this crate does not stub
//! signature verification the way a "trust everything" verifier would,
//! since the entire point of this engine is to verify correctly). What
//! it replaces is the *decision* rustls would otherwise make
//! unconditionally: session-scoped trust caching, a user trust file
//! with "accept always", and partial-chain acceptance via an
//! interactive prompt.

use crate::tls::cert_info::{self, ParsedCert};
use crate::tls::hostname;
use crate::tls::prompt::{CertPrompt, PromptChoice, PromptContext};
use crate::tls::trust_store::TrustStore;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, Error as TlsError, SignatureScheme};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Tunables from `PopConfig` this verifier needs (spec §6 `ssl_*` options).
#[derive(Debug, Clone, Copy)]
pub struct VerifyPolicy {
    pub verify_host: bool,
    pub verify_dates: bool,
    pub allow_partial_chains: bool,
}

/// The custom `ServerCertVerifier` encoding spec §4.2.2's trust decision.
pub struct TrustVerifier {
    inner: Arc<WebPkiServerVerifier>,
    provider: Arc<CryptoProvider>,
    trust_store: Mutex<TrustStore>,
    /// spec §3 "session trust sequence": SHA-256 digests of certificates
    /// at any chain depth accepted once (or found in the trust file) in
    /// this process, so a subsequent chain validation involving a
    /// byte-equal certificate never re-invokes the prompt (append-only
    /// for the process's lifetime).
    session_cache: Mutex<HashSet<[u8; 32]>>,
    prompt: Arc<dyn CertPrompt>,
    policy: VerifyPolicy,
}

impl fmt::Debug for TrustVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrustVerifier").field("policy", &self.policy).finish_non_exhaustive()
    }
}

impl TrustVerifier {
    #[must_use]
    pub fn new(
        inner: Arc<WebPkiServerVerifier>,
        provider: Arc<CryptoProvider>,
        trust_store: TrustStore,
        prompt: Arc<dyn CertPrompt>,
        policy: VerifyPolicy,
    ) -> Self {
        Self {
            inner,
            provider,
            trust_store: Mutex::new(trust_store),
            session_cache: Mutex::new(HashSet::new()),
            prompt,
            policy,
        }
    }

    /// Ask the user about a single certificate and apply the answer to
    /// the session trust sequence (spec §4.2.3: "may write a 'skip'
    /// marker ... On any accept via the user trust file, clear the skip
    /// marker" — here a plain `AcceptOnce`/`AcceptAlways` always clears
    /// it since we never set one ourselves outside `Skip`).
    ///
    /// An `AcceptAlways` the caller didn't actually offer (`!allow_always`)
    /// is honored for this session only, same as `AcceptOnce` — the UI
    /// contract is what gates the trust-file write, not enforcement here.
    fn ask_and_apply(
        &self,
        cert: &ParsedCert,
        depth: usize,
        chain_len: usize,
        allow_always: bool,
        allow_skip: bool,
        pending_appends: &mut Vec<ParsedCert>,
    ) -> Result<(), TlsError> {
        let ctx = PromptContext {
            cert,
            depth,
            chain_len,
            allow_always,
            allow_skip,
        };

        match self.prompt.ask(&ctx) {
            PromptChoice::Reject => Err(TlsError::General(
                "certificate rejected by user".to_string(),
            )),
            PromptChoice::AcceptOnce => {
                self.remember(cert);
                Ok(())
            }
            PromptChoice::AcceptAlways => {
                self.remember(cert);
                pending_appends.push(cert.clone());
                Ok(())
            }
            PromptChoice::Skip if allow_skip => Ok(()),
            PromptChoice::Skip => Err(TlsError::General(
                "skip not permitted at this chain depth".to_string(),
            )),
        }
    }

    /// spec §3: record `cert` in the process-lifetime session trust
    /// sequence so a later chain walk involving a byte-equal certificate
    /// — at any depth — short-circuits without a prompt (spec §8
    /// invariant).
    fn remember(&self, cert: &ParsedCert) {
        self.session_cache
            .lock()
            .expect("session cache lock poisoned")
            .insert(cert.sha256);
    }

    fn already_trusted(&self, cert: &ParsedCert) -> bool {
        self.session_cache
            .lock()
            .expect("session cache lock poisoned")
            .contains(&cert.sha256)
    }

    /// Walk the whole chain (leaf first), consulting the session cache,
    /// then the trust file, then (if still undecided) the interactive
    /// prompt for each certificate not already covered by standard path
    /// validation (spec §4.2.2 steps 1, 3-4).
    fn decide_chain(&self, chain: &[ParsedCert], now: DateTime<Utc>) -> Result<(), TlsError> {
        let mut pending_appends = Vec::new();
        for (depth, cert) in chain.iter().enumerate() {
            // spec §4.2.2 step 1, applied per chain entry (not just the
            // leaf): a certificate accepted once anywhere in this
            // process, at any depth, never re-prompts.
            if self.already_trusted(cert) {
                continue;
            }

            let (trusted_by_file, allow_always) = {
                let store = self.trust_store.lock().expect("trust store lock poisoned");
                (
                    store.accepts(cert, now),
                    store.is_configured() && cert.is_within_validity(now),
                )
            };
            if trusted_by_file {
                self.remember(cert);
                continue;
            }

            let allow_skip = self.policy.allow_partial_chains && depth > 0;
            self.ask_and_apply(cert, depth, chain.len(), allow_always, allow_skip, &mut pending_appends)?;
        }

        let mut store = self.trust_store.lock().expect("trust store lock poisoned");
        for cert in pending_appends {
            store
                .append(cert)
                .map_err(|e| TlsError::General(e.to_string()))?;
        }
        Ok(())
    }
}

impl ServerCertVerifier for TrustVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let leaf = cert_info::parse(end_entity)
            .map_err(|e| TlsError::General(format!("parsing leaf certificate: {e}")))?;

        // spec §4.2.2 step 1: session trust cache short-circuit.
        if self.already_trusted(&leaf) {
            return Ok(ServerCertVerified::assertion());
        }

        // Parsed once up front: both the hostname-mismatch fallback and
        // the trust-file/prompt fallback need the full chain and its
        // length.
        let mut chain = Vec::with_capacity(intermediates.len() + 1);
        chain.push(leaf.clone());
        for der in intermediates {
            chain.push(
                cert_info::parse(der)
                    .map_err(|e| TlsError::General(format!("parsing chain certificate: {e}")))?,
            );
        }

        // spec §4.2.2 step 2: hostname check against the leaf only. On
        // failure, jump straight to the interactive prompt with
        // "always-allow" disabled (scenario S6) rather than aborting
        // outright — only a user "reject" aborts the handshake.
        if self.policy.verify_host {
            let host = server_name_to_str(server_name);
            if !hostname::matches_any(&leaf.dns_names, leaf.subject.common_name.as_deref(), &host)
            {
                let mut pending_appends = Vec::new();
                self.ask_and_apply(&leaf, 0, chain.len(), false, false, &mut pending_appends)?;
                return Ok(ServerCertVerified::assertion());
            }
        }

        // spec §4.2.2 step 3: try standard path validation first; a
        // success here means no prompt is needed at all.
        let path_ok = self
            .inner
            .verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            .is_ok();

        let now_chrono = unix_time_to_chrono(now);
        if path_ok && (!self.policy.verify_dates || leaf.is_within_validity(now_chrono)) {
            self.remember(&leaf);
            return Ok(ServerCertVerified::assertion());
        }

        // spec §4.2.2 step 4: fall back to the trust file / interactive
        // prompt for every certificate in the chain.
        self.decide_chain(&chain, now_chrono)?;
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
            &self.provider.signature_verification_algorithms,
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
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

fn server_name_to_str(name: &ServerName<'_>) -> String {
    match name {
        ServerName::DnsName(dns) => dns.as_ref().to_string(),
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).to_string(),
        _ => String::new(),
    }
}

fn unix_time_to_chrono(t: UnixTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(i64::try_from(t.as_secs()).unwrap_or(i64::MAX), 0)
        .unwrap_or_else(Utc::now)
}
