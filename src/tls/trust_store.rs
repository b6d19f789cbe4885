//! User trust file maintenance (spec §4.2.5)
//!
//! A concatenation of PEM-encoded certificates the user has explicitly
//! accepted "always". On load, expired entries are silently filtered
//! out ("expired entries poison the verifier"). Additions are
//! append-only.

use crate::error::{Error, Result};
use crate::tls::cert_info::{self, ParsedCert};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub struct TrustStore {
    path: Option<PathBuf>,
    certs: Vec<ParsedCert>,
}

impl TrustStore {
    /// Load and filter a trust file. `path = None` is a valid
    /// "no trust file configured" state (spec §4.2.4: "accept always"
    /// is only offered when a trust file exists).
    ///
    /// # Errors
    ///
    /// Returns `Error::Trust` if the file exists but can't be read or
    /// contains malformed PEM/DER.
    pub fn load(path: Option<impl AsRef<Path>>, now: DateTime<Utc>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self { path: None, certs: Vec::new() });
        };
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Ok(Self { path: Some(path), certs: Vec::new() });
        }

        let pem_bytes = fs::read(&path)
            .map_err(|e| Error::Trust(format!("reading trust file {}: {e}", path.display())))?;

        let mut reader = std::io::Cursor::new(pem_bytes);
        let ders: Vec<_> = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Trust(format!("parsing trust file {}: {e}", path.display())))?;

        let mut certs = Vec::with_capacity(ders.len());
        for der in ders {
            let parsed = cert_info::parse(&der)?;
            if parsed.is_within_validity(now) {
                certs.push(parsed);
            }
            // Expired entries are silently dropped (spec §4.2.5).
        }

        Ok(Self { path: Some(path), certs })
    }

    /// spec §4.2.2 step 3: "accept iff the certificate is byte-equal to
    /// one present in the file AND is within validity dates".
    #[must_use]
    pub fn accepts(&self, cert: &ParsedCert, now: DateTime<Utc>) -> bool {
        cert.is_within_validity(now) && self.certs.iter().any(|c| c.trust_key_equal(cert))
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.path.is_some()
    }

    /// Append `cert`'s PEM encoding to the trust file (spec §4.2.4:
    /// "Accept always ... appends the PEM-encoded certificate to the
    /// trust file"). No-op (returns `Ok`) if no trust file is configured.
    ///
    /// # Errors
    ///
    /// Returns `Error::Trust` if the file can't be written.
    pub fn append(&mut self, cert: ParsedCert) -> Result<()> {
        let Some(path) = &self.path else { return Ok(()) };

        use std::io::Write as _;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| Error::Trust(format!("opening trust file {}: {e}", path.display())))?;
        file.write_all(encode_pem(&cert.der).as_bytes())
            .map_err(|e| Error::Trust(format!("writing trust file {}: {e}", path.display())))?;

        self.certs.push(cert);
        Ok(())
    }
}

/// Encode DER bytes as a PEM `CERTIFICATE` block, 64 base64 characters
/// per line. `rustls_pemfile` only reads PEM; there's no writer
/// counterpart in this crate's dependency stack, so this is a small
/// hand-rolled base64 encoder rather than a new dependency.
fn encode_pem(der: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut b64 = String::with_capacity(der.len().div_ceil(3) * 4);
    for chunk in der.chunks(3) {
        let b = [
            chunk[0],
            chunk.get(1).copied().unwrap_or(0),
            chunk.get(2).copied().unwrap_or(0),
        ];
        b64.push(ALPHABET[(b[0] >> 2) as usize] as char);
        b64.push(ALPHABET[(((b[0] & 0x03) << 4) | (b[1] >> 4)) as usize] as char);
        b64.push(if chunk.len() > 1 {
            ALPHABET[(((b[1] & 0x0f) << 2) | (b[2] >> 6)) as usize] as char
        } else {
            '='
        });
        b64.push(if chunk.len() > 2 {
            ALPHABET[(b[2] & 0x3f) as usize] as char
        } else {
            '='
        });
    }

    let mut out = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in b64.as_bytes().chunks(64) {
        out.push_str(std::str::from_utf8(line).expect("ascii base64"));
        out.push('\n');
    }
    out.push_str("-----END CERTIFICATE-----\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_path_is_unconfigured_and_empty() {
        let store = TrustStore::load::<&Path>(None, Utc::now()).unwrap();
        assert!(!store.is_configured());
    }

    #[test]
    fn missing_file_loads_empty_but_configured() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.pem");
        let store = TrustStore::load(Some(&path), Utc::now()).unwrap();
        assert!(store.is_configured());
    }

    #[test]
    fn pem_encoding_round_trips_through_rustls_pemfile() {
        let der = b"not-a-real-certificate-but-enough-bytes-to-chunk".to_vec();
        let pem = encode_pem(&der);
        let mut reader = std::io::Cursor::new(pem.into_bytes());
        let parsed: Vec<_> = rustls_pemfile::certs(&mut reader)
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].as_ref(), der.as_slice());
    }
}
