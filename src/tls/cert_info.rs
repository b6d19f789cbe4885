//! X.509 field extraction for the interactive prompt (spec §4.2.4)

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rustls::pki_types::CertificateDer;
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

/// The Distinguished Name fields the prompt displays (spec §4.2.4: "CN,
/// emailAddress, O, OU, L, ST, C").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnFields {
    pub common_name: Option<String>,
    pub email_address: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl DnFields {
    fn from_x509_name(name: &X509Name<'_>) -> Self {
        let get = |oid: &x509_parser::der_parser::oid::Oid<'_>| -> Option<String> {
            name.iter_by_oid(oid)
                .next()
                .and_then(|a| a.as_str().ok())
                .map(ToString::to_string)
        };
        Self {
            common_name: get(&OID_X509_COMMON_NAME),
            email_address: get(&OID_PKCS9_EMAIL_ADDRESS),
            organization: get(&OID_X509_ORGANIZATION_NAME),
            organizational_unit: get(&OID_X509_ORGANIZATIONAL_UNIT),
            locality: get(&OID_X509_LOCALITY_NAME),
            state: get(&OID_X509_STATE_OR_PROVINCE_NAME),
            country: get(&OID_X509_COUNTRY_NAME),
        }
    }
}

/// Everything the chain-walk and the prompt need from a single
/// certificate in the chain, extracted once up front.
#[derive(Debug, Clone)]
pub struct ParsedCert {
    pub der: Vec<u8>,
    pub subject: DnFields,
    pub issuer: DnFields,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub dns_names: Vec<String>,
    pub sha256: [u8; 32],
}

impl ParsedCert {
    /// Byte-equal compare per spec §4.2.2 step 1: "issuer name + subject
    /// name + SHA-256 digest".
    #[must_use]
    pub fn trust_key_equal(&self, other: &Self) -> bool {
        self.sha256 == other.sha256
            && self.subject == other.subject
            && self.issuer == other.issuer
    }

    #[must_use]
    pub fn is_within_validity(&self, now: DateTime<Utc>) -> bool {
        now >= self.not_before && now <= self.not_after
    }
}

/// Parse a certificate's DER bytes into the fields the trust engine needs.
///
/// # Errors
///
/// Returns `Error::Trust` if the DER cannot be parsed as X.509.
pub fn parse(der: &CertificateDer<'_>) -> Result<ParsedCert> {
    let (_, cert) = X509Certificate::from_der(der.as_ref())
        .map_err(|e| Error::Trust(format!("malformed certificate: {e}")))?;

    let not_before = from_asn1_time(cert.validity().not_before.timestamp())?;
    let not_after = from_asn1_time(cert.validity().not_after.timestamp())?;

    let dns_names = cert
        .subject_alternative_name()
        .ok()
        .flatten()
        .map(|ext| {
            ext.value
                .general_names
                .iter()
                .filter_map(|gn| match gn {
                    GeneralName::DNSName(s) => Some((*s).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(der.as_ref());
    let sha256: [u8; 32] = hasher.finalize().into();

    Ok(ParsedCert {
        der: der.as_ref().to_vec(),
        subject: DnFields::from_x509_name(cert.subject()),
        issuer: DnFields::from_x509_name(cert.issuer()),
        not_before,
        not_after,
        dns_names,
        sha256,
    })
}

fn from_asn1_time(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .ok_or_else(|| Error::Trust("certificate timestamp out of range".into()))
}

/// SHA-1 fingerprint, colon-hex, as shown at the interactive prompt.
#[must_use]
pub fn sha1_fingerprint(der: &[u8]) -> String {
    use sha1::{Digest as _, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(der);
    colon_hex(&hasher.finalize())
}

/// MD5 fingerprint, colon-hex, as shown at the interactive prompt.
#[must_use]
pub fn md5_fingerprint(der: &[u8]) -> String {
    use md5::{Digest as _, Md5};
    let mut hasher = Md5::new();
    hasher.update(der);
    colon_hex(&hasher.finalize())
}

fn colon_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colon_hex_formats_upper_case_with_separators() {
        assert_eq!(colon_hex(&[0x0a, 0xff, 0x01]), "0A:FF:01");
    }
}
