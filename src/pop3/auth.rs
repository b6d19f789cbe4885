//! Authentication strategies for the open sequence (spec §4.3.2, §2.2
//! APOP digest rule)
//!
//! APOP is attempted when the server's greeting carries a challenge and
//! the feature is enabled; otherwise USER/PASS. SASL is explicitly left
//! as "a pluggable strategy" by spec §4.3.2 — the core only needs
//! "produces Authenticated or fails", so it is not implemented here.

use crate::error::{Error, Result};
use crate::pop3::proto::{self, Request, Status};
use crate::transport::Transport;
use md5::{Digest as _, Md5};

/// Extract the APOP challenge (the angle-bracketed `msg-id`) from a
/// greeting line, if present.
#[must_use]
pub fn apop_challenge(greeting: &str) -> Option<&str> {
    let start = greeting.find('<')?;
    let end = greeting[start..].find('>')? + start + 1;
    Some(&greeting[start..end])
}

/// `lowercase-hex(MD5(challenge ++ shared-secret))` (RFC 1939 §7).
#[must_use]
pub fn apop_digest(challenge: &str, password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(challenge.as_bytes());
    hasher.update(password.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Authenticate with `APOP user digest`.
///
/// # Errors
///
/// `Error::Protocol` on `-ERR` (bad credentials), or a transport error.
pub fn apop(
    transport: &mut dyn Transport,
    challenge: &str,
    user: &str,
    password: &str,
) -> Result<()> {
    let digest = apop_digest(challenge, password);
    proto::query(
        transport,
        &Request::Apop {
            username: user.to_string(),
            digest,
        },
    )?;
    Ok(())
}

/// Authenticate with `USER`/`PASS`. A `-ERR` to `USER` is itself a hard
/// authentication failure here — this crate does not retry with a
/// different username.
///
/// # Errors
///
/// `Error::Protocol` on either `-ERR`, or a transport error.
pub fn user_pass(transport: &mut dyn Transport, user: &str, password: &str) -> Result<()> {
    proto::query(transport, &Request::User(user.to_string()))?;
    proto::query(transport, &Request::Pass(password.to_string()))?;
    Ok(())
}

/// Read the server greeting line, classifying it as the `+OK` welcome
/// (spec §4.3.2: "read greeting"). A greeting that arrives as `-ERR`
/// (some servers reject immediately, e.g. too many connections) is a
/// protocol-level open failure.
///
/// # Errors
///
/// `Error::Protocol` if the greeting is `-ERR`, or a transport error.
pub fn read_greeting(transport: &mut dyn Transport) -> Result<String> {
    match proto::read_status(transport)? {
        Status::Ok(msg) => Ok(msg),
        Status::Err(msg) => Err(Error::Protocol(msg)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_apop_challenge() {
        let greeting = "POP3 server ready <1896.697170952@dbc.mtview.ca.us>";
        assert_eq!(
            apop_challenge(greeting),
            Some("<1896.697170952@dbc.mtview.ca.us>")
        );
    }

    #[test]
    fn no_challenge_when_absent() {
        assert_eq!(apop_challenge("POP3 server ready"), None);
    }

    #[test]
    fn apop_digest_matches_rfc1939_example() {
        let digest = apop_digest("<1896.697170952@dbc.mtview.ca.us>", "tanstaaf");
        assert_eq!(digest, "c4c9334bac560ecc979e58001b3e22fb");
    }
}
