//! Command/response framing and multi-line parsing (spec §4.3.1)
//!
//! Commands are single `\r\n`-terminated lines; every response starts
//! with a status line (`+OK`/`-ERR`); some commands follow with a
//! multi-line body terminated by a lone `.` line, with dot-stuffing
//! unstuffed as each line is read. Grounded on the retrieval pack's own
//! `postman-pop3` `Request`/`Response` split, adapted to this crate's
//! blocking [`Transport`](crate::transport::Transport) and error taxonomy
//! rather than `anyhow`.

use crate::error::{Error, Result};
use crate::transport::Transport;

/// A POP3 request, independent of how it is framed on the wire.
#[derive(Debug, Clone)]
pub enum Request {
    User(String),
    Pass(String),
    Apop { username: String, digest: String },
    Stat,
    Uidl(Option<u32>),
    List(Option<u32>),
    Top { refno: u32, lines: u32 },
    Retr(u32),
    Dele(u32),
    Noop,
    Rset,
    Quit,
    Capa,
    StartTls,
}

impl Request {
    /// Render the wire form, *without* the trailing `\r\n` (the caller
    /// writes the terminator so it can share one write with the line).
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::User(name) => format!("USER {name}"),
            Self::Pass(pass) => format!("PASS {pass}"),
            Self::Apop { username, digest } => format!("APOP {username} {digest}"),
            Self::Stat => "STAT".to_string(),
            Self::Uidl(None) => "UIDL".to_string(),
            Self::Uidl(Some(n)) => format!("UIDL {n}"),
            Self::List(None) => "LIST".to_string(),
            Self::List(Some(n)) => format!("LIST {n}"),
            Self::Top { refno, lines } => format!("TOP {refno} {lines}"),
            Self::Retr(n) => format!("RETR {n}"),
            Self::Dele(n) => format!("DELE {n}"),
            Self::Noop => "NOOP".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
            Self::Capa => "CAPA".to_string(),
            Self::StartTls => "STLS".to_string(),
        }
    }
}

/// Parsed status line: `+OK` carries the trailing text; `-ERR` carries
/// the server's human-readable error (spec §4.3.1: "captures the
/// server error line into `err_msg`").
#[derive(Debug, Clone)]
pub enum Status {
    Ok(String),
    Err(String),
}

/// Write a request line, `\r\n`-terminated.
///
/// # Errors
///
/// Propagates `Error::Transport`/`Error::Aborted` from the underlying write.
pub fn send(transport: &mut dyn Transport, req: &Request) -> Result<()> {
    let line = format!("{}\r\n", req.to_wire());
    transport.write(line.as_bytes())?;
    Ok(())
}

/// Read and classify a single status line.
///
/// # Errors
///
/// `Error::Transport` on I/O failure, or `Error::Protocol` if the line
/// begins with neither `+OK` nor `-ERR`.
pub fn read_status(transport: &mut dyn Transport) -> Result<Status> {
    let line = transport.readln()?;
    let line = String::from_utf8_lossy(&line);
    if let Some(rest) = line.strip_prefix("+OK") {
        Ok(Status::Ok(rest.trim_start().to_string()))
    } else if let Some(rest) = line.strip_prefix("-ERR") {
        Ok(Status::Err(rest.trim_start().to_string()))
    } else {
        Err(Error::Protocol(format!("unrecognized status line: {line}")))
    }
}

/// Send `req` and classify the single status line that follows (spec
/// §4.3.1 `query`): `Ok(trailing)` on `+OK`, `Err(Error::Protocol)` on
/// `-ERR` (caller decides whether to stash the message as `err_msg`),
/// `Err(Error::Transport)` on I/O failure.
///
/// # Errors
///
/// See above.
pub fn query(transport: &mut dyn Transport, req: &Request) -> Result<String> {
    send(transport, req)?;
    match read_status(transport)? {
        Status::Ok(msg) => Ok(msg),
        Status::Err(msg) => Err(Error::Protocol(msg)),
    }
}

/// Read one dot-stuffed multi-line data section (everything between the
/// status line and the closing lone-`.` line), invoking `line_cb` with
/// each unstuffed line. A leading `.` on a data line is stripped before
/// the callback sees it (spec §6: "dot-stuffing").
///
/// # Errors
///
/// Propagates transport errors, and whatever `line_cb` returns on a
/// non-`Ok` result (spec §4.3.1: "a nonzero callback return propagates
/// as -3").
pub fn read_multiline(
    transport: &mut dyn Transport,
    mut line_cb: impl FnMut(&[u8]) -> Result<()>,
) -> Result<()> {
    loop {
        let line = transport.readln()?;
        if line == b"." {
            return Ok(());
        }
        if line.first() == Some(&b'.') {
            line_cb(&line[1..])?;
        } else {
            line_cb(&line)?;
        }
    }
}

/// Send `req`, expect `+OK`, then stream the multi-line body through
/// `line_cb` (spec §4.3.1 `fetch_data`).
///
/// # Errors
///
/// `Error::Protocol` if the server replies `-ERR`; otherwise as
/// [`read_multiline`].
pub fn fetch_data(
    transport: &mut dyn Transport,
    req: &Request,
    line_cb: impl FnMut(&[u8]) -> Result<()>,
) -> Result<()> {
    send(transport, req)?;
    match read_status(transport)? {
        Status::Err(msg) => Err(Error::Protocol(msg)),
        Status::Ok(_) => read_multiline(transport, line_cb),
    }
}

/// Parse one `<refno> <uidl>` line from a `UIDL` listing.
///
/// # Errors
///
/// `Error::Protocol` if the line doesn't split into exactly two fields
/// or the refno isn't a valid integer.
pub fn parse_uidl_line(line: &[u8]) -> Result<(u32, String)> {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.splitn(2, ' ');
    let refno = parts
        .next()
        .ok_or_else(|| Error::Protocol(format!("malformed UIDL line: {text}")))?;
    let uidl = parts
        .next()
        .ok_or_else(|| Error::Protocol(format!("malformed UIDL line: {text}")))?;
    let refno: u32 = refno
        .parse()
        .map_err(|_| Error::Protocol(format!("malformed UIDL refno: {text}")))?;
    Ok((refno, uidl.trim().to_string()))
}

/// Parse `STAT`'s `<count> <size>` response body.
///
/// # Errors
///
/// `Error::Protocol` if the trailing text doesn't contain two integers.
pub fn parse_stat(trailing: &str) -> Result<(u64, u64)> {
    let mut parts = trailing.split_whitespace();
    let count: u64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed STAT reply: {trailing}")))?;
    let size: u64 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("malformed STAT reply: {trailing}")))?;
    Ok((count, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_forms() {
        assert_eq!(Request::User("bob".into()).to_wire(), "USER bob");
        assert_eq!(Request::Top { refno: 1, lines: 0 }.to_wire(), "TOP 1 0");
        assert_eq!(Request::Uidl(None).to_wire(), "UIDL");
        assert_eq!(Request::Uidl(Some(2)).to_wire(), "UIDL 2");
    }

    #[test]
    fn parses_uidl_line() {
        let (refno, uidl) = parse_uidl_line(b"1 AAA").unwrap();
        assert_eq!(refno, 1);
        assert_eq!(uidl, "AAA");
    }

    #[test]
    fn rejects_malformed_uidl_line() {
        assert!(parse_uidl_line(b"garbage").is_err());
    }

    #[test]
    fn parses_stat_reply() {
        let (count, size) = parse_stat("2 512").unwrap();
        assert_eq!(count, 2);
        assert_eq!(size, 512);
    }
}
