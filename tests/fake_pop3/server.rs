//! In-process blocking fake POP3 server for integration testing.
//!
//! Speaks enough of RFC 1939 + RFC 2595 to exercise `popcore`'s full
//! connection lifecycle: greeting -> (APOP | USER/PASS) -> STAT -> UIDL
//! -> TOP/RETR -> DELE -> QUIT, with an optional TLS listener (either
//! from the first byte, or upgraded in place after `STLS`).

use super::io::{read_line, write_line};
use super::mailbox::Mailbox;
use rustls::pki_types::PrivatePkcs8KeyDer;
use rustls::{ServerConfig, ServerConnection, StreamOwned};
use std::io::{BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};

/// Which TLS posture the fake server presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Plain,
    /// TLS from the first byte (`pops://`-style).
    Implicit,
    /// Plaintext until the client issues `STLS`.
    StartTls,
}

/// A fake POP3 server bound to an OS-assigned localhost port. Runs
/// until the test process exits.
pub struct FakePop3Server {
    port: u16,
}

impl FakePop3Server {
    /// Start a fake server with the given mailbox and credentials.
    #[must_use]
    pub fn start(mailbox: Mailbox, user: &str, password: &str, tls_mode: TlsMode) -> Self {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let tls_config = (tls_mode != TlsMode::Plain).then(make_server_tls_config);
        let mailbox = Arc::new(Mutex::new(mailbox));
        let user = user.to_string();
        let password = password.to_string();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let mailbox = Arc::clone(&mailbox);
                let tls_config = tls_config.clone();
                let user = user.clone();
                let password = password.clone();
                std::thread::spawn(move || {
                    handle_connection(stream, tls_config, tls_mode, &mailbox, &user, &password);
                });
            }
        });

        Self { port }
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

fn make_server_tls_config() -> Arc<ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_string()])
        .expect("generate self-signed cert");
    let cert_der = cert.cert.der().clone();
    let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

    Arc::new(
        ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config"),
    )
}

fn handle_connection(
    stream: TcpStream,
    tls_config: Option<Arc<ServerConfig>>,
    tls_mode: TlsMode,
    mailbox: &Mutex<Mailbox>,
    user: &str,
    password: &str,
) {
    stream.set_nodelay(true).ok();

    if tls_mode == TlsMode::Implicit {
        let config = tls_config.expect("implicit TLS requires a server config");
        let conn = ServerConnection::new(config).expect("start TLS handshake");
        let tls = StreamOwned::new(conn, stream);
        run_session(tls, None, mailbox, user, password);
        return;
    }

    run_session(stream, tls_config, mailbox, user, password);
}

/// Runs the command loop over `conn`. If `tls_config` is `Some` and the
/// client later sends `STLS`, the connection is upgraded in place.
fn run_session<S: Read + Write>(
    conn: S,
    tls_config: Option<Arc<ServerConfig>>,
    mailbox: &Mutex<Mailbox>,
    user: &str,
    password: &str,
) {
    let mut conn = conn;
    write_line(&mut conn, "+OK fake POP3 server ready <1.test@fake>").ok();

    let mut reader = BufReader::new(conn);
    let mut authenticated = false;
    let mut pending_user: Option<String> = None;

    loop {
        let Ok(Some(line)) = read_line(&mut reader) else { break };
        let mut parts = line.splitn(2, ' ');
        let cmd = parts.next().unwrap_or("").to_ascii_uppercase();
        let rest = parts.next().unwrap_or("");

        match cmd.as_str() {
            "USER" => {
                pending_user = Some(rest.to_string());
                write_line(reader.get_mut(), "+OK send PASS").ok();
            }
            "PASS" => {
                if pending_user.as_deref() == Some(user) && rest == password {
                    authenticated = true;
                    write_line(reader.get_mut(), "+OK logged in").ok();
                } else {
                    write_line(reader.get_mut(), "-ERR invalid credentials").ok();
                }
            }
            "APOP" => {
                let mut it = rest.splitn(2, ' ');
                let given_user = it.next().unwrap_or("");
                let given_digest = it.next().unwrap_or("");
                let expected = apop_digest("<1.test@fake>", password);
                if given_user == user && given_digest == expected {
                    authenticated = true;
                    write_line(reader.get_mut(), "+OK logged in").ok();
                } else {
                    write_line(reader.get_mut(), "-ERR invalid credentials").ok();
                }
            }
            "CAPA" => {
                write_line(reader.get_mut(), "+OK capability list follows").ok();
                write_line(reader.get_mut(), "UIDL").ok();
                write_line(reader.get_mut(), "TOP").ok();
                if tls_config.is_some() {
                    write_line(reader.get_mut(), "STLS").ok();
                }
                write_line(reader.get_mut(), ".").ok();
            }
            "STLS" if tls_config.is_some() => {
                write_line(reader.get_mut(), "+OK begin TLS negotiation").ok();
                let config = tls_config.clone().unwrap();
                let server_conn = ServerConnection::new(config).expect("start TLS handshake");
                let inner = reader.into_inner();
                let tls = StreamOwned::new(server_conn, inner);
                run_session(tls, None, mailbox, user, password);
                return;
            }
            "STAT" if authenticated => {
                let (count, size) = mailbox.lock().unwrap().stat();
                write_line(reader.get_mut(), &format!("+OK {count} {size}")).ok();
            }
            "UIDL" if authenticated => {
                let listing = mailbox.lock().unwrap().uidl_listing();
                if rest.trim().is_empty() {
                    write_line(reader.get_mut(), "+OK").ok();
                    for (refno, uidl) in listing {
                        write_line(reader.get_mut(), &format!("{refno} {uidl}")).ok();
                    }
                    write_line(reader.get_mut(), ".").ok();
                } else if let Ok(refno) = rest.trim().parse::<u32>() {
                    match listing.iter().find(|(r, _)| *r == refno) {
                        Some((r, uidl)) => {
                            write_line(reader.get_mut(), &format!("+OK {r} {uidl}")).ok();
                        }
                        None => {
                            write_line(reader.get_mut(), "-ERR no such message").ok();
                        }
                    }
                }
            }
            "TOP" if authenticated => {
                let mut it = rest.split_whitespace();
                let refno: Option<u32> = it.next().and_then(|s| s.parse().ok());
                if let Some(msg) = refno.and_then(|r| mailbox.lock().unwrap().message_at(r).cloned()) {
                    write_line(reader.get_mut(), "+OK top of message follows").ok();
                    for header_line in msg.body.lines().take_while(|l| !l.is_empty()) {
                        write_dot_stuffed(reader.get_mut(), header_line);
                    }
                    write_line(reader.get_mut(), ".").ok();
                } else {
                    write_line(reader.get_mut(), "-ERR no such message").ok();
                }
            }
            "RETR" if authenticated => {
                let refno: Option<u32> = rest.trim().parse().ok();
                if let Some(msg) = refno.and_then(|r| mailbox.lock().unwrap().message_at(r).cloned()) {
                    write_line(reader.get_mut(), "+OK message follows").ok();
                    for body_line in msg.body.lines() {
                        write_dot_stuffed(reader.get_mut(), body_line);
                    }
                    write_line(reader.get_mut(), ".").ok();
                } else {
                    write_line(reader.get_mut(), "-ERR no such message").ok();
                }
            }
            "DELE" if authenticated => {
                let refno: Option<u32> = rest.trim().parse().ok();
                match refno {
                    Some(r) if mailbox.lock().unwrap().message_at(r).is_some() => {
                        mailbox.lock().unwrap().pending_deletes.push(r);
                        write_line(reader.get_mut(), "+OK message deleted").ok();
                    }
                    _ => {
                        write_line(reader.get_mut(), "-ERR no such message").ok();
                    }
                }
            }
            "NOOP" if authenticated => {
                write_line(reader.get_mut(), "+OK").ok();
            }
            "RSET" if authenticated => {
                mailbox.lock().unwrap().pending_deletes.clear();
                write_line(reader.get_mut(), "+OK").ok();
            }
            "QUIT" => {
                write_line(reader.get_mut(), "+OK goodbye").ok();
                break;
            }
            _ if !authenticated => {
                write_line(reader.get_mut(), "-ERR authentication required").ok();
            }
            _ => {
                write_line(reader.get_mut(), "-ERR unknown command").ok();
            }
        }
    }
}

/// Independent of `popcore`'s own implementation: the fake server
/// computes its expected digest the same way a real POP3 server would,
/// per RFC 1939 §7.
fn apop_digest(challenge: &str, password: &str) -> String {
    use md5::{Digest as _, Md5};
    let mut hasher = Md5::new();
    hasher.update(challenge.as_bytes());
    hasher.update(password.as_bytes());
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

fn write_dot_stuffed(w: &mut impl Write, line: &str) {
    if let Some(stripped) = line.strip_prefix('.') {
        write_line(w, &format!(".{stripped}")).ok();
    } else {
        write_line(w, line).ok();
    }
}
