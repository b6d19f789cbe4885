//! Plaintext TCP transport (spec §4.1)

use super::{PollOutcome, RecvBuffer, Transport};
use crate::error::{Error, Result};
use crate::interrupt::{self, WinchShield};
use std::io::{self, ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::debug;

pub struct TcpTransport {
    stream: TcpStream,
    recv: RecvBuffer,
}

impl TcpTransport {
    /// Connect with a connect-only timeout (spec §5: "a `connect-timeout`
    /// arms an alarm around socket-level connect only"). `SIGWINCH` is
    /// blocked for the duration since some kernels abort a pending
    /// connect when it fires.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the host doesn't resolve or the
    /// connection can't be established within `connect_timeout`.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let _shield = WinchShield::block();
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Transport(format!("resolving {host}:{port}: {e}")))?
            .next()
            .ok_or_else(|| Error::Transport(format!("no address for {host}:{port}")))?;

        debug!(%addr, "connecting");
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|e| Error::Transport(format!("connect to {addr}: {e}")))?;
        stream.set_nodelay(true).ok();

        Ok(Self {
            stream,
            recv: RecvBuffer::new(),
        })
    }

    /// Hand the underlying socket to a TLS layer, consuming this transport.
    #[must_use]
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if interrupt::is_set() {
            return Err(Error::Aborted);
        }
        self.stream.read(buf).map_err(map_io)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if interrupt::is_set() {
            return Err(Error::Aborted);
        }
        self.stream.write_all(buf).map_err(map_io)?;
        Ok(buf.len())
    }

    fn poll(&mut self, timeout: Option<Duration>) -> Result<PollOutcome> {
        // `std::net` has no portable readiness poll independent of a
        // read timeout; set one transiently and probe with a zero-length
        // peek-equivalent read timeout, then restore blocking mode.
        self.stream.set_read_timeout(timeout).map_err(map_io)?;
        let mut probe = [0u8; 1];
        let outcome = match self.stream.peek(&mut probe) {
            Ok(_) => PollOutcome::Ready,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                PollOutcome::Empty
            }
            Err(e) => return Err(map_io(e)),
        };
        self.stream.set_read_timeout(None).map_err(map_io)?;
        Ok(outcome)
    }

    fn close(&mut self) -> Result<()> {
        self.stream.shutdown(std::net::Shutdown::Both).ok();
        Ok(())
    }

    fn readln(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            if interrupt::is_set() {
                return Err(Error::Aborted);
            }
            let byte = match self.recv.pop() {
                Some(b) => b,
                None => {
                    let n = self
                        .stream
                        .read(self.recv.fill_slice())
                        .map_err(map_io)?;
                    if n == 0 {
                        return Err(Error::Transport("connection closed by peer".into()));
                    }
                    self.recv.set_filled(n);
                    continue;
                }
            };
            if byte == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            line.push(byte);
        }
    }

    fn readchar(&mut self) -> Result<u8> {
        if interrupt::is_set() {
            return Err(Error::Aborted);
        }
        if let Some(b) = self.recv.pop() {
            return Ok(b);
        }
        let n = self
            .stream
            .read(self.recv.fill_slice())
            .map_err(map_io)?;
        if n == 0 {
            return Err(Error::Transport("connection closed by peer".into()));
        }
        self.recv.set_filled(n);
        Ok(self.recv.pop().expect("just filled"))
    }
}

fn map_io(e: io::Error) -> Error {
    if e.kind() == ErrorKind::Interrupted {
        Error::Aborted
    } else {
        Error::Transport(e.to_string())
    }
}
