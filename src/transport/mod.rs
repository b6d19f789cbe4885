//! Transport (spec §4.1)
//!
//! A buffered byte stream over a socket: read-line with `\r\n` stripping,
//! interruptible blocking I/O, and `poll`. `Transport` is implemented by
//! [`TcpTransport`] for plaintext and by [`crate::tls::TlsTransport`] once
//! TLS is layered on — the same connection's read/write/close vector is
//! swapped in place, mirroring the C original's function-pointer table.

mod buffer;
mod tcp;

pub use buffer::RecvBuffer;
pub use tcp::TcpTransport;

use crate::error::{Error, Result};
use std::time::Duration;

/// Outcome of [`Transport::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Data is available to read.
    Ready,
    /// The timeout elapsed with nothing to read.
    Empty,
    /// The underlying connection can't report readiness; treat as "assume readable".
    Unsupported,
}

/// A single-threaded, blocking byte transport (spec §4.1).
///
/// All methods are synchronous and may block. Implementations must
/// check [`crate::interrupt::is_set`] around any OS-level wait and
/// return `Error::Aborted` rather than retrying silently.
pub trait Transport {
    /// Read up to `buf.len()` bytes. Returns 0 only at genuine EOF.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write the entirety of `buf`.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Wait up to `timeout` for readability. `None` blocks indefinitely.
    fn poll(&mut self, timeout: Option<Duration>) -> Result<PollOutcome>;

    /// Close the underlying connection. Idempotent.
    fn close(&mut self) -> Result<()>;

    /// Read one logical line, `\r\n` (or bare `\n`) stripped.
    ///
    /// The default implementation is byte-at-a-time over [`Self::read`]
    /// via the shared [`RecvBuffer`] cursor model described in spec §3 —
    /// concrete transports override this only when they keep their own
    /// buffer (see [`TcpTransport`]).
    fn readln(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        loop {
            let b = self.readchar()?;
            if b == b'\n' {
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            line.push(b);
        }
    }

    /// Read a single byte, propagating interruption distinctly from EOF.
    fn readchar(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            if crate::interrupt::is_set() {
                return Err(Error::Aborted);
            }
            match self.read(&mut byte) {
                Ok(0) => return Err(Error::Transport("connection closed by peer".into())),
                Ok(_) => return Ok(byte[0]),
                Err(e) => return Err(e),
            }
        }
    }
}
