//! Process-level interrupt flag (spec §5)
//!
//! Any blocking read/write, TLS record I/O, or interactive prompt is a
//! suspension point that must notice a process-level SIGINT and abort
//! cooperatively rather than block forever. This is a single process-wide
//! flag, set from a signal handler via `signal-hook` and polled by
//! [`Transport`](crate::transport::Transport) implementations between I/O
//! calls — the same shape as checking `errno == EINTR` in the blocking C
//! original, minus the `EINTR` retry-vs-abort ambiguity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Register the process SIGINT handler once. Idempotent; safe to call
/// from multiple mailbox opens in the same process.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed.
pub fn install() -> std::io::Result<()> {
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    // SAFETY: `flag::register` only performs an atomic store from the
    // handler context, which is async-signal-safe.
    let flag: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&flag))?;
    std::thread::spawn(move || loop {
        if flag.load(Ordering::SeqCst) {
            INTERRUPTED.store(true, Ordering::SeqCst);
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    });
    Ok(())
}

/// Whether SIGINT has fired since the process started (or since [`clear`]).
pub fn is_set() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Reset the flag once the caller has handled the abort (e.g. after
/// surfacing `Error::Aborted` back to an interactive shell that keeps running).
pub fn clear() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}

/// Guard for shielding a pending `connect()` from `SIGWINCH` (spec §5:
/// "some kernels abort [connect] on SIGWINCH"). Blocks the signal for
/// the guard's lifetime and restores the previous mask on drop.
pub struct WinchShield {
    _private: (),
}

impl WinchShield {
    #[must_use]
    pub fn block() -> Self {
        // signal-hook's blocking iterator mechanism is overkill for a
        // single transient mask; libc-level sigprocmask is the
        // idiomatic escape hatch used for exactly this kind of
        // short-lived shielding.
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&raw mut set);
            libc::sigaddset(&raw mut set, libc::SIGWINCH);
            libc::pthread_sigmask(libc::SIG_BLOCK, &raw const set, std::ptr::null_mut());
        }
        Self { _private: () }
    }
}

impl Drop for WinchShield {
    fn drop(&mut self) {
        unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&raw mut set);
            libc::sigaddset(&raw mut set, libc::SIGWINCH);
            libc::pthread_sigmask(libc::SIG_UNBLOCK, &raw const set, std::ptr::null_mut());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        clear();
        assert!(!is_set());
    }
}
