//! Mailbox driver binding (spec §4.5)
//!
//! Binds [`PopSession`] into the vtable-shaped contract a mail-store
//! collaborator expects: `{ open, close, check, sync, open_message,
//! close_message }` over a `Context` holding the mailbox path, the
//! header array, message count, and an ACL bitset.

use crate::error::Result;
use crate::header::HeaderRecord;
use crate::pop3::{CheckOutcome, PopSession};
use std::io::Read;
use std::time::Duration;

/// Access rights the driver grants the mailbox view (spec §4.5: "sets
/// ACL to {SEEN, DELETE}; additionally sets WRITE iff the header cache
/// is available").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Acl {
    pub seen: bool,
    pub delete: bool,
    pub write: bool,
}

/// The mailbox view the driver publishes: path, live header array,
/// message count, and the ACL computed at open time (spec §4.5).
pub struct Context {
    pub path: String,
    pub acl: Acl,
}

/// Binds a [`PopSession`] to the mailbox-operations contract.
pub struct MailboxDriver {
    session: PopSession,
    context: Context,
    connect_timeout: Duration,
}

impl MailboxDriver {
    #[must_use]
    pub fn new(session: PopSession, path: String, connect_timeout: Duration) -> Self {
        Self {
            session,
            context: Context {
                path,
                acl: Acl::default(),
            },
            connect_timeout,
        }
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn headers(&self) -> &[HeaderRecord] {
        self.session.records()
    }

    /// vtable `open`: connect, authenticate, fetch headers, compute ACL.
    ///
    /// # Errors
    ///
    /// Propagates `PopSession::open` errors.
    pub fn open(&mut self, header_cache_available: bool) -> Result<()> {
        self.session.open(self.connect_timeout)?;
        self.context.acl = Acl {
            seen: true,
            delete: true,
            write: header_cache_available,
        };
        Ok(())
    }

    /// vtable `close`: best-effort `QUIT`.
    pub fn close(&mut self) {
        self.session.close();
    }

    /// vtable `check`: spec §4.3.7 rate-limited re-check.
    ///
    /// # Errors
    ///
    /// Propagates `PopSession::check` errors.
    pub fn check(&mut self) -> Result<CheckOutcome> {
        self.session.check(self.connect_timeout)
    }

    /// Stage or unstage the message at `index` for deletion on the next
    /// [`Self::sync`].
    pub fn mark_deleted(&mut self, index: usize, deleted: bool) {
        self.session.mark_deleted(index, deleted);
    }

    /// vtable `sync`: spec §4.3.6 apply deletions, then `QUIT`.
    ///
    /// # Errors
    ///
    /// Propagates `PopSession::sync` errors.
    pub fn sync(&mut self) -> Result<()> {
        self.session.sync()
    }

    /// vtable `open_message`: spec §4.3.5 fetch a message body by its
    /// stable 0-based index in [`Self::headers`].
    ///
    /// # Errors
    ///
    /// `Error::Stale` if the record's refno is -1, otherwise transport,
    /// protocol, or integrity errors.
    pub fn open_message(&mut self, index: usize) -> Result<Box<dyn Read + Send>> {
        self.session.fetch_message(index)
    }

    /// vtable `close_message`: a no-op at this layer — the returned
    /// reader owns whatever resources it holds and is dropped by the
    /// caller.
    pub fn close_message(&self) {}
}
