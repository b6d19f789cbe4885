//! Fake POP3 server for integration testing
//!
//! An in-process blocking server speaking enough of RFC 1939 + RFC 2595
//! to exercise `popcore`'s full connection lifecycle end to end.
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, optional TLS, and the command loop
//! - `mailbox` -- test data model (messages, builder)
//! - `io` -- shared line I/O helpers

mod io;
pub mod mailbox;
mod server;

pub use mailbox::MailboxBuilder;
pub use server::{FakePop3Server, TlsMode};
