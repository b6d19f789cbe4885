//! POP3 protocol engine (spec §4.3)

mod auth;
mod capability;
mod proto;
mod session;

pub use capability::Capability;
pub use proto::{Request, Status};
pub use session::{PopSession, Status as SessionStatus};

/// Outcome of [`PopSession::check`] (spec §4.3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoChange,
    NewMail,
}
