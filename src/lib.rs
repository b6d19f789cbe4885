#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! POP3 mail retrieval core with an embedded TLS trust engine.
//!
//! Three cooperating state machines: a POP3 protocol engine, a UIDL-keyed
//! two-tier cache coordinator, and a certificate trust engine that mixes
//! automatic chain validation with an interactive fallback prompt.

pub mod cache;
pub mod config;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod header;
pub mod interrupt;
pub mod pop3;
pub mod tls;
pub mod transport;

pub use cache::{BodyStore, Coordinator, FileBodyStore, HeaderStore, SledHeaderStore};
pub use config::{AccountConfig, DeleteMode, PopConfig, TlsMode, TlsVersions};
pub use driver::{Acl, Context, MailboxDriver};
pub use envelope::{EnvelopeParser, HeaderLineParser};
pub use error::{Error, Result};
pub use header::{ContentMeta, Envelope, Flags, HeaderRecord, PersistedHeader};
pub use pop3::{CheckOutcome, PopSession};
pub use tls::{CertPrompt, PromptChoice, PromptContext, RejectPrompt, StdioPrompt, TlsEngine, TrustStore};
