//! Data model for a single mailbox message (spec §3, "HeaderRecord")
//!
//! `HeaderRecord` is keyed persistently by UIDL; `refno` is only valid
//! for the lifetime of the current POP3 connection and is recomputed by
//! [`crate::pop3::PopSession::fetch_headers`] on every (re)connect.

use serde::{Deserialize, Serialize};

/// Byte range and total length of a message body within its own stream.
///
/// The offset is always 0 in this crate's bundled body-cache backend
/// (each UIDL gets its own file), but the field is kept distinct from
/// `length` because spec §3 describes it as a stand-alone quantity a
/// collaborator backend may interpret differently (e.g. a single
/// concatenated mbox-style store).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMeta {
    pub offset: u64,
    pub length: u64,
}

/// Per-message state that is neither persisted by the header cache nor
/// derived from the server: local bookkeeping re-derived at restore
/// time (spec §8, "flags ... are NOT round-tripped").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub deleted: bool,
    pub changed: bool,
    pub read: bool,
    pub old: bool,
}

/// A minimal RFC 822 envelope. The full grammar is out of scope (spec
/// §1, "RFC 822 header parsing" is an external collaborator); this is
/// the small slice `fetch_headers` needs to populate a usable record
/// and that the bundled [`crate::envelope::HeaderLineParser`] extracts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    pub message_id: Option<String>,
}

/// The part of a [`HeaderRecord`] that survives a header-cache
/// round-trip (spec §8 round-trip law: envelope, content length and
/// offset equal the originals; flags and refno/index are re-derived).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedHeader {
    pub env: Envelope,
    pub content: ContentMeta,
}

/// A single mailbox message as tracked by a [`crate::pop3::PopSession`]
/// (spec §3, "HeaderRecord").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Persistent server-assigned identity (spec §3 invariant: "UIDL is
    /// the persistent identity").
    pub uidl: String,
    /// 1-based message number for the *current* connection; -1 means
    /// "not seen this session" (spec §3).
    pub refno: i64,
    /// Stable 0-based ordinal within the mailbox view.
    pub index: usize,
    pub env: Envelope,
    pub content: ContentMeta,
    pub flags: Flags,
}

impl HeaderRecord {
    #[must_use]
    pub fn new(uidl: String, refno: i64, index: usize) -> Self {
        Self {
            uidl,
            refno,
            index,
            env: Envelope::default(),
            content: ContentMeta::default(),
            flags: Flags::default(),
        }
    }

    /// Whether this record is addressable on the server right now
    /// (spec §7, "Stale": `refno = -1` at fetch time).
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        self.refno <= 0
    }

    /// Restore persisted envelope/content fields while preserving the
    /// freshly assigned `refno`, `index`, and `uidl` (spec §4.3.4 step 4:
    /// "preserving the freshly assigned refno, index, and UIDL pointer").
    pub fn apply_persisted(&mut self, persisted: PersistedHeader) {
        self.env = persisted.env;
        self.content = persisted.content;
    }

    #[must_use]
    pub fn to_persisted(&self) -> PersistedHeader {
        PersistedHeader {
            env: self.env.clone(),
            content: self.content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_stale_until_refno_assigned() {
        let r = HeaderRecord::new("AAA".into(), -1, 0);
        assert!(r.is_stale());
    }

    #[test]
    fn persisted_round_trip_preserves_envelope_not_flags() {
        let mut r = HeaderRecord::new("AAA".into(), 7, 2);
        r.env.subject = Some("hello".into());
        r.content.length = 512;
        r.flags.read = true;

        let persisted = r.to_persisted();

        let mut restored = HeaderRecord::new("AAA".into(), 9, 2);
        restored.apply_persisted(persisted);

        assert_eq!(restored.env.subject.as_deref(), Some("hello"));
        assert_eq!(restored.content.length, 512);
        assert_eq!(restored.refno, 9);
        assert!(!restored.flags.read);
    }
}
