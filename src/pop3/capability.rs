//! Capability probing (spec §4.3.3)
//!
//! `UIDL` and `TOP` each start `Unknown`; the first real use observes
//! `+OK` (→ `Present`, remembered) or `-ERR` (→ `Absent`, remembered).
//! The transition is one-way for the life of a connection — sticky
//! downgrade, never re-probed until reconnect (spec §7: "Capability
//! downgrade ... is sticky for the session").

/// Whether a POP3 extension command is usable on the current connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Capability {
    #[default]
    Unknown,
    Absent,
    Present,
}

impl Capability {
    /// Record the outcome of the first real use of the command. Once
    /// `Absent` or `Present`, further calls are no-ops — the transition
    /// never goes backwards (spec §3 invariant).
    pub fn observe(&mut self, ok: bool) {
        if *self == Self::Unknown {
            *self = if ok { Self::Present } else { Self::Absent };
        }
    }

    #[must_use]
    pub const fn is_present(self) -> bool {
        matches!(self, Self::Present)
    }

    #[must_use]
    pub const fn is_absent(self) -> bool {
        matches!(self, Self::Absent)
    }
}
