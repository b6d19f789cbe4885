//! Test fixture mailbox: a flat, ordered list of (UIDL, body) pairs.

#[derive(Debug, Clone)]
pub struct Message {
    pub uidl: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    pub messages: Vec<Message>,
    /// 1-based refnos the server has committed `DELE` for; cleared at
    /// `QUIT` (deletions are only effective then, per RFC 1939).
    pub pending_deletes: Vec<u32>,
}

impl Mailbox {
    #[must_use]
    pub fn stat(&self) -> (usize, usize) {
        let count = self.live_count();
        let size: usize = self.live_messages().map(|m| m.body.len()).sum();
        (count, size)
    }

    fn live_count(&self) -> usize {
        self.live_messages().count()
    }

    fn live_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.pending_deletes.contains(&(u32::try_from(i + 1).unwrap())))
            .map(|(_, m)| m)
    }

    #[must_use]
    pub fn uidl_listing(&self) -> Vec<(u32, String)> {
        self.messages
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.pending_deletes.contains(&(u32::try_from(i + 1).unwrap())))
            .map(|(i, m)| (u32::try_from(i + 1).unwrap(), m.uidl.clone()))
            .collect()
    }

    #[must_use]
    pub fn message_at(&self, refno: u32) -> Option<&Message> {
        if self.pending_deletes.contains(&refno) {
            return None;
        }
        self.messages.get(usize::try_from(refno).ok()?.checked_sub(1)?)
    }
}

/// Builds a [`Mailbox`] fixture for a test.
#[derive(Default)]
pub struct MailboxBuilder {
    messages: Vec<Message>,
}

impl MailboxBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn message(mut self, uidl: &str, body: &str) -> Self {
        self.messages.push(Message {
            uidl: uidl.to_string(),
            body: body.to_string(),
        });
        self
    }

    #[must_use]
    pub fn build(self) -> Mailbox {
        Mailbox {
            messages: self.messages,
            pending_deletes: Vec::new(),
        }
    }
}
