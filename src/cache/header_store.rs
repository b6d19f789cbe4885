//! Bundled header-cache backend (`sled` + `bincode`)
//!
//! spec §4.4 leaves the header cache's storage engine to a collaborator
//! ("opaque to the coordinator"); this is the crate's default, runnable
//! implementation of the [`super::HeaderStore`] trait so `popcore` works
//! end to end without a caller wiring in their own.

use super::HeaderStore;
use crate::error::{Error, Result};
use crate::header::PersistedHeader;
use std::path::Path;

/// A `sled`-backed header cache. The spec's `neomutt.hcache` naming
/// convention (spec §6) is the caller's concern — this type just opens
/// whatever path it is given.
pub struct SledHeaderStore {
    db: sled::Db,
}

impl SledHeaderStore {
    /// # Errors
    ///
    /// Returns `Error::Integrity` if the backing file can't be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| Error::Integrity(format!("opening header cache: {e}")))?;
        Ok(Self { db })
    }
}

impl HeaderStore for SledHeaderStore {
    fn fetch(&self, uidl: &str) -> Result<Option<PersistedHeader>> {
        let Some(bytes) = self
            .db
            .get(uidl.as_bytes())
            .map_err(|e| Error::Integrity(format!("header cache read: {e}")))?
        else {
            return Ok(None);
        };
        let header = bincode::deserialize(&bytes)
            .map_err(|e| Error::Integrity(format!("header cache decode: {e}")))?;
        Ok(Some(header))
    }

    fn store(&self, uidl: &str, header: &PersistedHeader) -> Result<()> {
        let bytes = bincode::serialize(header)
            .map_err(|e| Error::Integrity(format!("header cache encode: {e}")))?;
        self.db
            .insert(uidl.as_bytes(), bytes)
            .map_err(|e| Error::Integrity(format!("header cache write: {e}")))?;
        Ok(())
    }

    fn delete(&self, uidl: &str) -> Result<()> {
        self.db
            .remove(uidl.as_bytes())
            .map_err(|e| Error::Integrity(format!("header cache delete: {e}")))?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::Integrity(format!("header cache flush: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Envelope;

    #[test]
    fn round_trips_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledHeaderStore::open(dir.path().join("hcache")).unwrap();

        let mut header = PersistedHeader::default();
        header.env = Envelope {
            subject: Some("hi".into()),
            ..Default::default()
        };
        header.content.length = 100;

        store.store("AAA", &header).unwrap();
        let fetched = store.fetch("AAA").unwrap().unwrap();
        assert_eq!(fetched.env.subject.as_deref(), Some("hi"));
        assert_eq!(fetched.content.length, 100);

        store.delete("AAA").unwrap();
        assert!(store.fetch("AAA").unwrap().is_none());
    }

    #[test]
    fn missing_uidl_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SledHeaderStore::open(dir.path().join("hcache")).unwrap();
        assert!(store.fetch("nope").unwrap().is_none());
    }
}
