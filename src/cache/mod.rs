//! Cache Coordinator (spec §4.4)
//!
//! Two opaque subordinate stores keyed by UIDL — a header cache holding
//! serialized [`HeaderRecord`](crate::header::HeaderRecord) fields and a
//! body cache holding raw message bytes — plus the coordinator that
//! reconciles both against the session's live UIDL set (orphan
//! eviction, spec §4.3.4 step 6) without ever interpreting the byte
//! contents it shuttles between them.

mod body_store;
mod header_store;

pub use body_store::{BodyWriter, FileBodyStore};
pub use header_store::SledHeaderStore;

use crate::error::Result;
use crate::header::PersistedHeader;
use std::io::Read;

/// Header cache: key = UIDL, value = serialized [`PersistedHeader`]
/// (spec §4.4: "Operations: fetch, store, delete, close").
pub trait HeaderStore: Send + Sync {
    fn fetch(&self, uidl: &str) -> Result<Option<PersistedHeader>>;
    fn store(&self, uidl: &str, header: &PersistedHeader) -> Result<()>;
    fn delete(&self, uidl: &str) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// Body cache: key = UIDL, value = message bytes (spec §4.4:
/// "Operations: get, put, commit, exists, del, list").
///
/// `put` returns a [`BodyWriter`] rather than committing immediately,
/// so a transport failure mid-`RETR` can discard a partial body (spec
/// §4.3.5: "On transport failure, close and unlink the partial
/// writer").
pub trait BodyStore: Send + Sync {
    fn exists(&self, uidl: &str) -> Result<bool>;
    fn get(&self, uidl: &str) -> Result<Box<dyn Read + Send>>;
    fn put(&self, uidl: &str) -> Result<Box<dyn BodyWriter>>;
    fn del(&self, uidl: &str) -> Result<()>;
    /// Invoke `visitor` with every UIDL currently in the cache.
    fn list(&self, visitor: &mut dyn FnMut(&str)) -> Result<()>;
}

/// Binds a [`HeaderStore`] and a [`BodyStore`] together and performs
/// the orphan sweep spec §4.3.4 step 6 describes: "for every
/// body-cache id, keep iff it matches a current UIDL ... delete
/// otherwise".
pub struct Coordinator {
    pub headers: Box<dyn HeaderStore>,
    pub bodies: Box<dyn BodyStore>,
}

impl Coordinator {
    #[must_use]
    pub fn new(headers: Box<dyn HeaderStore>, bodies: Box<dyn BodyStore>) -> Self {
        Self { headers, bodies }
    }

    /// Delete every body-cache (and header-cache) entry whose UIDL is
    /// not present in `live_uidls`. Idempotent: repeated calls with the
    /// same live set are no-ops after the first (spec §8 invariant).
    pub fn evict_orphans(&self, live_uidls: &[String]) -> Result<usize> {
        let mut orphans = Vec::new();
        self.bodies.list(&mut |uidl| {
            if !live_uidls.iter().any(|u| u == uidl) {
                orphans.push(uidl.to_string());
            }
        })?;

        for uidl in &orphans {
            self.bodies.del(uidl)?;
            self.headers.delete(uidl)?;
        }
        Ok(orphans.len())
    }

    /// Drop every cached body (spec §4.3.6: "on `+OK`, server commits
    /// deletions and we wipe the in-memory body cache").
    pub fn clear_bodies(&self, uidls: &[String]) -> Result<()> {
        for uidl in uidls {
            if self.bodies.exists(uidl)? {
                self.bodies.del(uidl)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct MemHeaderStore(Mutex<HashMap<String, PersistedHeader>>);

    impl HeaderStore for MemHeaderStore {
        fn fetch(&self, uidl: &str) -> Result<Option<PersistedHeader>> {
            Ok(self.0.lock().unwrap().get(uidl).cloned())
        }
        fn store(&self, uidl: &str, header: &PersistedHeader) -> Result<()> {
            self.0
                .lock()
                .unwrap()
                .insert(uidl.to_string(), header.clone());
            Ok(())
        }
        fn delete(&self, uidl: &str) -> Result<()> {
            self.0.lock().unwrap().remove(uidl);
            Ok(())
        }
        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct MemWriter {
        uidl: String,
        buf: Vec<u8>,
        backing: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl Write for MemWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buf.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl BodyWriter for MemWriter {
        fn commit(self: Box<Self>) -> Result<()> {
            self.backing.lock().unwrap().insert(self.uidl, self.buf);
            Ok(())
        }
        fn abort(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemBodyStore(Arc<Mutex<HashMap<String, Vec<u8>>>>);

    impl BodyStore for MemBodyStore {
        fn exists(&self, uidl: &str) -> Result<bool> {
            Ok(self.0.lock().unwrap().contains_key(uidl))
        }
        fn get(&self, uidl: &str) -> Result<Box<dyn Read + Send>> {
            let data = self.0.lock().unwrap().get(uidl).cloned().unwrap_or_default();
            Ok(Box::new(std::io::Cursor::new(data)))
        }
        fn put(&self, uidl: &str) -> Result<Box<dyn BodyWriter>> {
            Ok(Box::new(MemWriter {
                uidl: uidl.to_string(),
                buf: Vec::new(),
                backing: Arc::clone(&self.0),
            }))
        }
        fn del(&self, uidl: &str) -> Result<()> {
            self.0.lock().unwrap().remove(uidl);
            Ok(())
        }
        fn list(&self, visitor: &mut dyn FnMut(&str)) -> Result<()> {
            for k in self.0.lock().unwrap().keys() {
                visitor(k);
            }
            Ok(())
        }
    }

    #[test]
    fn evicts_bodies_and_headers_not_in_live_set() {
        let coord = Coordinator::new(
            Box::new(MemHeaderStore::default()),
            Box::new(MemBodyStore::default()),
        );
        coord.headers.store("AAA", &PersistedHeader::default()).unwrap();
        coord.headers.store("BBB", &PersistedHeader::default()).unwrap();
        let w = coord.bodies.put("AAA").unwrap();
        w.commit().unwrap();
        let w = coord.bodies.put("BBB").unwrap();
        w.commit().unwrap();

        let evicted = coord.evict_orphans(&["AAA".to_string()]).unwrap();
        assert_eq!(evicted, 1);
        assert!(coord.bodies.exists("AAA").unwrap());
        assert!(!coord.bodies.exists("BBB").unwrap());
        assert!(coord.headers.fetch("BBB").unwrap().is_none());
    }

    #[test]
    fn eviction_is_idempotent() {
        let coord = Coordinator::new(
            Box::new(MemHeaderStore::default()),
            Box::new(MemBodyStore::default()),
        );
        let w = coord.bodies.put("AAA").unwrap();
        w.commit().unwrap();
        assert_eq!(coord.evict_orphans(&[]).unwrap(), 1);
        assert_eq!(coord.evict_orphans(&[]).unwrap(), 0);
    }
}
