//! Bundled body-cache backend: one file per UIDL under a directory
//! (spec §4.4 / §6: "a directory tree with one file per UIDL; the
//! layout is the collaborator's business").
//!
//! A POP3 UIDL is one to 70 printable-ASCII characters (RFC 1939) but
//! nothing stops a hostile or buggy server from putting a `/` or `..`
//! in one, so filenames are a percent-escaped form of the UIDL rather
//! than the UIDL itself; [`FileBodyStore::list`] unescapes names back
//! to real UIDLs so it composes directly with
//! [`super::Coordinator::evict_orphans`].

use super::BodyStore;
use crate::error::{Error, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

fn is_safe_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

fn escape(uidl: &str) -> String {
    let mut out = String::with_capacity(uidl.len());
    for b in uidl.bytes() {
        if is_safe_byte(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02x}"));
        }
    }
    out
}

fn unescape(name: &str) -> Option<String> {
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok()?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

/// Write handle returned by [`BodyStore::put`] (spec §4.4: "put (write
/// handle), commit"). Writes land in a `.tmp` sibling until `commit`
/// renames it into place, so a transport failure mid-`RETR` (spec
/// §4.3.5) leaves no partial body visible to `get`/`exists`.
pub trait BodyWriter: Write + Send {
    /// # Errors
    ///
    /// Returns `Error::Integrity` if the rename into place fails.
    fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the partial write (spec §4.3.5: "close and unlink the
    /// partial writer").
    ///
    /// # Errors
    ///
    /// Returns `Error::Integrity` if the temp file can't be removed.
    fn abort(self: Box<Self>) -> Result<()>;
}

struct FileBodyWriter {
    tmp_path: PathBuf,
    final_path: PathBuf,
    file: File,
}

impl Write for FileBodyWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl BodyWriter for FileBodyWriter {
    fn commit(mut self: Box<Self>) -> Result<()> {
        self.file
            .flush()
            .map_err(|e| Error::Integrity(format!("flushing body cache temp file: {e}")))?;
        fs::rename(&self.tmp_path, &self.final_path)
            .map_err(|e| Error::Integrity(format!("committing body cache entry: {e}")))
    }

    fn abort(self: Box<Self>) -> Result<()> {
        drop(self.file);
        fs::remove_file(&self.tmp_path).ok();
        Ok(())
    }
}

/// A directory of one file per UIDL, named by a percent-escaped form
/// of the UIDL.
pub struct FileBodyStore {
    root: PathBuf,
}

impl FileBodyStore {
    /// # Errors
    ///
    /// Returns `Error::Integrity` if the directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| Error::Integrity(format!("creating body cache dir: {e}")))?;
        Ok(Self { root })
    }

    fn path_for(&self, uidl: &str) -> PathBuf {
        self.root.join(escape(uidl))
    }
}

impl BodyStore for FileBodyStore {
    fn exists(&self, uidl: &str) -> Result<bool> {
        Ok(self.path_for(uidl).is_file())
    }

    fn get(&self, uidl: &str) -> Result<Box<dyn Read + Send>> {
        let file = File::open(self.path_for(uidl))
            .map_err(|e| Error::Integrity(format!("opening cached body: {e}")))?;
        Ok(Box::new(file))
    }

    fn put(&self, uidl: &str) -> Result<Box<dyn BodyWriter>> {
        let final_path = self.path_for(uidl);
        let tmp_path = final_path.with_extension("tmp");
        let file = File::create(&tmp_path)
            .map_err(|e| Error::Integrity(format!("creating body cache temp file: {e}")))?;
        Ok(Box::new(FileBodyWriter {
            tmp_path,
            final_path,
            file,
        }))
    }

    fn del(&self, uidl: &str) -> Result<()> {
        let path = self.path_for(uidl);
        if path.is_file() {
            fs::remove_file(path)
                .map_err(|e| Error::Integrity(format!("deleting cached body: {e}")))?;
        }
        Ok(())
    }

    fn list(&self, visitor: &mut dyn FnMut(&str)) -> Result<()> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| Error::Integrity(format!("listing body cache: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::Integrity(format!("listing body cache: {e}")))?;
            if entry.path().extension().is_some_and(|ext| ext == "tmp") {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(ToString::to_string) else {
                continue;
            };
            if let Some(uidl) = unescape(&name) {
                visitor(&uidl);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    #[test]
    fn put_is_invisible_until_committed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBodyStore::open(dir.path()).unwrap();

        let mut writer = store.put("AAA").unwrap();
        writer.write_all(b"hello").unwrap();
        assert!(!store.exists("AAA").unwrap());

        writer.commit().unwrap();
        assert!(store.exists("AAA").unwrap());

        let mut buf = Vec::new();
        store.get("AAA").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn abort_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBodyStore::open(dir.path()).unwrap();

        let mut writer = store.put("AAA").unwrap();
        writer.write_all(b"partial").unwrap();
        writer.abort().unwrap();

        assert!(!store.exists("AAA").unwrap());
    }

    #[test]
    fn del_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBodyStore::open(dir.path()).unwrap();
        store.del("never-existed").unwrap();
    }

    #[test]
    fn escapes_path_hostile_uidls_and_lists_them_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBodyStore::open(dir.path()).unwrap();
        let nasty = "../../etc/passwd";

        store.put(nasty).unwrap().commit().unwrap();
        assert!(store.exists(nasty).unwrap());

        let mut seen = Vec::new();
        store.list(&mut |u| seen.push(u.to_string())).unwrap();
        assert_eq!(seen, vec![nasty.to_string()]);
    }
}
