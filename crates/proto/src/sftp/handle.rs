//! Server-side handle table.
//!
//! Handles are opaque strings minted by the server on OPEN/OPENDIR and
//! valid until CLOSE or connection teardown. Tokens are random 64-bit
//! values hex-encoded; unlike a bare counter they are not guessable
//! across a session.

use crate::sftp::attrs::FileAttributes;
use crate::sftp::handler::{FileReadAt, FileWriteAt, ListerAt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// State behind an OPEN file handle.
///
/// The reader/writer are obtained from the handlers lazily, on the
/// first READ or WRITE that arrives for the handle.
pub(crate) struct OpenFile {
    pub(crate) path: String,
    pub(crate) pflags: u32,
    pub(crate) attrs: FileAttributes,
    pub(crate) reader: OnceCell<Box<dyn FileReadAt>>,
    pub(crate) writer: OnceCell<Box<dyn FileWriteAt>>,
}

/// State behind an OPENDIR handle: the lister built at OPENDIR plus
/// the iteration cursor advanced by each READDIR batch.
pub(crate) struct OpenDir {
    pub(crate) path: String,
    pub(crate) lister: OnceCell<Box<dyn ListerAt>>,
    pub(crate) offset: AtomicU64,
}

pub(crate) enum OpenHandle {
    File(OpenFile),
    Dir(OpenDir),
}

impl OpenHandle {
    pub(crate) fn file(path: String, pflags: u32, attrs: FileAttributes) -> Self {
        OpenHandle::File(OpenFile {
            path,
            pflags,
            attrs,
            reader: OnceCell::new(),
            writer: OnceCell::new(),
        })
    }

    pub(crate) fn dir_with_lister(path: String, lister: Box<dyn ListerAt>) -> Self {
        OpenHandle::Dir(OpenDir {
            path,
            lister: OnceCell::new_with(Some(lister)),
            offset: AtomicU64::new(0),
        })
    }
}

/// Map from handle token to open state, shared across workers.
#[derive(Default)]
pub(crate) struct HandleTable {
    map: RwLock<HashMap<String, Arc<OpenHandle>>>,
}

impl HandleTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts `open` under a freshly minted token and returns it.
    pub(crate) fn insert(&self, open: OpenHandle) -> String {
        let open = Arc::new(open);
        let mut map = self.map.write();
        loop {
            let token = format!("{:016x}", rand::random::<u64>());
            if !map.contains_key(&token) {
                map.insert(token.clone(), open);
                return token;
            }
        }
    }

    pub(crate) fn get(&self, token: &str) -> Option<Arc<OpenHandle>> {
        self.map.read().get(token).cloned()
    }

    /// Removes the handle. The entry is gone even if the caller's
    /// subsequent close of the underlying resource fails.
    pub(crate) fn remove(&self, token: &str) -> Option<Arc<OpenHandle>> {
        self.map.write().remove(token)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sftp::consts::SSH_FXF_READ;

    fn open_file(path: &str) -> OpenHandle {
        OpenHandle::file(path.to_string(), SSH_FXF_READ, FileAttributes::default())
    }

    #[test]
    fn test_insert_get_remove() {
        let table = HandleTable::new();
        let token = table.insert(open_file("/tmp/f"));
        assert_eq!(token.len(), 16);
        assert!(table.get(&token).is_some());
        assert_eq!(table.len(), 1);

        assert!(table.remove(&token).is_some());
        assert!(table.get(&token).is_none());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_unknown_handle() {
        let table = HandleTable::new();
        assert!(table.get("no-such-handle").is_none());
        assert!(table.remove("no-such-handle").is_none());
    }

    #[test]
    fn test_tokens_are_unique() {
        let table = HandleTable::new();
        let a = table.insert(open_file("/a"));
        let b = table.insert(open_file("/b"));
        assert_ne!(a, b);
    }
}
