//! Content-addressed store transfers.

use super::{Endpoint, RemoteSource};
use crate::error::{ErrorCode, XferStatus};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use xfer_files::{LocationKind, ObjectKey, ObjectStore};

#[derive(Debug)]
enum Role {
    Send {
        key: ObjectKey,
    },
    Receive {
        local: ObjectKey,
        remote: ObjectKey,
        temp: ObjectKey,
    },
}

/// Transfer backed by an [`ObjectStore`] entry.
///
/// Downloads are appended under a random temp key and committed to the
/// local key on success.
pub struct ObjectXfer {
    store: Arc<dyn ObjectStore>,
    role: Role,
}

impl ObjectXfer {
    /// Serve `key` from `store`.
    pub(crate) fn sender(store: Arc<dyn ObjectStore>, key: ObjectKey) -> Self {
        Self {
            store,
            role: Role::Send { key },
        }
    }

    /// Download the remote `remote` object into `local`.
    pub(crate) fn receiver(store: Arc<dyn ObjectStore>, local: ObjectKey, remote: ObjectKey) -> Self {
        let temp = ObjectKey::new(Uuid::new_v4(), local.kind);
        Self {
            store,
            role: Role::Receive {
                local,
                remote,
                temp,
            },
        }
    }

    /// Local object being served or written.
    #[must_use]
    pub fn local_key(&self) -> ObjectKey {
        match self.role {
            Role::Send { key } => key,
            Role::Receive { local, .. } => local,
        }
    }

    /// Remote object, for downloads.
    #[must_use]
    pub fn remote_key(&self) -> Option<ObjectKey> {
        match self.role {
            Role::Send { .. } => None,
            Role::Receive { remote, .. } => Some(remote),
        }
    }

    pub(crate) fn matches_local_file(&self, key: &ObjectKey) -> bool {
        matches!(self.role, Role::Receive { local, .. } if local == *key)
    }

    pub(crate) fn matches_remote_file(&self, key: &ObjectKey) -> bool {
        self.remote_key().as_ref() == Some(key)
    }
}

impl fmt::Debug for ObjectXfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectXfer").field("role", &self.role).finish()
    }
}

impl Endpoint for ObjectXfer {
    fn open_source(&mut self) -> Result<u64, ErrorCode> {
        let Role::Send { key } = &self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        self.store.size(key).ok_or_else(|| {
            tracing::warn!("Object {} not found for xfer", key);
            ErrorCode::FileNotFound
        })
    }

    fn read_source(&mut self, offset: u64, max_len: usize) -> Result<Vec<u8>, ErrorCode> {
        let Role::Send { key } = &self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        self.store.read(key, offset, max_len).map_err(|e| {
            tracing::warn!("Read of object {} at {} failed: {}", key, offset, e);
            ErrorCode::CannotOpenFile
        })
    }

    fn reopen_handle(&mut self) -> XferStatus {
        match &self.role {
            Role::Send { key } if self.store.size(key).is_some() => Ok(()),
            _ => Err(ErrorCode::CannotOpenFile),
        }
    }

    fn prepare_sink(&mut self) -> XferStatus {
        let Role::Receive { temp, .. } = &self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        self.store.remove(temp).map_err(|e| {
            tracing::warn!("Cannot reset object {}: {}", temp, e);
            ErrorCode::CannotOpenFile
        })
    }

    fn write_sink(&mut self, data: &[u8]) -> XferStatus {
        let Role::Receive { temp, .. } = &self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        self.store.append(temp, data).map_err(|e| {
            tracing::warn!("Write to object {} failed: {}", temp, e);
            ErrorCode::CannotOpenFile
        })
    }

    fn commit_sink(&mut self) -> XferStatus {
        let Role::Receive { local, temp, .. } = &self.role else {
            return Err(ErrorCode::CannotOpenFile);
        };
        self.store.commit(temp, local).map_err(|e| {
            tracing::warn!("Cannot commit object {} as {}: {}", temp, local, e);
            ErrorCode::CannotOpenFile
        })
    }

    fn discard_sink(&mut self) {
        if let Role::Receive { temp, .. } = &self.role {
            if let Err(e) = self.store.remove(temp) {
                tracing::debug!("Could not remove object {}: {}", temp, e);
            }
        }
    }

    fn request(&self) -> RemoteSource {
        RemoteSource {
            filename: String::new(),
            location: LocationKind::None,
            delete_on_completion: false,
            object: Some(self.remote_key().unwrap_or_else(|| self.local_key())),
        }
    }

    fn describe(&self) -> String {
        format!("object {}", self.local_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xfer_files::{MemoryObjectStore, ObjectType};

    fn key() -> ObjectKey {
        ObjectKey::new(Uuid::new_v4(), ObjectType(0))
    }

    #[test]
    fn test_send_missing_and_present() {
        let store = MemoryObjectStore::new();
        let k = key();
        let mut missing = ObjectXfer::sender(Arc::new(store.clone()), k);
        assert_eq!(missing.open_source(), Err(ErrorCode::FileNotFound));

        store.insert(k, vec![9; 12]);
        let mut present = ObjectXfer::sender(Arc::new(store.clone()), k);
        assert_eq!(present.open_source(), Ok(12));
        assert_eq!(present.read_source(10, 5).unwrap(), vec![9, 9]);
        assert!(present.reopen_handle().is_ok());
    }

    #[test]
    fn test_receive_commits_under_local_key() {
        let store = MemoryObjectStore::new();
        let (local, remote) = (key(), key());
        let mut xfer = ObjectXfer::receiver(Arc::new(store.clone()), local, remote);

        xfer.prepare_sink().unwrap();
        xfer.write_sink(b"abc").unwrap();
        xfer.write_sink(b"def").unwrap();
        assert!(store.get(&local).is_none());
        xfer.commit_sink().unwrap();

        assert_eq!(store.get(&local).unwrap(), b"abcdef");
        assert_eq!(store.len(), 1);
        assert_eq!(xfer.request().object, Some(remote));
        assert!(xfer.matches_local_file(&local));
        assert!(xfer.matches_remote_file(&remote));
    }

    #[test]
    fn test_discard_leaves_nothing() {
        let store = MemoryObjectStore::new();
        let mut xfer = ObjectXfer::receiver(Arc::new(store.clone()), key(), key());
        xfer.prepare_sink().unwrap();
        xfer.write_sink(b"partial").unwrap();
        xfer.discard_sink();
        assert!(store.is_empty());
    }
}
