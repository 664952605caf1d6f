//! Content-addressed object store interface.
//!
//! Objects are keyed by `(id, type)`. Incoming object transfers write under a
//! temporary key and are committed to their final key once complete, so a
//! half-received object is never visible under its real id.

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// Logical type of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectType(pub i16);

impl ObjectType {
    /// Wire value used when a request carries no object.
    pub const NONE: Self = Self(-1);

    const KNOWN: &'static [(i16, &'static str)] = &[
        (0, "texture"),
        (1, "sound"),
        (2, "callcard"),
        (3, "landmark"),
        (4, "script"),
        (5, "clothing"),
        (6, "object"),
        (7, "notecard"),
        (8, "category"),
        (10, "lsltext"),
        (11, "lslbyte"),
        (12, "txtr_tga"),
        (13, "bodypart"),
        (17, "snd_wav"),
        (18, "img_tga"),
        (19, "jpeg"),
        (20, "animatn"),
        (21, "gesture"),
        (22, "simstate"),
        (24, "link"),
        (25, "link_f"),
        (49, "mesh"),
    ];

    /// Short name of a known type, `None` for unknown values.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        Self::KNOWN
            .iter()
            .find(|(code, _)| *code == self.0)
            .map(|(_, name)| *name)
    }

    /// Whether this is a known type.
    #[must_use]
    pub fn is_known(self) -> bool {
        self.name().is_some()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "type#{}", self.0),
        }
    }
}

/// Key of one stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Content id.
    pub id: Uuid,
    /// Logical type.
    pub kind: ObjectType,
}

impl ObjectKey {
    /// Create a key.
    #[must_use]
    pub const fn new(id: Uuid, kind: ObjectType) -> Self {
        Self { id, kind }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.kind)
    }
}

/// Byte store keyed by [`ObjectKey`].
///
/// Shared between the transfers that read from and write to it, so every
/// method takes `&self`.
pub trait ObjectStore: Send + Sync {
    /// Size of the object, `None` if it does not exist.
    fn size(&self, key: &ObjectKey) -> Option<u64>;

    /// Read up to `len` bytes at `offset`; shorter only at the end of the object.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the object does not exist.
    fn read(&self, key: &ObjectKey, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Append bytes, creating the object if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the write.
    fn append(&self, key: &ObjectKey, data: &[u8]) -> io::Result<()>;

    /// Move `temp` to `target`, replacing anything already there.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if `temp` does not exist.
    fn commit(&self, temp: &ObjectKey, target: &ObjectKey) -> io::Result<()>;

    /// Delete an object. Deleting a missing object is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store refuses the delete.
    fn remove(&self, key: &ObjectKey) -> io::Result<()>;
}

/// In-memory object store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<ObjectKey, Vec<u8>>>>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` under `key`, replacing any previous object.
    pub fn insert(&self, key: ObjectKey, data: Vec<u8>) {
        self.lock().insert(key, data);
    }

    /// Copy of the object under `key`.
    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    /// Number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectKey, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn not_found(key: &ObjectKey) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("object {key} not found"))
}

impl ObjectStore for MemoryObjectStore {
    fn size(&self, key: &ObjectKey) -> Option<u64> {
        self.lock().get(key).map(|data| data.len() as u64)
    }

    fn read(&self, key: &ObjectKey, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let objects = self.lock();
        let data = objects.get(key).ok_or_else(|| not_found(key))?;
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    fn append(&self, key: &ObjectKey, data: &[u8]) -> io::Result<()> {
        self.lock().entry(*key).or_default().extend_from_slice(data);
        Ok(())
    }

    fn commit(&self, temp: &ObjectKey, target: &ObjectKey) -> io::Result<()> {
        let mut objects = self.lock();
        let data = objects.remove(temp).ok_or_else(|| not_found(temp))?;
        objects.insert(*target, data);
        Ok(())
    }

    fn remove(&self, key: &ObjectKey) -> io::Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
