use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::foundation::error::{ImprintError, ImprintResult};

/// Durable key the order session is mirrored under.
pub const ORDER_MIRROR_KEY: &str = "imprint_order";

/// Local durable key-value store, localStorage-shaped.
///
/// The contract is deliberately synchronous: the session manager flushes its
/// mirror before returning control to the caller, so a reload immediately
/// after an acknowledged transition never loses it.
pub trait DurableStore: Send + Sync {
    /// Read the bytes under `key`, or `None` when absent.
    fn get(&self, key: &str) -> ImprintResult<Option<Vec<u8>>>;
    /// Write `bytes` under `key`.
    fn set(&self, key: &str, bytes: &[u8]) -> ImprintResult<()>;
    /// Delete `key`. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> ImprintResult<()>;
}

impl<M: DurableStore> DurableStore for std::sync::Arc<M> {
    fn get(&self, key: &str) -> ImprintResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, bytes: &[u8]) -> ImprintResult<()> {
        (**self).set(key, bytes)
    }

    fn remove(&self, key: &str) -> ImprintResult<()> {
        (**self).remove(key)
    }
}

#[derive(Default)]
struct MemoryEntries {
    entries: HashMap<String, Vec<u8>>,
    fail_next_set: Option<ImprintError>,
}

/// In-memory [`DurableStore`] double.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryEntries>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `set` fail with `error`.
    pub fn fail_next_set(&self, error: ImprintError) {
        self.inner.lock().expect("durable store poisoned").fail_next_set = Some(error);
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> ImprintResult<Option<Vec<u8>>> {
        Ok(self
            .inner
            .lock()
            .expect("durable store poisoned")
            .entries
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, bytes: &[u8]) -> ImprintResult<()> {
        let mut inner = self.inner.lock().expect("durable store poisoned");
        if let Some(err) = inner.fail_next_set.take() {
            return Err(err);
        }
        inner.entries.insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> ImprintResult<()> {
        self.inner
            .lock()
            .expect("durable store poisoned")
            .entries
            .remove(key);
        Ok(())
    }
}

/// File-backed [`DurableStore`]: one file per key under a directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store keys under `root` (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> ImprintResult<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ImprintError::storage(format!("read key {key}: {e}"))),
        }
    }

    fn set(&self, key: &str, bytes: &[u8]) -> ImprintResult<()> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| ImprintError::storage(format!("create store dir: {e}")))?;
        std::fs::write(self.path_for(key), bytes)
            .map_err(|e| ImprintError::storage(format!("write key {key}: {e}")))
    }

    fn remove(&self, key: &str) -> ImprintResult<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ImprintError::storage(format!("remove key {key}: {e}"))),
        }
    }
}
