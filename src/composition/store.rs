use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use crate::composition::record::{CompositionDraft, CompositionRecord};
use crate::foundation::error::{ImprintError, ImprintResult};
use crate::foundation::ids::CompositionId;

/// Persistence seam for composition documents: one JSON document per id.
///
/// Reads require no locking because documents never change after their
/// initial write.
pub trait DocumentStore: Send + Sync {
    /// Persist the document for `id`. Overwrites are not expected; records
    /// are written once.
    fn write(
        &self,
        id: &CompositionId,
        bytes: &[u8],
    ) -> impl Future<Output = ImprintResult<()>> + Send;

    /// Read the document for `id`, or `None` when absent.
    fn read(
        &self,
        id: &CompositionId,
    ) -> impl Future<Output = ImprintResult<Option<Vec<u8>>>> + Send;
}

impl<D: DocumentStore> DocumentStore for std::sync::Arc<D> {
    fn write(
        &self,
        id: &CompositionId,
        bytes: &[u8],
    ) -> impl Future<Output = ImprintResult<()>> + Send {
        (**self).write(id, bytes)
    }

    fn read(
        &self,
        id: &CompositionId,
    ) -> impl Future<Output = ImprintResult<Option<Vec<u8>>>> + Send {
        (**self).read(id)
    }
}

#[derive(Default)]
struct MemoryDocs {
    docs: HashMap<String, Vec<u8>>,
    hidden_reads: HashMap<String, u32>,
    fail_next_write: Option<ImprintError>,
}

/// In-memory [`DocumentStore`] double.
#[derive(Default)]
pub struct MemoryDocumentStore {
    inner: Mutex<MemoryDocs>,
}

impl MemoryDocumentStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail with `error`.
    pub fn fail_next_write(&self, error: ImprintError) {
        self.inner.lock().expect("document store poisoned").fail_next_write = Some(error);
    }

    /// Simulate a not-yet-durable document: the next `reads` reads of `id`
    /// return absent even once the document exists.
    pub fn delay_visibility(&self, id: &CompositionId, reads: u32) {
        self.inner
            .lock()
            .expect("document store poisoned")
            .hidden_reads
            .insert(id.as_str().to_owned(), reads);
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("document store poisoned").docs.len()
    }

    /// `true` when no documents are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn write(&self, id: &CompositionId, bytes: &[u8]) -> ImprintResult<()> {
        let mut inner = self.inner.lock().expect("document store poisoned");
        if let Some(err) = inner.fail_next_write.take() {
            return Err(err);
        }
        inner.docs.insert(id.as_str().to_owned(), bytes.to_vec());
        Ok(())
    }

    async fn read(&self, id: &CompositionId) -> ImprintResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().expect("document store poisoned");
        if let Some(left) = inner.hidden_reads.get_mut(id.as_str()) {
            if *left > 0 {
                *left -= 1;
                return Ok(None);
            }
        }
        Ok(inner.docs.get(id.as_str()).cloned())
    }
}

/// Filesystem [`DocumentStore`]: a directory of `{id}.json` documents.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    /// Store documents under `root` (created on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: &CompositionId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

impl DocumentStore for FsDocumentStore {
    async fn write(&self, id: &CompositionId, bytes: &[u8]) -> ImprintResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ImprintError::storage(format!("create document dir: {e}")))?;
        tokio::fs::write(self.path_for(id), bytes)
            .await
            .map_err(|e| ImprintError::storage(format!("write composition {id}: {e}")))
    }

    async fn read(&self, id: &CompositionId) -> ImprintResult<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ImprintError::storage(format!(
                "read composition {id}: {e}"
            ))),
        }
    }
}

/// Creates and retrieves immutable [`CompositionRecord`]s.
pub struct CompositionStore<D> {
    docs: D,
}

impl<D: DocumentStore> CompositionStore<D> {
    /// Wrap a document store.
    pub fn new(docs: D) -> Self {
        Self { docs }
    }

    /// Validate the draft, stamp id + creation time, persist the record.
    ///
    /// A write failure surfaces as `Storage` without any retry; callers
    /// perform at most one retry before giving up.
    pub async fn create(&self, draft: CompositionDraft) -> ImprintResult<CompositionRecord> {
        draft.validate()?;

        let record = CompositionRecord {
            id: CompositionId::generate(),
            created_at_ms: now_ms(),
            product_ref: draft.product_ref,
            transform: draft.transform,
            source_image_index: draft.source_image_index,
            logo_ref: draft.logo_ref,
        };
        let bytes = serde_json::to_vec_pretty(&record)
            .map_err(|e| ImprintError::serde(format!("encode composition record: {e}")))?;
        self.docs.write(&record.id, &bytes).await?;
        Ok(record)
    }

    /// Fetch a record by id. A single read: a miss is `NotFound`, which may
    /// mean "truly absent" or "a racing create is not durable yet".
    pub async fn get(&self, id: &CompositionId) -> ImprintResult<CompositionRecord> {
        let bytes = self
            .docs
            .read(id)
            .await?
            .ok_or_else(|| ImprintError::not_found(format!("composition {id}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ImprintError::serde(format!("decode composition {id}: {e}")))
    }

    /// Fetch with bounded retry on `NotFound`, doubling `backoff` between
    /// attempts. This is the explicit remedy for the read-after-create race;
    /// plain [`get`](Self::get) never retries.
    pub async fn get_eventually(
        &self,
        id: &CompositionId,
        attempts: u32,
        backoff: Duration,
    ) -> ImprintResult<CompositionRecord> {
        let attempts = attempts.max(1);
        let mut delay = backoff;
        let mut last = ImprintError::not_found(format!("composition {id}"));
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            match self.get(id).await {
                Ok(record) => return Ok(record),
                Err(e) if e.is_not_found() => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "../../tests/unit/composition/store.rs"]
mod tests;
