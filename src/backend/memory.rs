use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use crate::backend::contract::{AddItemRequest, SessionBackend};
use crate::foundation::error::{ImprintError, ImprintResult};
use crate::foundation::ids::{SessionId, SlotIndex};
use crate::session::model::{FinalizeMetadata, OrderItemDraft};

/// Backend operations, used to address failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendOp {
    /// `create_session`.
    CreateSession,
    /// `add_item`.
    AddItem,
    /// `finalize_session`.
    Finalize,
}

struct StoredUpload {
    item: OrderItemDraft,
    logo_png: Vec<u8>,
    composite_png: Vec<u8>,
}

#[derive(Default)]
struct RemoteSession {
    slots: BTreeMap<SlotIndex, StoredUpload>,
    finalized: Option<FinalizeMetadata>,
}

#[derive(Default)]
struct Inner {
    create_calls: usize,
    add_calls: usize,
    finalize_calls: usize,
    sessions: HashMap<SessionId, RemoteSession>,
    fail_next: HashMap<BackendOp, VecDeque<ImprintError>>,
}

/// In-memory [`SessionBackend`] double.
///
/// Records sessions, slot claims and uploads; counts `create_session` calls;
/// rejects unknown sessions, occupied slots and finalized sessions with
/// `Consistency`; and pops queued injected failures per operation. An
/// optional latency turns every call into a real suspension point so
/// interleaving tests exercise the races they mean to.
pub struct InMemoryBackend {
    inner: Mutex<Inner>,
    latency: Duration,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// A backend with no artificial latency.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            latency: Duration::ZERO,
        }
    }

    /// A backend whose every call suspends for `latency` first.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            latency,
        }
    }

    /// Queue an error to be returned by the next call to `op`.
    pub fn fail_next(&self, op: BackendOp, error: ImprintError) {
        let mut inner = self.inner.lock().expect("backend state poisoned");
        inner.fail_next.entry(op).or_default().push_back(error);
    }

    /// How many times `create_session` was invoked.
    pub fn create_calls(&self) -> usize {
        self.inner.lock().expect("backend state poisoned").create_calls
    }

    /// How many times `add_item` was invoked.
    pub fn add_calls(&self) -> usize {
        self.inner.lock().expect("backend state poisoned").add_calls
    }

    /// How many times `finalize_session` was invoked.
    pub fn finalize_calls(&self) -> usize {
        self.inner.lock().expect("backend state poisoned").finalize_calls
    }

    /// Claimed slot numbers of a session, ascending. Empty for unknown ids.
    pub fn claimed_slots(&self, session: &SessionId) -> Vec<u8> {
        let inner = self.inner.lock().expect("backend state poisoned");
        inner
            .sessions
            .get(session)
            .map(|s| s.slots.keys().map(|slot| slot.get()).collect())
            .unwrap_or_default()
    }

    /// Metadata a session was finalized with, if any.
    pub fn finalized_metadata(&self, session: &SessionId) -> Option<FinalizeMetadata> {
        let inner = self.inner.lock().expect("backend state poisoned");
        inner
            .sessions
            .get(session)
            .and_then(|s| s.finalized.clone())
    }

    /// Byte sizes of the artifacts uploaded for a slot.
    pub fn upload_sizes(&self, session: &SessionId, slot: SlotIndex) -> Option<(usize, usize)> {
        let inner = self.inner.lock().expect("backend state poisoned");
        inner
            .sessions
            .get(session)
            .and_then(|s| s.slots.get(&slot))
            .map(|u| (u.logo_png.len(), u.composite_png.len()))
    }

    /// Drop a session server-side, as an external invalidation would.
    pub fn evict_session(&self, session: &SessionId) {
        let mut inner = self.inner.lock().expect("backend state poisoned");
        inner.sessions.remove(session);
    }

    async fn suspend(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn take_injected(&self, op: BackendOp) -> Option<ImprintError> {
        let mut inner = self.inner.lock().expect("backend state poisoned");
        inner.fail_next.get_mut(&op).and_then(VecDeque::pop_front)
    }
}

impl SessionBackend for InMemoryBackend {
    async fn create_session(&self) -> ImprintResult<SessionId> {
        self.suspend().await;
        let mut inner = self.inner.lock().expect("backend state poisoned");
        inner.create_calls += 1;
        if let Some(err) = inner
            .fail_next
            .get_mut(&BackendOp::CreateSession)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        let id = SessionId::new(uuid::Uuid::new_v4().to_string());
        inner.sessions.insert(id.clone(), RemoteSession::default());
        Ok(id)
    }

    async fn add_item(&self, request: AddItemRequest) -> ImprintResult<()> {
        self.suspend().await;
        {
            let mut inner = self.inner.lock().expect("backend state poisoned");
            inner.add_calls += 1;
        }
        if let Some(err) = self.take_injected(BackendOp::AddItem) {
            return Err(err);
        }

        let mut inner = self.inner.lock().expect("backend state poisoned");
        let session = inner.sessions.get_mut(&request.session).ok_or_else(|| {
            ImprintError::consistency(format!("unknown session {}", request.session))
        })?;
        if session.finalized.is_some() {
            return Err(ImprintError::consistency(format!(
                "session {} is already finalized",
                request.session
            )));
        }
        if session.slots.contains_key(&request.slot) {
            return Err(ImprintError::consistency(format!(
                "slot {} of session {} is already claimed",
                request.slot, request.session
            )));
        }

        session.slots.insert(
            request.slot,
            StoredUpload {
                item: request.item,
                logo_png: request.logo_png,
                composite_png: request.composite_png,
            },
        );
        Ok(())
    }

    async fn finalize_session(
        &self,
        session: &SessionId,
        metadata: &FinalizeMetadata,
    ) -> ImprintResult<()> {
        self.suspend().await;
        {
            let mut inner = self.inner.lock().expect("backend state poisoned");
            inner.finalize_calls += 1;
        }
        if let Some(err) = self.take_injected(BackendOp::Finalize) {
            return Err(err);
        }

        let mut inner = self.inner.lock().expect("backend state poisoned");
        let remote = inner
            .sessions
            .get_mut(session)
            .ok_or_else(|| ImprintError::consistency(format!("unknown session {session}")))?;
        if remote.finalized.is_some() {
            return Err(ImprintError::consistency(format!(
                "session {session} is already finalized"
            )));
        }
        remote.finalized = Some(metadata.clone());
        Ok(())
    }
}
