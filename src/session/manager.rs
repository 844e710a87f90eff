use std::sync::{Arc, Mutex};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, instrument, warn};

use crate::backend::contract::{AddItemRequest, SessionBackend};
use crate::foundation::error::{ImprintError, ImprintResult};
use crate::foundation::ids::{MAX_SLOTS, SessionId, SlotIndex};
use crate::session::mirror::{DurableStore, ORDER_MIRROR_KEY};
use crate::session::model::{
    FinalizeMetadata, OrderItem, OrderItemDraft, OrderSession, SessionPhase,
};

type CreateShared = Shared<BoxFuture<'static, ImprintResult<SessionId>>>;

/// Options for [`SessionManager`].
#[derive(Clone, Debug)]
pub struct SessionManagerOpts {
    /// Durable key the session is mirrored under.
    pub mirror_key: String,
}

impl Default for SessionManagerOpts {
    fn default() -> Self {
        Self {
            mirror_key: ORDER_MIRROR_KEY.to_owned(),
        }
    }
}

struct ManagerState {
    session: OrderSession,
    // Bumped by every clear (reset, finalize, consistency). Remote work that
    // resolves against a stale epoch must not commit.
    epoch: u64,
}

/// The order-session state machine.
///
/// Explicitly constructed and owned: construct with [`open`](Self::open)
/// (which rehydrates from the durable mirror), accept transitions, and clear
/// with [`reset`](Self::reset) or a successful [`finalize`](Self::finalize).
///
/// Methods take `&self` and may be raced from concurrent tasks in one
/// cooperative execution context. Two guards make that safe: session creation
/// is single-flight through a cached in-flight future shared by all waiting
/// callers, and slot assignment plus remote submission are serialized behind
/// an async gate, because slot choice is a read-then-write over the used-slot
/// set.
pub struct SessionManager<B, M> {
    backend: Arc<B>,
    mirror: M,
    opts: SessionManagerOpts,
    state: Mutex<ManagerState>,
    create_inflight: Mutex<Option<CreateShared>>,
    submit_gate: tokio::sync::Mutex<()>,
}

impl<B: SessionBackend, M: DurableStore> SessionManager<B, M> {
    /// Construct a manager, rehydrating any mirrored session first.
    ///
    /// A missing mirror starts Empty. An unreadable or invariant-violating
    /// mirror is discarded with a warning rather than wedging the editor.
    pub fn open(backend: B, mirror: M, opts: SessionManagerOpts) -> Self {
        let session = match mirror.get(&opts.mirror_key) {
            Ok(Some(bytes)) => match serde_json::from_slice::<OrderSession>(&bytes) {
                Ok(session) => match session.validate() {
                    Ok(()) => session,
                    Err(e) => {
                        warn!(error = %e, "discarding mirrored session that violates invariants");
                        OrderSession::default()
                    }
                },
                Err(e) => {
                    warn!(error = %e, "discarding unreadable session mirror");
                    OrderSession::default()
                }
            },
            Ok(None) => OrderSession::default(),
            Err(e) => {
                warn!(error = %e, "session mirror unavailable, starting empty");
                OrderSession::default()
            }
        };

        Self {
            backend: Arc::new(backend),
            mirror,
            opts,
            state: Mutex::new(ManagerState { session, epoch: 0 }),
            create_inflight: Mutex::new(None),
            submit_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The remote session id, if one has been assigned.
    pub fn session_id(&self) -> Option<SessionId> {
        self.lock_state().session.session_id.clone()
    }

    /// Committed items, in add order.
    pub fn items(&self) -> Vec<OrderItem> {
        self.lock_state().session.items.clone()
    }

    /// A full copy of the local session state.
    pub fn snapshot(&self) -> OrderSession {
        self.lock_state().session.clone()
    }

    /// Coarse phase of the state machine.
    pub fn phase(&self) -> SessionPhase {
        self.lock_state().session.phase()
    }

    /// The slot the next add would claim, if any is free.
    pub fn lowest_free_slot(&self) -> Option<SlotIndex> {
        self.lock_state().session.lowest_free_slot()
    }

    /// Add one placement to the session.
    ///
    /// Lazily creates the remote session on first use (exactly one remote
    /// creation under any interleaving), claims the lowest free slot, and
    /// submits metadata plus both artifacts as one atomic remote call. Local
    /// state changes only after the backend acknowledges; on failure it is
    /// untouched. A `Consistency` rejection clears the session, which is the
    /// only defined remedy.
    #[instrument(skip_all, fields(sku = %draft.product.sku, quantity = draft.quantity))]
    pub async fn add_item(
        &self,
        draft: OrderItemDraft,
        logo_png: Vec<u8>,
        composite_png: Vec<u8>,
    ) -> ImprintResult<OrderItem> {
        draft.validate()?;
        {
            let state = self.lock_state();
            if state.session.is_full() {
                return Err(ImprintError::session_full(format!(
                    "an order holds at most {MAX_SLOTS} prints"
                )));
            }
        }

        let session_id = self.ensure_session().await?;
        let _gate = self.submit_gate.lock().await;

        let (slot, epoch) = {
            let state = self.lock_state();
            if state.session.session_id.as_ref() != Some(&session_id) {
                return Err(ImprintError::consistency(
                    "session was reset while the add was being prepared",
                ));
            }
            let slot = state.session.lowest_free_slot().ok_or_else(|| {
                ImprintError::session_full(format!("an order holds at most {MAX_SLOTS} prints"))
            })?;
            (slot, state.epoch)
        };

        let request = AddItemRequest {
            session: session_id.clone(),
            slot,
            item: draft.clone(),
            logo_png,
            composite_png,
        };
        match self.backend.add_item(request).await {
            Ok(()) => {}
            Err(e @ ImprintError::Consistency(_)) => {
                warn!(error = %e, "backend rejected the session, clearing local state");
                self.clear_after_consistency();
                return Err(e);
            }
            Err(e) => return Err(e),
        }

        let item = OrderItem::from_draft(draft, slot);
        let snapshot = {
            let mut state = self.lock_state();
            if state.epoch != epoch || state.session.session_id.as_ref() != Some(&session_id) {
                return Err(ImprintError::consistency(
                    "session was reset while the add was in flight",
                ));
            }
            state.session.items.push(item.clone());
            state.session.used_slots.insert(slot);
            state.session.clone()
        };
        self.flush(&snapshot)?;
        debug!(slot = slot.get(), "item committed to order session");
        Ok(item)
    }

    /// Submit the session for fulfillment.
    ///
    /// Valid only with a session id and at least one item. On success all
    /// local state and the durable key are cleared; on transient failure
    /// state is unchanged and the call may be retried.
    #[instrument(skip_all, fields(job = %metadata.job_name))]
    pub async fn finalize(&self, metadata: FinalizeMetadata) -> ImprintResult<()> {
        metadata.validate()?;

        let _gate = self.submit_gate.lock().await;
        let session_id = {
            let state = self.lock_state();
            let id = state.session.session_id.clone().ok_or_else(|| {
                ImprintError::validation("no active order session to finalize")
            })?;
            if state.session.items.is_empty() {
                return Err(ImprintError::validation(
                    "cannot finalize an order session with no items",
                ));
            }
            id
        };

        match self.backend.finalize_session(&session_id, &metadata).await {
            Ok(()) => {
                self.clear_local()?;
                debug!("order session finalized and cleared");
                Ok(())
            }
            Err(e @ ImprintError::Consistency(_)) => {
                warn!(error = %e, "backend rejected the session at finalize, clearing local state");
                self.clear_after_consistency();
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Unconditionally clear local state and the durable key.
    ///
    /// Valid from any state. Never notifies the backend: anything it already
    /// accepted stays accepted. A remote call still in flight when this lands
    /// surfaces `Consistency` on completion and commits nothing.
    pub fn reset(&self) -> ImprintResult<()> {
        debug!("order session reset");
        self.clear_local()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ManagerState> {
        self.state.lock().expect("session state poisoned")
    }

    /// Resolve the session id, creating the remote session on first use.
    ///
    /// Single-flight: the first caller installs a shared in-flight future and
    /// every concurrent caller awaits the same one, so an Empty session races
    /// into exactly one remote creation. A boolean "creating" flag cannot do
    /// this — it stops nobody between the check and the first response. The
    /// cache is dropped once the attempt resolves, so a failed creation can
    /// be retried by a later call.
    async fn ensure_session(&self) -> ImprintResult<SessionId> {
        let epoch = {
            let state = self.lock_state();
            if let Some(id) = state.session.session_id.clone() {
                return Ok(id);
            }
            state.epoch
        };

        let shared = {
            let mut slot = self
                .create_inflight
                .lock()
                .expect("creation cache poisoned");
            match &*slot {
                Some(fut) => fut.clone(),
                None => {
                    let backend = Arc::clone(&self.backend);
                    let fut = async move { backend.create_session().await }
                        .boxed()
                        .shared();
                    *slot = Some(fut.clone());
                    fut
                }
            }
        };

        let outcome = shared.clone().await;
        match outcome {
            Ok(id) => {
                let snapshot = {
                    let mut state = self.lock_state();
                    if state.epoch != epoch {
                        drop(state);
                        self.clear_inflight_if(&shared);
                        return Err(ImprintError::consistency(
                            "session was reset during remote creation",
                        ));
                    }
                    if state.session.session_id.is_none() {
                        state.session.session_id = Some(id.clone());
                        Some(state.session.clone())
                    } else if state.session.session_id.as_ref() == Some(&id) {
                        None
                    } else {
                        drop(state);
                        self.clear_inflight_if(&shared);
                        return Err(ImprintError::consistency(
                            "conflicting session ids for one epoch",
                        ));
                    }
                };
                self.clear_inflight_if(&shared);
                if let Some(session) = snapshot {
                    self.flush(&session)?;
                }
                Ok(id)
            }
            Err(e) => {
                self.clear_inflight_if(&shared);
                Err(e)
            }
        }
    }

    fn clear_inflight_if(&self, fut: &CreateShared) {
        let mut slot = self
            .create_inflight
            .lock()
            .expect("creation cache poisoned");
        if let Some(current) = &*slot {
            if current.ptr_eq(fut) {
                *slot = None;
            }
        }
    }

    /// Flush the mirror before control returns to the caller.
    ///
    /// The remote backend has already acknowledged by the time this runs, so
    /// a flush failure keeps the in-memory item and surfaces `Storage`: the
    /// order is intact, only reload survival is degraded.
    fn flush(&self, session: &OrderSession) -> ImprintResult<()> {
        let bytes = serde_json::to_vec(session)
            .map_err(|e| ImprintError::serde(format!("encode session mirror: {e}")))?;
        self.mirror.set(&self.opts.mirror_key, &bytes)
    }

    fn clear_local(&self) -> ImprintResult<()> {
        {
            let mut state = self.lock_state();
            state.session = OrderSession::default();
            state.epoch += 1;
        }
        *self
            .create_inflight
            .lock()
            .expect("creation cache poisoned") = None;
        self.mirror.remove(&self.opts.mirror_key)
    }

    fn clear_after_consistency(&self) {
        if let Err(e) = self.clear_local() {
            warn!(error = %e, "failed to clear session mirror after consistency error");
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/session/manager.rs"]
mod tests;
