use std::future::Future;

use crate::foundation::error::ImprintResult;
use crate::foundation::ids::{SessionId, SlotIndex};
use crate::session::model::{FinalizeMetadata, OrderItemDraft};

/// One atomic remote "add item" submission: the slot, the item metadata and
/// both rendered artifacts travel together.
#[derive(Clone, Debug)]
pub struct AddItemRequest {
    /// The session the item joins.
    pub session: SessionId,
    /// The cart position being claimed.
    pub slot: SlotIndex,
    /// Item metadata (product, quantity, print width, variant).
    pub item: OrderItemDraft,
    /// PNG bytes of the logo alone.
    pub logo_png: Vec<u8>,
    /// PNG bytes of the composited mockup.
    pub composite_png: Vec<u8>,
}

/// Abstract remote backend for order sessions.
///
/// No wire format is implied; an HTTP implementation and the in-memory double
/// satisfy the same contract. Every call is a suspension point and a terminal
/// failure for that call — the core never retries silently.
///
/// Failure taxonomy: transport problems surface as `Network`; a rejected
/// locally-held session id or slot surfaces as `Consistency`.
pub trait SessionBackend: Send + Sync + 'static {
    /// Create a new empty session and return its id.
    fn create_session(&self) -> impl Future<Output = ImprintResult<SessionId>> + Send;

    /// Attach one item (metadata + artifacts) to a session slot, atomically.
    fn add_item(&self, request: AddItemRequest) -> impl Future<Output = ImprintResult<()>> + Send;

    /// Submit the session for fulfillment.
    fn finalize_session(
        &self,
        session: &SessionId,
        metadata: &FinalizeMetadata,
    ) -> impl Future<Output = ImprintResult<()>> + Send;
}

impl<B: SessionBackend> SessionBackend for std::sync::Arc<B> {
    fn create_session(&self) -> impl Future<Output = ImprintResult<SessionId>> + Send {
        (**self).create_session()
    }

    fn add_item(&self, request: AddItemRequest) -> impl Future<Output = ImprintResult<()>> + Send {
        (**self).add_item(request)
    }

    fn finalize_session(
        &self,
        session: &SessionId,
        metadata: &FinalizeMetadata,
    ) -> impl Future<Output = ImprintResult<()>> + Send {
        (**self).finalize_session(session, metadata)
    }
}
