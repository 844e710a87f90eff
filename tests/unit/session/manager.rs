use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::backend::memory::{BackendOp, InMemoryBackend};
use crate::session::mirror::MemoryStore;
use crate::session::model::{PrintMethod, ProductRef};

type TestManager = SessionManager<Arc<InMemoryBackend>, Arc<MemoryStore>>;

fn open_manager(backend: &Arc<InMemoryBackend>, mirror: &Arc<MemoryStore>) -> TestManager {
    SessionManager::open(
        Arc::clone(backend),
        Arc::clone(mirror),
        SessionManagerOpts::default(),
    )
}

fn draft(sku: &str) -> OrderItemDraft {
    OrderItemDraft {
        product: ProductRef {
            sku: sku.to_owned(),
            title: "Thermal bottle".to_owned(),
        },
        quantity: 100,
        width_cm: 5.0,
        logo_ref: format!("logo:{sku}"),
        composite_ref: format!("mockup:{sku}"),
        variant: None,
    }
}

fn metadata() -> FinalizeMetadata {
    FinalizeMetadata {
        job_name: "company event".to_owned(),
        deadline: "2026-09-01".to_owned(),
        method: PrintMethod::Dtf,
        notes: String::new(),
        final_check: true,
    }
}

fn mirrored_session(mirror: &MemoryStore) -> Option<OrderSession> {
    mirror
        .get(ORDER_MIRROR_KEY)
        .unwrap()
        .map(|bytes| serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn five_adds_fill_slots_monotonically() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    for i in 1..=5u8 {
        let item = manager
            .add_item(draft(&format!("SKU-{i}")), vec![i], vec![i, i])
            .await
            .unwrap();
        assert_eq!(item.slot.get(), i);
    }

    assert_eq!(manager.phase(), SessionPhase::Full);
    assert_eq!(backend.create_calls(), 1);

    let session_id = manager.session_id().unwrap();
    assert_eq!(backend.claimed_slots(&session_id), vec![1, 2, 3, 4, 5]);

    let mirrored = mirrored_session(&mirror).unwrap();
    assert_eq!(mirrored.items.len(), 5);
    mirrored.validate().unwrap();
}

#[tokio::test]
async fn sixth_add_fails_without_any_remote_call() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    for i in 1..=5u8 {
        manager
            .add_item(draft(&format!("SKU-{i}")), vec![], vec![])
            .await
            .unwrap();
    }
    let before = manager.snapshot();
    let adds_before = backend.add_calls();

    let err = manager
        .add_item(draft("SKU-6"), vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ImprintError::SessionFull(_)));
    assert_eq!(manager.snapshot(), before);
    assert_eq!(manager.items().len(), 5);
    assert_eq!(backend.add_calls(), adds_before);
}

#[tokio::test]
async fn racing_adds_create_exactly_one_session() {
    let backend = Arc::new(InMemoryBackend::with_latency(Duration::from_millis(5)));
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    let (a, b) = tokio::join!(
        manager.add_item(draft("SKU-A"), vec![], vec![]),
        manager.add_item(draft("SKU-B"), vec![], vec![]),
    );
    let a = a.unwrap();
    let b = b.unwrap();

    assert_eq!(backend.create_calls(), 1);
    let session_id = manager.session_id().unwrap();
    let mut slots = vec![a.slot.get(), b.slot.get()];
    slots.sort_unstable();
    assert_eq!(slots, vec![1, 2]);
    assert_eq!(backend.claimed_slots(&session_id), vec![1, 2]);
}

#[tokio::test]
async fn failed_creation_is_retryable() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    backend.fail_next(BackendOp::CreateSession, ImprintError::network("offline"));
    let err = manager
        .add_item(draft("SKU-1"), vec![], vec![])
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert!(manager.session_id().is_none());

    // The caller's one retry goes through with a fresh creation attempt.
    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
    assert_eq!(backend.create_calls(), 2);
    assert_eq!(manager.items().len(), 1);
}

#[tokio::test]
async fn failed_add_leaves_local_state_untouched() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
    let before = manager.snapshot();
    let mirror_before = mirror.get(ORDER_MIRROR_KEY).unwrap();

    backend.fail_next(BackendOp::AddItem, ImprintError::network("timeout"));
    let err = manager
        .add_item(draft("SKU-2"), vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ImprintError::Network(_)));

    assert_eq!(manager.snapshot(), before);
    assert_eq!(mirror.get(ORDER_MIRROR_KEY).unwrap(), mirror_before);

    // Retrying claims the same slot the failed call targeted.
    let item = manager
        .add_item(draft("SKU-2"), vec![], vec![])
        .await
        .unwrap();
    assert_eq!(item.slot.get(), 2);
}

#[tokio::test]
async fn consistency_rejection_clears_the_session() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
    let session_id = manager.session_id().unwrap();

    // External invalidation: the backend no longer knows our session.
    backend.evict_session(&session_id);
    let err = manager
        .add_item(draft("SKU-2"), vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ImprintError::Consistency(_)));

    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert!(manager.session_id().is_none());
    assert!(mirrored_session(&mirror).is_none());

    // The next add starts a brand new session.
    manager.add_item(draft("SKU-3"), vec![], vec![]).await.unwrap();
    assert_eq!(backend.create_calls(), 2);
    assert_ne!(manager.session_id().unwrap(), session_id);
}

#[tokio::test]
async fn finalize_clears_state_and_durable_key() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
    let session_id = manager.session_id().unwrap();

    manager.finalize(metadata()).await.unwrap();

    assert!(manager.session_id().is_none());
    assert!(manager.items().is_empty());
    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert_eq!(mirror.get(ORDER_MIRROR_KEY).unwrap(), None);
    assert_eq!(
        backend.finalized_metadata(&session_id).unwrap().job_name,
        "company event"
    );
}

#[tokio::test]
async fn finalize_requires_items_and_confirmation() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    // Empty session: nothing to finalize, and no remote call is made.
    let err = manager.finalize(metadata()).await.unwrap_err();
    assert!(matches!(err, ImprintError::Validation(_)));
    assert_eq!(backend.finalize_calls(), 0);

    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();

    let mut unchecked = metadata();
    unchecked.final_check = false;
    let err = manager.finalize(unchecked).await.unwrap_err();
    assert!(matches!(err, ImprintError::Validation(_)));
    assert_eq!(manager.items().len(), 1);
}

#[tokio::test]
async fn finalize_is_retryable_after_transient_failure() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
    let before = manager.snapshot();

    backend.fail_next(BackendOp::Finalize, ImprintError::network("timeout"));
    let err = manager.finalize(metadata()).await.unwrap_err();
    assert!(err.is_transient());
    assert_eq!(manager.snapshot(), before);

    manager.finalize(metadata()).await.unwrap();
    assert_eq!(manager.phase(), SessionPhase::Empty);
}

#[tokio::test]
async fn reset_is_unconditional() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    // From Empty.
    manager.reset().unwrap();
    assert_eq!(manager.phase(), SessionPhase::Empty);

    // From Active.
    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
    let session_id = manager.session_id().unwrap();
    manager.reset().unwrap();
    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert!(manager.session_id().is_none());
    assert_eq!(mirror.get(ORDER_MIRROR_KEY).unwrap(), None);

    // Nothing is retracted remotely.
    assert_eq!(backend.claimed_slots(&session_id), vec![1]);
}

#[tokio::test]
async fn reset_during_an_inflight_add_commits_nothing() {
    // Creation suspends for 50ms and the remote add for another 50ms; the
    // reset lands in the middle of the remote add.
    let backend = Arc::new(InMemoryBackend::with_latency(Duration::from_millis(50)));
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    let (add, _) = tokio::join!(manager.add_item(draft("SKU-1"), vec![], vec![]), async {
        tokio::time::sleep(Duration::from_millis(75)).await;
        manager.reset().unwrap();
    });

    // The remote call may have been accepted, but the late completion must
    // not resurrect local state.
    let err = add.unwrap_err();
    assert!(matches!(err, ImprintError::Consistency(_)));
    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert!(manager.session_id().is_none());
    assert_eq!(mirror.get(ORDER_MIRROR_KEY).unwrap(), None);
}

#[tokio::test]
async fn rehydration_restores_a_mirrored_session() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());

    let session_id = {
        let manager = open_manager(&backend, &mirror);
        manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();
        manager.add_item(draft("SKU-2"), vec![], vec![]).await.unwrap();
        manager.session_id().unwrap()
    };

    // A page reload: a fresh manager over the same durable store.
    let manager = open_manager(&backend, &mirror);
    assert_eq!(manager.session_id().unwrap(), session_id);
    assert_eq!(manager.items().len(), 2);
    assert_eq!(manager.lowest_free_slot().unwrap().get(), 3);

    // Adds keep attaching to the original remote session.
    manager.add_item(draft("SKU-3"), vec![], vec![]).await.unwrap();
    assert_eq!(backend.create_calls(), 1);
    assert_eq!(backend.claimed_slots(&session_id), vec![1, 2, 3]);
}

#[tokio::test]
async fn corrupt_mirror_starts_empty() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    mirror.set(ORDER_MIRROR_KEY, b"{ not json").unwrap();

    let manager = open_manager(&backend, &mirror);
    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert!(manager.session_id().is_none());
}

#[tokio::test]
async fn invariant_violating_mirror_is_discarded() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());

    // An item without its slot claimed: items and used_slots out of step.
    let bogus = serde_json::json!({
        "session_id": "sess-9",
        "items": [{
            "id": "11111111-2222-3333-4444-555555555555",
            "slot": 1,
            "product": {"sku": "S", "title": "T"},
            "quantity": 10,
            "width_cm": 4.0,
            "logo_ref": "l",
            "composite_ref": "c"
        }],
        "used_slots": []
    });
    mirror
        .set(ORDER_MIRROR_KEY, bogus.to_string().as_bytes())
        .unwrap();

    let manager = open_manager(&backend, &mirror);
    assert_eq!(manager.phase(), SessionPhase::Empty);
    assert!(manager.items().is_empty());
}

#[tokio::test]
async fn mirror_flush_failure_keeps_the_acknowledged_item() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    manager.add_item(draft("SKU-1"), vec![], vec![]).await.unwrap();

    mirror.fail_next_set(ImprintError::storage("quota exceeded"));
    let err = manager
        .add_item(draft("SKU-2"), vec![], vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, ImprintError::Storage(_)));

    // The backend accepted the item; dropping it locally would desync worse.
    assert_eq!(manager.items().len(), 2);
    let session_id = manager.session_id().unwrap();
    assert_eq!(backend.claimed_slots(&session_id), vec![1, 2]);
}

#[tokio::test]
async fn artifacts_travel_with_the_add() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    let item = manager
        .add_item(draft("SKU-1"), vec![1, 2, 3], vec![4, 5, 6, 7])
        .await
        .unwrap();
    let session_id = manager.session_id().unwrap();
    assert_eq!(
        backend.upload_sizes(&session_id, item.slot),
        Some((3, 4))
    );
}

#[tokio::test]
async fn invalid_drafts_never_reach_the_backend() {
    let backend = Arc::new(InMemoryBackend::new());
    let mirror = Arc::new(MemoryStore::new());
    let manager = open_manager(&backend, &mirror);

    let mut zero_qty = draft("SKU-1");
    zero_qty.quantity = 0;
    let err = manager.add_item(zero_qty, vec![], vec![]).await.unwrap_err();
    assert!(matches!(err, ImprintError::Validation(_)));
    assert_eq!(backend.create_calls(), 0);
    assert_eq!(backend.add_calls(), 0);
}
