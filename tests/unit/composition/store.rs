use super::*;
use crate::transform::codec::{BlendMode, NormalizedTransform};

fn draft(product_ref: &str) -> CompositionDraft {
    CompositionDraft {
        product_ref: product_ref.to_owned(),
        transform: NormalizedTransform {
            x: 0.5,
            y: 0.42,
            scale_x: 0.37,
            scale_y: 0.37,
            rotation_deg: -8.0,
            opacity: 0.9,
            blend: BlendMode::Multiply,
        },
        source_image_index: 1,
        logo_ref: "upload:logo-77".to_owned(),
    }
}

#[tokio::test]
async fn create_then_get_round_trips() {
    let store = CompositionStore::new(MemoryDocumentStore::new());
    let record = store.create(draft("P1")).await.unwrap();
    assert_eq!(record.id.as_str().len(), 8);
    assert!(record.created_at_ms > 0);

    let fetched = store.get(&record.id).await.unwrap();
    assert_eq!(fetched.product_ref, "P1");
    assert_eq!(fetched.transform, draft("P1").transform);
    assert_eq!(fetched, record);
}

#[tokio::test]
async fn create_rejects_invalid_drafts_without_writing() {
    let store = CompositionStore::new(MemoryDocumentStore::new());

    let err = store.create(draft("")).await.unwrap_err();
    assert!(matches!(err, ImprintError::Validation(_)));

    let mut bad = draft("P1");
    bad.transform.scale_y = 0.0;
    assert!(store.create(bad).await.is_err());
}

#[tokio::test]
async fn write_failure_surfaces_storage_error() {
    let docs = MemoryDocumentStore::new();
    docs.fail_next_write(ImprintError::storage("disk full"));
    let store = CompositionStore::new(docs);

    let err = store.create(draft("P1")).await.unwrap_err();
    assert!(matches!(err, ImprintError::Storage(_)));

    // One caller-side retry is the policy; a second attempt goes through and
    // yields a fresh id.
    let record = store.create(draft("P1")).await.unwrap();
    assert_eq!(store.get(&record.id).await.unwrap().id, record.id);
}

#[tokio::test]
async fn get_miss_is_not_found() {
    let store = CompositionStore::new(MemoryDocumentStore::new());
    let err = store
        .get(&CompositionId::from_string("deadbeef"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn get_eventually_absorbs_a_not_yet_durable_read() {
    let docs = MemoryDocumentStore::new();
    let store = CompositionStore::new(docs);
    let record = store.create(draft("P1")).await.unwrap();

    // The first two reads race the in-flight write and legitimately miss.
    store.docs.delay_visibility(&record.id, 2);
    let err = store.get(&record.id).await.unwrap_err();
    assert!(err.is_not_found());

    let fetched = store
        .get_eventually(&record.id, 3, Duration::from_millis(1))
        .await
        .unwrap();
    assert_eq!(fetched.id, record.id);
}

#[tokio::test]
async fn get_eventually_still_misses_truly_absent_ids() {
    let store = CompositionStore::new(MemoryDocumentStore::new());
    let err = store
        .get_eventually(
            &CompositionId::from_string("00000000"),
            2,
            Duration::from_millis(1),
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn fs_store_round_trips_documents() {
    let root = std::env::temp_dir().join(format!(
        "imprint_store_test_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));

    let store = CompositionStore::new(FsDocumentStore::new(&root));
    let record = store.create(draft("P9")).await.unwrap();

    let on_disk = root.join(format!("{}.json", record.id));
    assert!(on_disk.exists());

    let fetched = store.get(&record.id).await.unwrap();
    assert_eq!(fetched, record);

    let miss = store
        .get(&CompositionId::from_string("ffffffff"))
        .await
        .unwrap_err();
    assert!(miss.is_not_found());

    std::fs::remove_dir_all(&root).ok();
}
