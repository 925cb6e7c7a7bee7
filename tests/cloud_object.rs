mod common;

use bytes::Bytes;
use cloud_object::{
    Attributes, ByteRangeSlice, CacheSlot, CloudObject, CloudObjectError, CloudObjectSlice,
    StoreClient, services::attribute_codec,
};
use common::{CountingStore, generic_type};
use serde_json::json;
use std::sync::Arc;

fn reference(uri: &str, store: &Arc<CountingStore>) -> CloudObject {
    CloudObject::new(generic_type(), uri, store.clone()).unwrap()
}

fn encoded(attrs: &[(&str, serde_json::Value)]) -> Bytes {
    let attrs: Attributes = attrs.iter().cloned().collect();
    attribute_codec::encode(&attrs).unwrap()
}

#[tokio::test]
async fn locations_follow_the_companion_convention() {
    let store = CountingStore::new();
    let object = reference("store://bucket1/data.csv", &store);

    assert_eq!(object.path().bucket(), "bucket1");
    assert_eq!(object.path().key(), "data.csv");
    assert_eq!(object.meta_path().bucket(), "bucket1.meta");
    assert_eq!(object.meta_path().key(), "data.csv");
    assert_eq!(store.head_count(), 0);
}

#[tokio::test]
async fn malformed_uri_fails_construction() {
    let err =
        CloudObject::new(generic_type(), "bucket1/data.csv", CountingStore::new()).unwrap_err();
    assert!(matches!(err, CloudObjectError::MalformedUri(_)));
}

#[tokio::test]
async fn fetch_looks_up_each_slot_at_most_once() {
    let store = CountingStore::new()
        .with_object("bucket1", "data.csv", b"a,b\n1,2\n")
        .with_companion("bucket1.meta", "data.csv", encoded(&[("rows", json!(1))]));
    let mut object = reference("s3://bucket1/data.csv", &store);

    let (obj, meta) = object.fetch(false, false).await.unwrap();
    assert_eq!(obj.unwrap().content_length, 8);
    assert!(meta.is_some());
    assert_eq!(store.head_count(), 2);

    // Both slots resolved: nothing is looked up again, and the cached pair is
    // still returned.
    let (obj_again, meta_again) = object.fetch(true, true).await.unwrap();
    assert_eq!(obj_again.unwrap().content_length, 8);
    assert!(meta_again.is_some());
    assert!(object.exists().await.unwrap());
    assert_eq!(object.size().await.unwrap(), 8);
    assert_eq!(store.head_count(), 2);
    assert_eq!(store.head_count_for("bucket1", "data.csv"), 1);
    assert_eq!(store.head_count_for("bucket1.meta", "data.csv"), 1);
}

#[tokio::test]
async fn absent_slots_are_cached_too() {
    let store = CountingStore::new();
    let mut object = reference("s3://bucket1/nope", &store);

    assert_eq!(object.fetch(false, false).await.unwrap(), (None, None));
    assert!(!object.exists().await.unwrap());
    assert_eq!(store.head_count(), 2);
}

#[tokio::test]
async fn enforced_fetch_names_the_missing_slot() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"x");
    let mut object = reference("s3://bucket1/data.csv", &store);

    let err = object.fetch(false, true).await.unwrap_err();
    match err {
        CloudObjectError::NotFound { slot, location } => {
            assert_eq!(slot, CacheSlot::Companion);
            assert_eq!(location.bucket(), "bucket1.meta");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }

    let mut missing = reference("s3://bucket1/other", &store);
    let err = missing.fetch(true, false).await.unwrap_err();
    assert!(matches!(err, CloudObjectError::NotFound { slot: CacheSlot::Object, .. }));
}

#[tokio::test]
async fn exists_and_size_only_touch_the_object_slot() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"0123456789");
    let mut object = reference("s3://bucket1/data.csv", &store);

    assert!(object.exists().await.unwrap());
    assert_eq!(object.size().await.unwrap(), 10);
    assert_eq!(store.head_count_for("bucket1.meta", "data.csv"), 0);
    assert_eq!(store.head_count(), 1);
}

#[tokio::test]
async fn size_of_missing_object_fails() {
    let mut object =
        CloudObject::new(generic_type(), "s3://bucket1/missing", CountingStore::new()).unwrap();
    assert!(object.size().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn is_preprocessed_probes_every_time() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"x");
    let mut object = reference("s3://bucket1/data.csv", &store);
    object.fetch(false, false).await.unwrap();

    assert!(!object.is_preprocessed().await.unwrap());
    store
        .put("bucket1.meta", "data.csv", Bytes::new(), Some(encoded(&[])))
        .await
        .unwrap();
    assert!(object.is_preprocessed().await.unwrap());
    assert_eq!(store.head_count_for("bucket1.meta", "data.csv"), 3);

    // The cached companion slot is untouched by the probe.
    assert_eq!(object.fetch(false, false).await.unwrap().1, None);
}

#[tokio::test]
async fn transport_errors_pass_through() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"x");
    *store.fail_heads.lock().unwrap() = Some(std::io::ErrorKind::TimedOut);
    let mut object = reference("s3://bucket1/data.csv", &store);

    let err = object.is_preprocessed().await.unwrap_err();
    assert!(matches!(err, CloudObjectError::Store(cloud_object::StoreError::Io(_))));
    assert!(object.exists().await.is_err());

    // The failed lookup left the slot unresolved.
    *store.fail_heads.lock().unwrap() = None;
    assert!(object.exists().await.unwrap());
}

#[tokio::test]
async fn attributes_come_from_the_companion() {
    let store = CountingStore::new()
        .with_object("bucket1", "data.csv", b"a,b\n1,2\n")
        .with_companion(
            "bucket1.meta",
            "data.csv",
            encoded(&[("rows", json!(2)), ("columns", json!(["a", "b"]))]),
        );
    let mut object = reference("s3://bucket1/data.csv", &store);

    // Not fetched yet: nothing to read.
    assert!(matches!(
        object.get_attribute("rows").unwrap_err(),
        CloudObjectError::AttributeNotFound(ref name) if name == "rows"
    ));

    object.fetch(false, true).await.unwrap();
    assert_eq!(object.get_attribute("rows").unwrap(), &json!(2));
    assert_eq!(
        object.get_attribute_as::<Vec<String>>("columns").unwrap(),
        vec!["a", "b"]
    );
    assert!(matches!(
        object.get_attribute_as::<u64>("columns").unwrap_err(),
        CloudObjectError::AttributeType { .. }
    ));
    assert!(matches!(
        object.get_attribute("missing").unwrap_err(),
        CloudObjectError::AttributeNotFound(_)
    ));
}

#[tokio::test]
async fn corrupt_companion_leaves_no_partial_state() {
    let store = CountingStore::new()
        .with_object("bucket1", "data.csv", b"x")
        .with_companion("bucket1.meta", "data.csv", Bytes::from_static(b"!!not-base64!!"));
    let mut object = reference("s3://bucket1/data.csv", &store);

    let err = object.fetch(false, false).await.unwrap_err();
    assert!(matches!(err, CloudObjectError::CorruptAttributes(_)));
    assert!(object.attributes().is_empty());

    // The companion slot stayed unresolved, so a repaired payload is picked up.
    store
        .put("bucket1.meta", "data.csv", Bytes::new(), Some(encoded(&[("ok", json!(true))])))
        .await
        .unwrap();
    object.fetch(false, true).await.unwrap();
    assert_eq!(object.get_attribute("ok").unwrap(), &json!(true));
}

#[tokio::test]
async fn invalidate_forces_a_refresh() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"x");
    let mut object = reference("s3://bucket1/data.csv", &store);
    object.fetch(false, false).await.unwrap();

    store
        .put("bucket1.meta", "data.csv", Bytes::new(), Some(encoded(&[("n", json!(1))])))
        .await
        .unwrap();
    assert!(object.fetch(false, false).await.unwrap().1.is_none());

    object.invalidate();
    assert!(object.fetch(false, false).await.unwrap().1.is_some());
    assert_eq!(object.get_attribute("n").unwrap(), &json!(1));
    assert_eq!(store.head_count(), 4);
}

#[tokio::test]
async fn from_existing_requires_the_object_when_fetching() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"abc");

    let uri = "s3://bucket1/data.csv";
    let object = CloudObject::from_existing(generic_type(), uri, store.clone(), true)
        .await
        .unwrap();
    assert!(object.attributes().is_empty());

    let missing = "s3://bucket1/missing";
    let err = CloudObject::from_existing(generic_type(), missing, store.clone(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, CloudObjectError::NotFound { slot: CacheSlot::Object, .. }));

    let before = store.head_count();
    CloudObject::from_existing(generic_type(), missing, store.clone(), false)
        .await
        .unwrap();
    assert_eq!(store.head_count(), before);
}

#[tokio::test]
async fn create_from_local_refuses_occupied_locations() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"already here");
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("data.csv");
    tokio::fs::write(&local, b"new contents").await.unwrap();

    let occupied = "s3://bucket1/data.csv";
    let err = CloudObject::create_from_local(generic_type(), &local, occupied, store.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, CloudObjectError::AlreadyExists(_)));
    assert_eq!(store.upload_count(), 0);

    let fresh = "s3://bucket1/fresh.csv";
    let mut object = CloudObject::create_from_local(generic_type(), &local, fresh, store.clone())
        .await
        .unwrap();
    assert_eq!(store.upload_count(), 1);
    assert!(object.exists().await.unwrap());
    assert_eq!(object.size().await.unwrap(), 12);
    assert_eq!(store.head_count_for("bucket1", "fresh.csv"), 1);
}

#[tokio::test]
async fn partition_binds_slices_and_keeps_order() {
    let store = CountingStore::new().with_object("bucket1", "data.csv", b"aaaabbbbcccc");
    let object = reference("s3://bucket1/data.csv", &store);

    // Deliberately out of byte order: the strategy's order is kept as is.
    let slices = object
        .partition(|_| {
            Ok(vec![
                ByteRangeSlice::new(8, 12),
                ByteRangeSlice::new(0, 4),
                ByteRangeSlice::new(4, 8),
            ])
        })
        .unwrap();

    assert_eq!(slices.len(), 3);
    let starts: Vec<u64> = slices.iter().map(|s| s.range_0).collect();
    assert_eq!(starts, vec![8, 0, 4]);
    for slice in &slices {
        let owner = slice.owner().expect("slice bound to its owner");
        assert_eq!(owner.location(), object.path());
        assert_eq!(owner.meta_location(), object.meta_path());
    }

    let mut data = Vec::new();
    for slice in &slices {
        data.push(slice.get().await.unwrap());
    }
    assert_eq!(data, vec!["cccc", "aaaa", "bbbb"]);
}

#[tokio::test]
async fn strategies_see_the_reference_and_can_fail() {
    let store = CountingStore::new()
        .with_object("bucket1", "data.csv", b"0123456789")
        .with_companion("bucket1.meta", "data.csv", encoded(&[("chunk", json!(3))]));
    let mut object = reference("s3://bucket1/data.csv", &store);
    let size = object.size().await.unwrap();
    object.fetch(false, true).await.unwrap();

    let slices = object
        .partition(|obj| {
            let chunk: u64 = obj.get_attribute_as("chunk")?;
            Ok((0..size)
                .step_by(chunk as usize)
                .map(|start| ByteRangeSlice::new(start, (start + chunk).min(size)))
                .collect())
        })
        .unwrap();
    assert_eq!(slices.len(), 4);
    assert_eq!(slices.last().unwrap().len(), 1);

    let err = object
        .partition::<ByteRangeSlice, _>(|obj| {
            obj.get_attribute("missing")?;
            Ok(Vec::new())
        })
        .unwrap_err();
    assert!(matches!(err, CloudObjectError::AttributeNotFound(_)));
}

#[tokio::test]
async fn unbound_slices_cannot_read() {
    let slice = ByteRangeSlice::new(0, 1);
    assert!(slice.owner().is_none());
    assert!(matches!(
        slice.get().await.unwrap_err(),
        CloudObjectError::SliceNotContextualized
    ));
}

#[test]
fn references_share_the_store_handle() {
    let store = CountingStore::new();
    let a = reference("s3://bucket1/a", &store);
    let b = reference("s3://bucket1/b", &store);
    assert!(Arc::ptr_eq(a.store(), b.store()));
}

#[tokio::test]
async fn long_bucket_names_read_as_not_preprocessed() {
    let (_dir, store) = common::disk_store().await;
    let bucket = "b".repeat(60);
    store.create_bucket(&bucket).await.unwrap();
    store
        .put(&bucket, "data.csv", Bytes::from_static(b"a,b\n"), None)
        .await
        .unwrap();

    // `<bucket>.meta` is past the name limit, so the companion can never exist.
    let uri = format!("s3://{bucket}/data.csv");
    let mut object = CloudObject::new(generic_type(), &uri, store.clone()).unwrap();
    assert!(object.exists().await.unwrap());
    assert!(!object.is_preprocessed().await.unwrap());

    let (obj, meta) = object.fetch(false, false).await.unwrap();
    assert_eq!(obj.unwrap().content_length, 4);
    assert!(meta.is_none());
}
