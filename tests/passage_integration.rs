//! Push/pull integration tests over the in-memory transport
//!
//! Run with:
//! ```bash
//! cargo test --test passage_integration
//! ```

use resty::model::{CHECKSUM_KEY, META_DATA_KEY};
use resty::serializer::{BlobStream, ChunkStream};
use resty::{
    Attributes, BlobTransport, Checksum, CloudPassage, DriverCache, Error, ManifestRecord,
    ManifestResponse, MockTransport, RestResponse, SerializationKind, Value,
};
use std::io::Cursor;
use std::sync::Arc;

fn setup() -> (Arc<MockTransport>, CloudPassage) {
    let mock = Arc::new(MockTransport::default());
    let passage = CloudPassage::new(mock.clone()).unwrap();
    (mock, passage)
}

fn attrs(pairs: &[(&str, &str)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[test]
fn test_binary_int_keys_round_trip() {
    let (mock, passage) = setup();
    let original: Value = (0..10).map(|i| (i, i)).collect();

    let response = passage
        .push(&original, SerializationKind::Binary, &attrs(&[("title", "t")]))
        .unwrap();
    assert!(response.is_success());

    let calls = mock.calls();
    assert_eq!(calls.uploads, 1);
    assert_eq!(calls.updates, 0);

    let record = &mock.records()[0];
    let expected = passage
        .compute_checksum(SerializationKind::Binary, &original)
        .unwrap();
    assert_eq!(record.checksum(), Some(expected.as_str()));
    assert_eq!(record.field("title").as_deref(), Some("t"));

    let pulled = passage.pull(&attrs(&[(META_DATA_KEY, "binary")])).unwrap();
    assert_eq!(pulled, Some(original));
}

#[test]
fn test_text_string_keys_round_trip() {
    let (_mock, passage) = setup();
    let original: Value = (0..9).map(|i| (i.to_string(), i * 10)).collect();

    passage
        .push(&original, SerializationKind::Text, &Attributes::new())
        .unwrap();

    let pulled = passage.pull(&attrs(&[(META_DATA_KEY, "text")])).unwrap();
    assert_eq!(pulled, Some(original));
}

#[test]
fn test_text_coerces_int_keys_to_strings() {
    let (_mock, passage) = setup();
    let original: Value = vec![(0, 0), (1, 10)].into_iter().collect();

    passage
        .push(&original, SerializationKind::Text, &Attributes::new())
        .unwrap();

    let pulled = passage
        .pull(&attrs(&[(META_DATA_KEY, "text")]))
        .unwrap()
        .unwrap();
    let expected: Value = vec![("0", 0), ("1", 10)].into_iter().collect();
    assert_eq!(pulled, expected);
    assert_ne!(pulled, original);
}

// ============================================================================
// Dedup and tag fidelity
// ============================================================================

#[test]
fn test_repeat_push_updates_existing_blob() {
    let (mock, passage) = setup();
    let value: Value = vec![("name", Value::from("run-1")), ("score", Value::from(0.5))]
        .into_iter()
        .collect();

    passage
        .push(&value, SerializationKind::Text, &Attributes::new())
        .unwrap();
    let second = passage
        .push(&value, SerializationKind::Text, &attrs(&[("note", "again")]))
        .unwrap();
    assert_eq!(second.status, 200);

    let calls = mock.calls();
    assert_eq!(calls.uploads, 1);
    assert_eq!(calls.updates, 1);
    assert_eq!(calls.manifest_queries, 2);

    let records = mock.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("note").as_deref(), Some("again"));
}

#[test]
fn test_recorded_tag_decides_serializer() {
    let (mock, passage) = setup();
    let value: Value = vec![("k", "v")].into_iter().collect();

    passage
        .push(&value, SerializationKind::Text, &Attributes::new())
        .unwrap();
    let record = mock.records().remove(0);
    let checksum = record.checksum().unwrap().to_string();

    // The caller only knows the checksum; the record says text.
    let pulled = passage.pull(&attrs(&[(CHECKSUM_KEY, checksum.as_str())])).unwrap();
    assert_eq!(pulled, Some(value));
}

/// Answers every query with one text record, whatever the filter says
struct TextOnlyStore;

impl BlobTransport for TextOnlyStore {
    fn checksum_algorithm(&self) -> &str {
        "sha1"
    }

    fn manifest_query(&self, _filter: &Attributes) -> ManifestResponse {
        ManifestResponse::ok(vec![ManifestRecord {
            content: Some("documents/x".into()),
            meta_data: Some("text".into()),
            ..Default::default()
        }])
    }

    fn upload_stream(
        &self,
        _stream: BlobStream,
        _checksum: &Checksum,
        _kind: SerializationKind,
        _attrs: &Attributes,
    ) -> RestResponse {
        RestResponse::from_error("read only")
    }

    fn update_stream(
        &self,
        _stream: BlobStream,
        _content_key: &str,
        _checksum: &Checksum,
        _kind: SerializationKind,
        _attrs: &Attributes,
    ) -> RestResponse {
        RestResponse::from_error("read only")
    }

    fn download_stream(&self, content_key: &str) -> Option<ChunkStream> {
        (content_key == "documents/x")
            .then(|| ChunkStream::from_reader(Cursor::new(br#"{"a":1}"#.to_vec()), 3))
    }

    fn delete_blob(&self, _filter: &Attributes) -> RestResponse {
        RestResponse::from_error("read only")
    }
}

#[test]
fn test_record_tag_wins_over_query_tag() {
    let passage = CloudPassage::new(Arc::new(TextOnlyStore)).unwrap();

    // Asked for binary, but the record the server returned says text
    let pulled = passage.pull(&attrs(&[(META_DATA_KEY, "binary")])).unwrap();
    let expected: Value = vec![("a", 1)].into_iter().collect();
    assert_eq!(pulled, Some(expected));
}

#[test]
fn test_text_blob_is_plain_json() {
    let (mock, passage) = setup();
    let value: Value = vec![("b", 2), ("a", 1)].into_iter().collect();

    passage
        .push(&value, SerializationKind::Text, &Attributes::new())
        .unwrap();
    let key = mock.records()[0].content.clone().unwrap();
    assert_eq!(mock.blob(&key).unwrap(), br#"{"a":1,"b":2}"#.to_vec());
}

#[test]
fn test_checksum_is_deterministic() {
    let (_mock, passage) = setup();
    let build = || -> Value {
        vec![
            ("list", Value::from(vec![1, 2, 3])),
            ("nested", vec![(1, "x")].into_iter().collect()),
            ("flag", Value::from(true)),
        ]
        .into_iter()
        .collect()
    };

    for kind in [SerializationKind::Binary, SerializationKind::Text] {
        let a = passage.compute_checksum(kind, &build()).unwrap();
        let b = passage.compute_checksum(kind, &build()).unwrap();
        assert_eq!(a, b);
    }
}

// ============================================================================
// Absent and failing paths
// ============================================================================

#[test]
fn test_pull_without_match_is_absent() {
    let (mock, passage) = setup();
    assert_eq!(passage.pull(&attrs(&[(META_DATA_KEY, "binary")])).unwrap(), None);
    assert_eq!(mock.calls().downloads, 0);
}

#[test]
fn test_pull_missing_blob_is_absent() {
    let (mock, passage) = setup();
    passage
        .push(&Value::from("gone"), SerializationKind::Binary, &Attributes::new())
        .unwrap();
    let key = mock.records()[0].content.clone().unwrap();
    assert!(mock.evict_blob(&key));

    assert_eq!(passage.pull(&Attributes::new()).unwrap(), None);
    assert_eq!(mock.calls().downloads, 1);
}

#[test]
fn test_corrupt_blob_is_decoding_error() {
    let (mock, passage) = setup();
    mock.insert(
        ManifestRecord {
            content: Some("documents/broken".into()),
            meta_data: Some("text".into()),
            ..Default::default()
        },
        b"{not json".to_vec(),
    );

    assert!(passage.pull(&Attributes::new()).is_err());
}

#[test]
fn test_unencodable_text_fails_before_network() {
    let (mock, passage) = setup();
    let value = Value::bytes(vec![0u8, 1, 2]);

    let result = passage.push(&value, SerializationKind::Text, &Attributes::new());
    assert!(matches!(result, Err(Error::Encoding(_))));
    assert_eq!(mock.calls().manifest_queries, 0);

    // Binary handles raw bytes
    passage
        .push(&value, SerializationKind::Binary, &Attributes::new())
        .unwrap();
    assert_eq!(passage.pull(&Attributes::new()).unwrap(), Some(value));
}

#[test]
fn test_failing_transport_returns_responses() {
    let mock = Arc::new(MockTransport::failing("connection refused"));
    let passage = CloudPassage::new(mock.clone()).unwrap();
    let value = Value::from(42);

    let push = passage
        .push(&value, SerializationKind::Binary, &Attributes::new())
        .unwrap();
    assert_eq!(push.status, 500);
    assert_eq!(push.reason.as_deref(), Some("connection refused"));

    assert_eq!(passage.pull(&Attributes::new()).unwrap(), None);

    let removed = passage
        .remove_trace(&value, SerializationKind::Binary, &Attributes::new())
        .unwrap();
    assert!(removed.is_server_error());
    assert!(passage.remove_by_params(&Attributes::new()).is_server_error());
}

#[test]
fn test_unknown_algorithm_before_any_call() {
    let mock = Arc::new(MockTransport::new("not-a-real-algo"));
    let result = CloudPassage::new(mock.clone());

    assert!(matches!(result, Err(Error::UnknownAlgorithm(_))));
    assert_eq!(mock.calls().manifest_queries, 0);
}

// ============================================================================
// Removal and drivers
// ============================================================================

#[test]
fn test_remove_by_params_and_trace() {
    let (mock, passage) = setup();
    for i in 0..3 {
        passage
            .push(&Value::from(i), SerializationKind::Binary, &attrs(&[("batch", "a")]))
            .unwrap();
    }
    passage
        .push(&Value::from("keep"), SerializationKind::Text, &attrs(&[("batch", "b")]))
        .unwrap();

    passage
        .remove_trace(&Value::from(0), SerializationKind::Binary, &Attributes::new())
        .unwrap();
    assert_eq!(mock.records().len(), 3);

    let response = passage.remove_by_params(&attrs(&[("batch", "a")]));
    assert!(response.is_success());
    assert_eq!(mock.records().len(), 1);
    assert_eq!(
        passage.pull(&Attributes::new()).unwrap(),
        Some(Value::from("keep"))
    );
}

#[test]
fn test_add_driver_reuses_cached_transport() {
    let mock = Arc::new(MockTransport::default());
    let cache = DriverCache::new(|_, _| {
        Ok(Arc::new(MockTransport::default()) as Arc<dyn BlobTransport>)
    });
    let passage = CloudPassage::with_cache(mock, cache).unwrap();

    let a = passage.add_driver("http://10.0.0.5", "8000").unwrap();
    let b = passage.add_driver("http://10.0.0.6", "8000").unwrap();
    let c = passage.add_driver("http://10.0.0.5", "8000").unwrap();
    assert!(Arc::ptr_eq(&a, &c));
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(passage.drivers().len(), 2);

    // A second passage over a cached driver shares its store
    let other = CloudPassage::new(a).unwrap();
    other
        .push(&Value::from(1), SerializationKind::Binary, &Attributes::new())
        .unwrap();
    assert_eq!(
        CloudPassage::new(c).unwrap().pull(&Attributes::new()).unwrap(),
        Some(Value::from(1))
    );
}
