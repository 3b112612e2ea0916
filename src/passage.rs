//! Push/pull protocol over a blob store
//!
//! [`CloudPassage`] is the main entry point: it serializes values, checks the
//! manifest for an identical payload before writing, and reads values back
//! using the kind tag the server recorded.

use crate::config::DriverConfig;
use crate::model::{
    Attributes, Checksum, ChecksumEngine, ManifestRecord, SerializationKind, Value, CHECKSUM_KEY,
    META_DATA_KEY, URI_KEY,
};
use crate::serializer::{BlobStream, Serializer};
use crate::transport::{BlobTransport, RestDriver, RestResponse};
use crate::Result;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds a transport for a (host, port) pair
pub type DriverFactory = dyn Fn(&str, &str) -> Result<Arc<dyn BlobTransport>> + Send + Sync;

/// Transports keyed by (host, port), created at most once per pair
pub struct DriverCache {
    drivers: Mutex<HashMap<(String, String), Arc<dyn BlobTransport>>>,
    factory: Box<DriverFactory>,
}

impl DriverCache {
    pub fn new(
        factory: impl Fn(&str, &str) -> Result<Arc<dyn BlobTransport>> + Send + Sync + 'static,
    ) -> Self {
        DriverCache {
            drivers: Mutex::new(HashMap::new()),
            factory: Box::new(factory),
        }
    }

    /// A cache building [`RestDriver`]s that share `template`'s settings
    pub fn rest(template: DriverConfig) -> Self {
        Self::new(move |host, port| {
            let base = DriverConfig::new(host, port);
            let config = DriverConfig {
                host: base.host,
                port: base.port,
                ..template.clone()
            };
            Ok(Arc::new(RestDriver::new(config)?) as Arc<dyn BlobTransport>)
        })
    }

    fn key(host: &str, port: &str) -> (String, String) {
        let config = DriverConfig::new(host, port);
        (config.host, config.port)
    }

    /// Return the cached transport for the pair, creating it on first use
    pub fn get_or_create(&self, host: &str, port: &str) -> Result<Arc<dyn BlobTransport>> {
        let key = Self::key(host, port);
        let mut drivers = self.drivers.lock();
        if let Some(driver) = drivers.get(&key) {
            return Ok(Arc::clone(driver));
        }

        let driver = (self.factory)(&key.0, &key.1)?;
        info!(host = %key.0, port = %key.1, "created driver");
        drivers.insert(key, Arc::clone(&driver));
        Ok(driver)
    }

    /// Seed the cache with an existing transport
    pub fn insert(&self, host: &str, port: &str, driver: Arc<dyn BlobTransport>) {
        self.drivers.lock().insert(Self::key(host, port), driver);
    }

    pub fn contains(&self, host: &str, port: &str) -> bool {
        self.drivers.lock().contains_key(&Self::key(host, port))
    }

    pub fn len(&self) -> usize {
        self.drivers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.lock().is_empty()
    }
}

impl std::fmt::Debug for DriverCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<_> = self.drivers.lock().keys().cloned().collect();
        f.debug_struct("DriverCache").field("drivers", &keys).finish()
    }
}

/// Result of looking up the head manifest record for a query
#[derive(Clone, Debug, PartialEq)]
pub enum ManifestLookup {
    /// First matching record
    Found(ManifestRecord),
    /// The call succeeded but nothing matched
    NotFound,
    /// The call itself failed
    Failed(RestResponse),
}

impl ManifestLookup {
    pub fn status(&self) -> u16 {
        match self {
            ManifestLookup::Found(_) => StatusCode::OK.as_u16(),
            ManifestLookup::NotFound => StatusCode::NOT_FOUND.as_u16(),
            ManifestLookup::Failed(response) => response.status,
        }
    }

    pub fn record(&self) -> Option<&ManifestRecord> {
        match self {
            ManifestLookup::Found(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<ManifestRecord> {
        match self {
            ManifestLookup::Found(record) => Some(record),
            _ => None,
        }
    }
}

/// Stores and retrieves values as deduplicated blobs
pub struct CloudPassage {
    engine: ChecksumEngine,
    binary: Serializer,
    text: Serializer,
    transport: Arc<dyn BlobTransport>,
    drivers: DriverCache,
}

impl CloudPassage {
    /// Wrap a transport. Fails when its checksum algorithm is unknown.
    ///
    /// Further drivers from [`CloudPassage::add_driver`] are [`RestDriver`]s
    /// with default settings.
    pub fn new(transport: Arc<dyn BlobTransport>) -> Result<Self> {
        Self::with_cache(transport, DriverCache::rest(DriverConfig::default()))
    }

    /// Wrap a transport with a custom driver cache
    pub fn with_cache(transport: Arc<dyn BlobTransport>, drivers: DriverCache) -> Result<Self> {
        let engine = ChecksumEngine::new(transport.checksum_algorithm())?;
        Ok(CloudPassage {
            engine,
            binary: Serializer::for_kind(SerializationKind::Binary),
            text: Serializer::for_kind(SerializationKind::Text),
            transport,
            drivers,
        })
    }

    /// Connect to the server described by `config`
    pub fn connect(config: DriverConfig) -> Result<Self> {
        let driver: Arc<dyn BlobTransport> = Arc::new(RestDriver::new(config.clone())?);
        let drivers = DriverCache::rest(config.clone());
        drivers.insert(&config.host, &config.port, Arc::clone(&driver));
        Self::with_cache(driver, drivers)
    }

    pub fn transport(&self) -> &Arc<dyn BlobTransport> {
        &self.transport
    }

    pub fn checksum_engine(&self) -> ChecksumEngine {
        self.engine
    }

    pub fn drivers(&self) -> &DriverCache {
        &self.drivers
    }

    /// Get or create the transport for another (host, port) pair
    pub fn add_driver(&self, host: &str, port: &str) -> Result<Arc<dyn BlobTransport>> {
        self.drivers.get_or_create(host, port)
    }

    fn serializer(&self, kind: SerializationKind) -> &Serializer {
        match kind {
            SerializationKind::Binary => &self.binary,
            SerializationKind::Text => &self.text,
        }
    }

    /// Checksum of `value` as it would be stored under `kind`
    pub fn compute_checksum(&self, kind: SerializationKind, value: &Value) -> Result<Checksum> {
        self.serializer(kind).checksum(value, &self.engine)
    }

    /// Store a value, updating the existing blob when an identical payload
    /// with the same kind is already recorded. Any other lookup outcome,
    /// a failed one included, uploads.
    ///
    /// Encoding and checksum problems are `Err`; everything the transport
    /// reports, failures included, comes back as the response.
    pub fn push(
        &self,
        value: &Value,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> Result<RestResponse> {
        let serializer = self.serializer(kind);
        let payload = serializer.serialize(value)?;
        let checksum = self.engine.digest(serializer.pre_hash(&payload));
        let stream = BlobStream::new(payload.into_bytes());

        match self.manifest_pull(&dedup_query(&checksum, kind)) {
            ManifestLookup::Found(ManifestRecord {
                content: Some(content_key),
                ..
            }) => {
                debug!(%checksum, %content_key, "payload already stored, updating");
                Ok(self
                    .transport
                    .update_stream(stream, &content_key, &checksum, kind, attrs))
            }
            lookup => {
                if let ManifestLookup::Failed(response) = &lookup {
                    warn!(
                        status = response.status,
                        reason = ?response.reason,
                        "manifest lookup failed, uploading"
                    );
                }
                let mut attrs = attrs.clone();
                attrs
                    .entry(URI_KEY.to_string())
                    .or_insert_with(default_uri);
                debug!(%checksum, kind = %kind, "uploading new payload");
                Ok(self.transport.upload_stream(stream, &checksum, kind, &attrs))
            }
        }
    }

    /// Fetch and decode the value behind the first record matching `query`
    ///
    /// `Ok(None)` when the lookup fails or nothing matches, the blob is gone,
    /// or the record's kind tag is not one this client can decode.
    pub fn pull(&self, query: &Attributes) -> Result<Option<Value>> {
        let record = match self.manifest_pull(query) {
            ManifestLookup::Found(record) => record,
            ManifestLookup::NotFound => return Ok(None),
            ManifestLookup::Failed(response) => {
                warn!(
                    status = response.status,
                    reason = ?response.reason,
                    "manifest lookup failed"
                );
                return Ok(None);
            }
        };

        let Some(content_key) = record.content.as_deref() else {
            warn!("manifest record has no content key");
            return Ok(None);
        };
        let Some(kind) = record.kind() else {
            warn!(tag = ?record.meta_data, "unknown kind tag");
            return Ok(None);
        };

        let Some(chunks) = self.transport.download_stream(content_key) else {
            debug!(content_key, "blob not available");
            return Ok(None);
        };
        let data = match chunks.drain() {
            Ok(data) => data,
            Err(e) => {
                warn!(content_key, error = %e, "download interrupted");
                return Ok(None);
            }
        };

        self.serializer(kind).deserialize(&data).map(Some)
    }

    /// Delete the blob a push of `value` as `kind` would have written
    pub fn remove_trace(
        &self,
        value: &Value,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> Result<RestResponse> {
        let checksum = self.compute_checksum(kind, value)?;
        let mut filter = attrs.clone();
        filter.extend(dedup_query(&checksum, kind));
        Ok(self.transport.delete_blob(&filter))
    }

    /// Delete every blob matching `attrs`
    pub fn remove_by_params(&self, attrs: &Attributes) -> RestResponse {
        self.transport.delete_blob(attrs)
    }

    /// Look up the head manifest record for `query`
    pub fn manifest_pull(&self, query: &Attributes) -> ManifestLookup {
        let response = self.transport.manifest_query(query);
        if response.status != StatusCode::OK.as_u16() {
            return ManifestLookup::Failed(response.to_response());
        }
        match response.data.into_iter().next() {
            Some(record) => ManifestLookup::Found(record),
            None => ManifestLookup::NotFound,
        }
    }
}

impl std::fmt::Debug for CloudPassage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudPassage")
            .field("algorithm", &self.engine.algorithm())
            .field("drivers", &self.drivers)
            .finish_non_exhaustive()
    }
}

/// Checksum and kind tag: the identity of a stored payload
fn dedup_query(checksum: &Checksum, kind: SerializationKind) -> Attributes {
    Attributes::from([
        (CHECKSUM_KEY.to_string(), checksum.to_string()),
        (META_DATA_KEY.to_string(), kind.tag().to_string()),
    ])
}

fn default_uri() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    format!("Computation@{:.6}", now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::ChunkStream;
    use crate::transport::{ManifestResponse, MockTransport};
    use crate::Error;

    fn passage() -> (Arc<MockTransport>, CloudPassage) {
        let mock = Arc::new(MockTransport::default());
        let passage = CloudPassage::new(mock.clone()).unwrap();
        (mock, passage)
    }

    fn sample() -> Value {
        (0..10).map(|i| (i, i)).collect()
    }

    #[test]
    fn test_push_twice_updates() {
        let (mock, passage) = passage();
        let value = sample();

        let first = passage
            .push(&value, SerializationKind::Binary, &Attributes::new())
            .unwrap();
        assert_eq!(first.status, 201);

        let second = passage
            .push(&value, SerializationKind::Binary, &Attributes::new())
            .unwrap();
        assert_eq!(second.status, 200);

        let calls = mock.calls();
        assert_eq!(calls.uploads, 1);
        assert_eq!(calls.updates, 1);
        assert_eq!(mock.records().len(), 1);
    }

    #[test]
    fn test_same_value_different_kind_is_new_blob() {
        let (mock, passage) = passage();
        let value: Value = vec![("a", 1)].into_iter().collect();

        passage
            .push(&value, SerializationKind::Binary, &Attributes::new())
            .unwrap();
        passage
            .push(&value, SerializationKind::Text, &Attributes::new())
            .unwrap();
        assert_eq!(mock.calls().uploads, 2);
    }

    #[test]
    fn test_default_uri_only_when_missing() {
        let (mock, passage) = passage();
        passage
            .push(&Value::from(1), SerializationKind::Binary, &Attributes::new())
            .unwrap();
        let mut attrs = Attributes::new();
        attrs.insert(URI_KEY.to_string(), "mine".to_string());
        passage
            .push(&Value::from(2), SerializationKind::Binary, &attrs)
            .unwrap();

        let records = mock.records();
        assert!(records[0]
            .field(URI_KEY)
            .unwrap()
            .starts_with("Computation@"));
        assert_eq!(records[1].field(URI_KEY).as_deref(), Some("mine"));
    }

    #[test]
    fn test_manifest_lookup_states() {
        let (_mock, passage) = passage();
        assert_eq!(passage.manifest_pull(&Attributes::new()), ManifestLookup::NotFound);
        assert_eq!(passage.manifest_pull(&Attributes::new()).status(), 404);

        passage
            .push(&sample(), SerializationKind::Text, &Attributes::new())
            .unwrap();
        let lookup = passage.manifest_pull(&Attributes::new());
        assert_eq!(lookup.status(), 200);
        assert_eq!(lookup.record().unwrap().kind(), Some(SerializationKind::Text));

        let failing = CloudPassage::new(Arc::new(MockTransport::failing("down"))).unwrap();
        let lookup = failing.manifest_pull(&Attributes::new());
        assert_eq!(lookup.status(), 500);
    }

    /// Answers manifest queries with a fixed 400; everything else hits `store`
    struct RejectingManifest {
        store: MockTransport,
    }

    impl BlobTransport for RejectingManifest {
        fn checksum_algorithm(&self) -> &str {
            self.store.checksum_algorithm()
        }

        fn manifest_query(&self, _filter: &Attributes) -> ManifestResponse {
            ManifestResponse {
                status: StatusCode::BAD_REQUEST.as_u16(),
                data: Vec::new(),
                reason: Some("bad query".into()),
            }
        }

        fn upload_stream(
            &self,
            stream: BlobStream,
            checksum: &Checksum,
            kind: SerializationKind,
            attrs: &Attributes,
        ) -> RestResponse {
            self.store.upload_stream(stream, checksum, kind, attrs)
        }

        fn update_stream(
            &self,
            stream: BlobStream,
            content_key: &str,
            checksum: &Checksum,
            kind: SerializationKind,
            attrs: &Attributes,
        ) -> RestResponse {
            self.store
                .update_stream(stream, content_key, checksum, kind, attrs)
        }

        fn download_stream(&self, content_key: &str) -> Option<ChunkStream> {
            self.store.download_stream(content_key)
        }

        fn delete_blob(&self, filter: &Attributes) -> RestResponse {
            self.store.delete_blob(filter)
        }
    }

    #[test]
    fn test_failed_lookup_falls_through_to_upload() {
        let stub = Arc::new(RejectingManifest {
            store: MockTransport::default(),
        });
        let passage = CloudPassage::new(stub.clone()).unwrap();

        for _ in 0..2 {
            let response = passage
                .push(&sample(), SerializationKind::Binary, &Attributes::new())
                .unwrap();
            assert_eq!(response.status, 201);
        }
        let calls = stub.store.calls();
        assert_eq!(calls.uploads, 2);
        assert_eq!(calls.updates, 0);
    }

    #[test]
    fn test_failed_lookup_upload_failure_is_returned() {
        let mock = Arc::new(MockTransport::failing("connection refused"));
        let passage = CloudPassage::new(mock.clone()).unwrap();

        let response = passage
            .push(&sample(), SerializationKind::Binary, &Attributes::new())
            .unwrap();
        assert!(response.is_server_error());
        assert_eq!(response.reason.as_deref(), Some("connection refused"));
        assert_eq!(mock.calls().uploads, 1);
    }

    #[test]
    fn test_failed_lookup_pulls_nothing() {
        let stub = Arc::new(RejectingManifest {
            store: MockTransport::default(),
        });
        let passage = CloudPassage::new(stub.clone()).unwrap();
        passage
            .push(&sample(), SerializationKind::Binary, &Attributes::new())
            .unwrap();

        assert_eq!(passage.pull(&Attributes::new()).unwrap(), None);
        assert_eq!(stub.store.calls().downloads, 0);
    }

    #[test]
    fn test_remove_trace_uses_recomputed_checksum() {
        let (mock, passage) = passage();
        let keep: Value = "keep".into();
        let drop: Value = "drop".into();
        passage
            .push(&keep, SerializationKind::Text, &Attributes::new())
            .unwrap();
        passage
            .push(&drop, SerializationKind::Text, &Attributes::new())
            .unwrap();

        let response = passage
            .remove_trace(&drop, SerializationKind::Text, &Attributes::new())
            .unwrap();
        assert!(response.is_success());

        let remaining = mock.records();
        assert_eq!(remaining.len(), 1);
        let expected = passage
            .compute_checksum(SerializationKind::Text, &keep)
            .unwrap();
        assert_eq!(remaining[0].checksum(), Some(expected.as_str()));
    }

    #[test]
    fn test_unknown_record_tag_pulls_nothing() {
        let (mock, passage) = passage();
        mock.insert(
            ManifestRecord {
                content: Some("documents/legacy".into()),
                meta_data: Some("pickle".into()),
                ..Default::default()
            },
            vec![1, 2, 3],
        );
        assert_eq!(passage.pull(&Attributes::new()).unwrap(), None);
        assert_eq!(mock.calls().downloads, 0);
    }

    #[test]
    fn test_unknown_algorithm_fails_construction() {
        let mock = Arc::new(MockTransport::new("not-a-real-algo"));
        assert!(matches!(
            CloudPassage::new(mock),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_driver_cache_reuses_pairs() {
        let created = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&created);
        let cache = DriverCache::new(move |_, _| {
            *counter.lock() += 1;
            Ok(Arc::new(MockTransport::default()) as Arc<dyn BlobTransport>)
        });

        let a = cache.get_or_create("http://10.0.0.1", "8000").unwrap();
        let b = cache.get_or_create("http://10.0.0.1", "8000").unwrap();
        let c = cache.get_or_create("http://10.0.0.1", "9000").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*created.lock(), 2);

        // Blank host and port normalize to the defaults
        cache.get_or_create("", "").unwrap();
        cache.get_or_create("http://127.0.0.1", "8000").unwrap();
        assert_eq!(*created.lock(), 3);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_rest_cache_propagates_unknown_algorithm() {
        let template = DriverConfig::default().with_checksum_algorithm("not-a-real-algo");
        let cache = DriverCache::rest(template);
        assert!(matches!(
            cache.get_or_create("", ""),
            Err(Error::UnknownAlgorithm(_))
        ));
        assert!(cache.is_empty());
    }
}
