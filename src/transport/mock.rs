//! In-memory transport for testing

use super::{BlobTransport, ManifestResponse, RestResponse};
use crate::model::{
    Attributes, Checksum, ManifestRecord, SerializationKind, CHECKSUM_ALGO_KEY, CHECKSUM_KEY,
};
use crate::serializer::{BlobStream, ChunkStream, DEFAULT_CHUNK_SIZE};
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::io::Cursor;

/// Number of calls made against a [`MockTransport`], per operation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub manifest_queries: usize,
    pub uploads: usize,
    pub updates: usize,
    pub downloads: usize,
    pub deletes: usize,
}

#[derive(Default)]
struct MockState {
    records: Vec<ManifestRecord>,
    blobs: HashMap<String, Vec<u8>>,
    calls: CallCounts,
    next_key: u64,
}

/// A transport that keeps manifest and blobs in memory
///
/// Useful for exercising the push/pull protocol without a server. Every
/// call is counted, and [`MockTransport::failing`] builds one whose every
/// request fails like an unreachable server.
pub struct MockTransport {
    algorithm: String,
    failure: Option<String>,
    state: Mutex<MockState>,
}

impl MockTransport {
    /// Create a mock store expecting the given checksum algorithm
    pub fn new(algorithm: impl Into<String>) -> Self {
        MockTransport {
            algorithm: algorithm.into(),
            failure: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// A store where every request fails with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        MockTransport {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    pub fn records(&self) -> Vec<ManifestRecord> {
        self.state.lock().records.clone()
    }

    /// Raw stored bytes for a content key
    pub fn blob(&self, content_key: &str) -> Option<Vec<u8>> {
        self.state.lock().blobs.get(content_key).cloned()
    }

    /// Seed a record and its blob directly, bypassing upload
    pub fn insert(&self, record: ManifestRecord, data: Vec<u8>) {
        let mut state = self.state.lock();
        if let Some(key) = record.content.clone() {
            state.blobs.insert(key, data);
        }
        state.records.push(record);
    }

    /// Drop a blob while keeping its manifest record
    pub fn evict_blob(&self, content_key: &str) -> bool {
        self.state.lock().blobs.remove(content_key).is_some()
    }

    fn record_for(
        content_key: &str,
        checksum: &Checksum,
        kind: SerializationKind,
        algorithm: &str,
        attrs: &Attributes,
    ) -> ManifestRecord {
        let mut record = ManifestRecord {
            content: Some(content_key.to_string()),
            meta_data: Some(kind.tag().to_string()),
            ..Default::default()
        };
        for (key, value) in attrs {
            record
                .attrs
                .insert(key.clone(), serde_json::Value::String(value.clone()));
        }
        record.attrs.insert(
            CHECKSUM_KEY.to_string(),
            serde_json::Value::String(checksum.to_string()),
        );
        record
            .attrs
            .entry(CHECKSUM_ALGO_KEY.to_string())
            .or_insert_with(|| serde_json::Value::String(algorithm.to_string()));
        record
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new("sha1")
    }
}

impl BlobTransport for MockTransport {
    fn checksum_algorithm(&self) -> &str {
        &self.algorithm
    }

    fn manifest_query(&self, filter: &Attributes) -> ManifestResponse {
        let mut state = self.state.lock();
        state.calls.manifest_queries += 1;
        if let Some(reason) = &self.failure {
            return ManifestResponse::from_error(reason);
        }

        ManifestResponse::ok(
            state
                .records
                .iter()
                .filter(|r| r.matches(filter))
                .cloned()
                .collect(),
        )
    }

    fn upload_stream(
        &self,
        stream: BlobStream,
        checksum: &Checksum,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> RestResponse {
        let mut state = self.state.lock();
        state.calls.uploads += 1;
        if let Some(reason) = &self.failure {
            return RestResponse::from_error(reason);
        }

        state.next_key += 1;
        let content_key = format!("documents/blob-{}", state.next_key);
        let record = Self::record_for(&content_key, checksum, kind, &self.algorithm, attrs);
        let body = serde_json::to_value(&record).ok();

        state.blobs.insert(content_key, stream.into_inner());
        state.records.push(record);
        RestResponse::new(StatusCode::CREATED, body)
    }

    fn update_stream(
        &self,
        stream: BlobStream,
        content_key: &str,
        checksum: &Checksum,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> RestResponse {
        let mut state = self.state.lock();
        state.calls.updates += 1;
        if let Some(reason) = &self.failure {
            return RestResponse::from_error(reason);
        }

        let Some(index) = state
            .records
            .iter()
            .position(|r| r.content.as_deref() == Some(content_key))
        else {
            return RestResponse::with_status(StatusCode::NOT_FOUND);
        };

        let updated = Self::record_for(content_key, checksum, kind, &self.algorithm, attrs);
        let record = &mut state.records[index];
        record.meta_data = updated.meta_data;
        record.attrs.extend(updated.attrs);
        let body = serde_json::to_value(&*record).ok();

        state
            .blobs
            .insert(content_key.to_string(), stream.into_inner());
        RestResponse::new(StatusCode::OK, body)
    }

    fn download_stream(&self, content_key: &str) -> Option<ChunkStream> {
        let mut state = self.state.lock();
        state.calls.downloads += 1;
        if self.failure.is_some() {
            return None;
        }

        let data = state.blobs.get(content_key)?.clone();
        Some(ChunkStream::from_reader(Cursor::new(data), DEFAULT_CHUNK_SIZE))
    }

    fn delete_blob(&self, filter: &Attributes) -> RestResponse {
        let mut state = self.state.lock();
        state.calls.deletes += 1;
        if let Some(reason) = &self.failure {
            return RestResponse::from_error(reason);
        }

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut state.records)
            .into_iter()
            .partition(|r| r.matches(filter));
        state.records = kept;
        for record in &removed {
            if let Some(key) = &record.content {
                state.blobs.remove(key);
            }
        }

        RestResponse::new(
            StatusCode::OK,
            Some(serde_json::json!({ "deleted": removed.len() })),
        )
    }
}
