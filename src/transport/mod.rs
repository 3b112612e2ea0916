//! Blob transport boundary
//!
//! [`BlobTransport`] is what the push/pull protocol needs from the remote
//! store. Implementations never return transport faults as errors: a failed
//! request becomes a response with a server-error status and a `reason`.

mod mock;
mod rest;

pub use mock::{CallCounts, MockTransport};
pub use rest::RestDriver;

use crate::model::{Attributes, Checksum, ManifestRecord, SerializationKind};
use crate::serializer::{BlobStream, ChunkStream};
use reqwest::StatusCode;
use serde::Serialize;

/// Outcome of one remote call
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RestResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed JSON body, when the server sent one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Failure description, or the raw body when it was not JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RestResponse {
    pub fn new(status: StatusCode, body: Option<serde_json::Value>) -> Self {
        RestResponse {
            status: status.as_u16(),
            body,
            reason: None,
        }
    }

    /// A bare status with no body
    pub fn with_status(status: StatusCode) -> Self {
        RestResponse::new(status, None)
    }

    /// A transport fault folded into a 500 response
    pub fn from_error(reason: impl ToString) -> Self {
        RestResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            body: None,
            reason: Some(reason.to_string()),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub fn is_success(&self) -> bool {
        self.status_code().is_success()
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

/// Raw answer to a manifest query
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestResponse {
    pub status: u16,
    /// Matching records; empty when the call failed
    pub data: Vec<ManifestRecord>,
    pub reason: Option<String>,
}

impl ManifestResponse {
    pub fn ok(data: Vec<ManifestRecord>) -> Self {
        ManifestResponse {
            status: StatusCode::OK.as_u16(),
            data,
            reason: None,
        }
    }

    pub fn from_error(reason: impl ToString) -> Self {
        ManifestResponse {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            data: Vec::new(),
            reason: Some(reason.to_string()),
        }
    }

    /// View as a plain response, for callers that only want status and reason.
    /// Only a 200 carries the records as body.
    pub fn to_response(&self) -> RestResponse {
        let body = if self.status == StatusCode::OK.as_u16() {
            serde_json::to_value(&self.data).ok()
        } else {
            None
        };
        RestResponse {
            status: self.status,
            body,
            reason: self.reason.clone(),
        }
    }
}

/// Fold an HTTP result into a [`RestResponse`]
///
/// The body is kept as JSON when it parses, otherwise the raw text lands in
/// `reason`.
pub(crate) fn parse_response(
    result: reqwest::Result<reqwest::blocking::Response>,
) -> RestResponse {
    let response = match result {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(error = %e, "request failed");
            return RestResponse::from_error(e);
        }
    };

    let status = response.status();
    match response.text() {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(body) => RestResponse::new(status, Some(body)),
            Err(_) => RestResponse {
                status: status.as_u16(),
                body: None,
                reason: Some(text).filter(|t| !t.is_empty()),
            },
        },
        Err(e) => RestResponse {
            status: status.as_u16(),
            body: None,
            reason: Some(e.to_string()),
        },
    }
}

/// Remote blob store operations consumed by the push/pull protocol
///
/// Implementations:
/// - [`RestDriver`] talks HTTP to a restAssured server
/// - [`MockTransport`] keeps everything in memory, for tests
pub trait BlobTransport: Send + Sync {
    /// Name of the checksum algorithm this store expects
    fn checksum_algorithm(&self) -> &str;

    /// Look up manifest records matching every filter attribute
    fn manifest_query(&self, filter: &Attributes) -> ManifestResponse;

    /// Store a new blob
    fn upload_stream(
        &self,
        stream: BlobStream,
        checksum: &Checksum,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> RestResponse;

    /// Replace the blob stored under `content_key`
    fn update_stream(
        &self,
        stream: BlobStream,
        content_key: &str,
        checksum: &Checksum,
        kind: SerializationKind,
        attrs: &Attributes,
    ) -> RestResponse;

    /// Open the blob stored under `content_key`; `None` when the store has no
    /// such blob or the request failed
    fn download_stream(&self, content_key: &str) -> Option<ChunkStream>;

    /// Delete every blob matching the filter
    fn delete_blob(&self, filter: &Attributes) -> RestResponse;
}
