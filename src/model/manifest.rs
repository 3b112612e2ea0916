//! Manifest records and the kind tag that couples push to pull

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Caller-supplied attributes and query filters
pub type Attributes = BTreeMap<String, String>;

/// Attribute carrying the content checksum
pub const CHECKSUM_KEY: &str = "checkSum";
/// Attribute carrying the kind tag
pub const META_DATA_KEY: &str = "metaData";
/// Attribute carrying a caller-visible resource identifier
pub const URI_KEY: &str = "uri";
/// Attribute carrying the server-side content key
pub const CONTENT_KEY: &str = "content";
/// Attribute carrying the checksum algorithm name
pub const CHECKSUM_ALGO_KEY: &str = "checkSumAlgoName";

/// Which serializer produced a stored payload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationKind {
    Binary,
    Text,
}

impl SerializationKind {
    /// The tag recorded server-side under `metaData`
    pub fn tag(&self) -> &'static str {
        match self {
            SerializationKind::Binary => "binary",
            SerializationKind::Text => "text",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "binary" => Some(SerializationKind::Binary),
            "text" => Some(SerializationKind::Text),
            _ => None,
        }
    }
}

impl FromStr for SerializationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        SerializationKind::from_tag(s)
            .ok_or_else(|| crate::Error::Config(format!("Unknown serialization kind: {}", s)))
    }
}

impl fmt::Display for SerializationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Server-held metadata describing one stored blob
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Storage location on the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Recorded kind tag
    #[serde(rename = "metaData", default, skip_serializing_if = "Option::is_none")]
    pub meta_data: Option<String>,
    /// Every other field the server returned
    #[serde(flatten)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

impl ManifestRecord {
    /// The recorded kind, if the tag is one we know
    pub fn kind(&self) -> Option<SerializationKind> {
        self.meta_data.as_deref().and_then(SerializationKind::from_tag)
    }

    pub fn checksum(&self) -> Option<&str> {
        self.attrs.get(CHECKSUM_KEY).and_then(|v| v.as_str())
    }

    /// Read any field as text, including `content` and `metaData`
    pub fn field(&self, key: &str) -> Option<String> {
        match key {
            CONTENT_KEY => self.content.clone(),
            META_DATA_KEY => self.meta_data.clone(),
            _ => self.attrs.get(key).map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            }),
        }
    }

    /// Whether every filter attribute equals the record's field
    pub fn matches(&self, filter: &Attributes) -> bool {
        filter
            .iter()
            .all(|(key, expected)| self.field(key).as_deref() == Some(expected.as_str()))
    }
}
