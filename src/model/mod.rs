//! Data model for resty

mod checksum;
mod manifest;
mod value;

pub use checksum::{Checksum, ChecksumAlgorithm, ChecksumEngine};
pub use manifest::{
    Attributes, ManifestRecord, SerializationKind, CHECKSUM_ALGO_KEY, CHECKSUM_KEY, CONTENT_KEY,
    META_DATA_KEY, URI_KEY,
};
pub use value::Value;
