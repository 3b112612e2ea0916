//! Value serialization
//!
//! Two codecs sit behind one [`Serializer`] enum, selected by
//! [`SerializationKind`]. Whatever the codec, the checksum is always taken
//! over bytes: [`Serializer::pre_hash`] is the identity for binary payloads
//! and the UTF-8 encoding for text payloads.

mod binary;
mod stream;
mod text;

pub use binary::BinaryCodec;
pub use stream::{BlobStream, ChunkStream, DEFAULT_CHUNK_SIZE};
pub use text::{from_json, to_json, TextCodec};

use crate::model::{Checksum, ChecksumEngine, SerializationKind, Value};
use crate::Result;

/// A serialized value, owned by the operation that produced it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SerializedPayload {
    Binary(Vec<u8>),
    Text(String),
}

impl SerializedPayload {
    pub fn kind(&self) -> SerializationKind {
        match self {
            SerializedPayload::Binary(_) => SerializationKind::Binary,
            SerializedPayload::Text(_) => SerializationKind::Text,
        }
    }

    /// The byte form of the payload
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SerializedPayload::Binary(bytes) => bytes,
            SerializedPayload::Text(text) => text.as_bytes(),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            SerializedPayload::Binary(bytes) => bytes,
            SerializedPayload::Text(text) => text.into_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A codec chosen by kind tag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Serializer {
    Binary(BinaryCodec),
    Text(TextCodec),
}

impl Serializer {
    pub fn for_kind(kind: SerializationKind) -> Self {
        match kind {
            SerializationKind::Binary => Serializer::Binary(BinaryCodec),
            SerializationKind::Text => Serializer::Text(TextCodec),
        }
    }

    pub fn kind(&self) -> SerializationKind {
        match self {
            Serializer::Binary(_) => SerializationKind::Binary,
            Serializer::Text(_) => SerializationKind::Text,
        }
    }

    /// Serialize a value. Text fails with [`Error::Encoding`](crate::Error::Encoding)
    /// for values JSON cannot hold.
    pub fn serialize(&self, value: &Value) -> Result<SerializedPayload> {
        match self {
            Serializer::Binary(codec) => codec.encode(value).map(SerializedPayload::Binary),
            Serializer::Text(codec) => codec.encode(value).map(SerializedPayload::Text),
        }
    }

    /// Rebuild a value from a whole payload
    pub fn deserialize(&self, data: &[u8]) -> Result<Value> {
        match self {
            Serializer::Binary(codec) => codec.decode(data),
            Serializer::Text(codec) => codec.decode(data),
        }
    }

    /// The bytes a checksum is computed over
    pub fn pre_hash<'a>(&self, payload: &'a SerializedPayload) -> &'a [u8] {
        debug_assert_eq!(payload.kind(), self.kind());
        payload.as_bytes()
    }

    /// Serialize and wrap as an upload stream
    pub fn to_byte_stream(&self, value: &Value) -> Result<BlobStream> {
        Ok(BlobStream::new(self.serialize(value)?.into_bytes()))
    }

    /// serialize, pre-hash, digest
    pub fn checksum(&self, value: &Value, engine: &ChecksumEngine) -> Result<Checksum> {
        let payload = self.serialize(value)?;
        Ok(engine.digest(self.pre_hash(&payload)))
    }
}

impl From<SerializationKind> for Serializer {
    fn from(kind: SerializationKind) -> Self {
        Serializer::for_kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Read;

    fn mixed_value() -> Value {
        let mut inner = Value::map();
        inner.insert(1, vec![Value::from(1.5), Value::Null, Value::from(true)]);
        inner.insert("bytes", Value::bytes(vec![0u8, 1, 2, 255]));

        let mut outer = Value::map();
        outer.insert("nested", inner);
        outer.insert(Value::Int(-4), "negative key");
        outer.insert("list", vec![Value::from("a"), Value::map()]);
        outer
    }

    #[test]
    fn test_binary_roundtrip_mixed() {
        let s = Serializer::for_kind(SerializationKind::Binary);
        let value = mixed_value();
        let payload = s.serialize(&value).unwrap();
        assert_eq!(s.deserialize(payload.as_bytes()).unwrap(), value);
    }

    #[test]
    fn test_text_roundtrip_json_safe() {
        let s = Serializer::for_kind(SerializationKind::Text);
        let mut value = Value::map();
        value.insert("name", "blob");
        value.insert("sizes", vec![1, 2, 3]);
        value.insert("ratio", 0.25);
        value.insert("missing", Value::Null);

        let payload = s.serialize(&value).unwrap();
        assert_eq!(payload.kind(), SerializationKind::Text);
        assert_eq!(s.deserialize(payload.as_bytes()).unwrap(), value);
    }

    #[test]
    fn test_text_rejects_bytes() {
        let s = Serializer::for_kind(SerializationKind::Text);
        assert!(matches!(s.serialize(&mixed_value()), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_pre_hash_is_utf8_for_text() {
        let s = Serializer::for_kind(SerializationKind::Text);
        let payload = s.serialize(&Value::from("héllo")).unwrap();
        assert_eq!(s.pre_hash(&payload), "\"héllo\"".as_bytes());
    }

    #[test]
    fn test_checksum_deterministic() {
        let engine = ChecksumEngine::default();
        let value: Value = (0..100).map(|i| (i, i * i)).collect();
        for kind in [SerializationKind::Binary, SerializationKind::Text] {
            let s = Serializer::for_kind(kind);
            let c1 = s.checksum(&value, &engine).unwrap();
            let c2 = s.checksum(&value.clone(), &engine).unwrap();
            assert_eq!(c1, c2);
        }
    }

    #[test]
    fn test_kinds_hash_differently() {
        let engine = ChecksumEngine::default();
        let value = Value::from(vec![1, 2, 3]);
        let binary = Serializer::for_kind(SerializationKind::Binary)
            .checksum(&value, &engine)
            .unwrap();
        let text = Serializer::for_kind(SerializationKind::Text)
            .checksum(&value, &engine)
            .unwrap();
        assert_ne!(binary, text);
    }

    #[test]
    fn test_byte_stream_carries_payload() {
        for kind in [SerializationKind::Binary, SerializationKind::Text] {
            let s = Serializer::from(kind);
            let value = Value::from(vec!["x", "y"]);
            let mut stream = s.to_byte_stream(&value).unwrap();
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf).unwrap();
            assert_eq!(buf, s.serialize(&value).unwrap().into_bytes());
        }
    }
}
