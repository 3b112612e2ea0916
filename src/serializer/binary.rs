//! Binary codec: bincode over the full value graph

use crate::model::Value;
use crate::Result;

/// Encodes any [`Value`], including non-string map keys and byte strings
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinaryCodec;

impl BinaryCodec {
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(bincode::serialize(value)?)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        Ok(bincode::deserialize(data)?)
    }
}
