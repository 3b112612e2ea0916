//! Text codec: JSON
//!
//! Only JSON-representable values survive. Map keys that are not strings are
//! coerced to their text form on the way out (`1` becomes `"1"`), so a value
//! with integer keys comes back with string keys. Float keys use the shortest
//! round-trip digits, switching to exponent form (`1e+16`, `1e-05`) outside
//! `[1e-4, 1e16)`. Callers rely on this wire
//! format; it is kept as is.

use crate::model::Value;
use crate::{Error, Result};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextCodec;

impl TextCodec {
    /// Serialize to JSON text. Object keys come out sorted.
    pub fn encode(&self, value: &Value) -> Result<String> {
        Ok(serde_json::to_string(&to_json(value)?)?)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::Decoding(format!("text payload is not UTF-8: {}", e)))?;
        let json: serde_json::Value = serde_json::from_str(text)?;
        Ok(from_json(json))
    }
}

/// Convert a value into JSON, coercing scalar map keys to strings
pub fn to_json(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::Encoding(format!("non-finite float {}", f)))?,
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(_) => {
            return Err(Error::Encoding("byte strings have no text form".into()));
        }
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json).collect::<Result<Vec<_>>>()?)
        }
        Value::Map(map) => {
            let mut object = serde_json::Map::new();
            for (key, val) in map {
                object.insert(key_text(key)?, to_json(val)?);
            }
            serde_json::Value::Object(object)
        }
    })
}

fn key_text(key: &Value) -> Result<String> {
    match key {
        Value::Str(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) if f.is_finite() => Ok(float_key_text(*f)),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("null".to_string()),
        other => Err(Error::Encoding(format!(
            "{} keys are not allowed in text maps",
            other.kind_name()
        ))),
    }
}

fn float_key_text(f: f64) -> String {
    // `{:e}` gives the shortest round-trip digits, e.g. "-1.2325e2"
    let sci = format!("{:e}", f);
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let (sign, mantissa) = match mantissa.strip_prefix('-') {
        Some(m) => ("-", m),
        None => ("", mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..16).contains(&exp) {
        let (head, tail) = digits.split_at(1);
        let point = if tail.is_empty() { "" } else { "." };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{head}{point}{tail}e{exp_sign}{:02}", exp.abs());
    }

    let body = if exp < 0 {
        format!("0.{}{}", "0".repeat((-exp - 1) as usize), digits)
    } else {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            format!("{}{}.0", digits, "0".repeat(int_len - digits.len()))
        } else {
            let (int, frac) = digits.split_at(int_len);
            format!("{}.{}", int, frac)
        }
    };
    format!("{}{}", sign, body)
}

/// Convert parsed JSON back into a value
pub fn from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::Str(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(object) => Value::Map(
            object
                .into_iter()
                .map(|(k, v)| (Value::Str(k), from_json(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}
