//! Cache key generation and canonicalization.
//!
//! A key is `<namespace>:<sha256 of the canonical parameter text>`. The
//! canonical text sorts object keys at every depth and drops null members,
//! so parameter insertion order never changes the key. Non-finite floats
//! have no JSON form and are rejected.

use std::fmt::{self, Write};

use serde::ser::{
    self, SerializeMap, SerializeSeq, SerializeStruct, SerializeStructVariant, SerializeTuple,
    SerializeTupleStruct, SerializeTupleVariant, Serializer,
};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{MarketError, Result};

/// A canonical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(String);

impl QueryKey {
    /// Returns the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the namespace part of the key.
    pub fn namespace(&self) -> &str {
        self.0
            .rsplit_once(':')
            .map(|(namespace, _)| namespace)
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for QueryKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derives a key from a namespace and a mapping of parameters.
///
/// `params` must serialize to a JSON object (or to nothing at all, which
/// is treated as an empty mapping). Values that fail to serialize, and
/// non-mapping parameters, are rejected with `InvalidKeyInput`.
///
/// # Examples
///
/// ```
/// use market_cache::cache::generate_key;
/// use serde_json::json;
///
/// let a = generate_key("listings", &json!({"category": "tools", "page": 2})).unwrap();
/// let b = generate_key("listings", &json!({"page": 2, "category": "tools"})).unwrap();
/// assert_eq!(a, b);
/// ```
pub fn generate_key<P>(namespace: &str, params: &P) -> Result<QueryKey>
where
    P: Serialize + ?Sized,
{
    if namespace.trim().is_empty() {
        return Err(MarketError::InvalidKeyInput(
            "namespace cannot be empty".to_string(),
        ));
    }

    let canonical = canonicalize(params)?;
    let digest = Sha256::digest(canonical.as_bytes());

    let mut key = String::with_capacity(namespace.len() + 1 + digest.len() * 2);
    key.push_str(namespace);
    key.push(':');
    for byte in digest.iter() {
        // Writing to a String cannot fail
        let _ = write!(key, "{:02x}", byte);
    }

    Ok(QueryKey(key))
}

/// Produces the canonical textual form of a parameter mapping.
pub fn canonicalize<P>(params: &P) -> Result<String>
where
    P: Serialize + ?Sized,
{
    // serde_json writes NaN and infinities as null, which would collide with absent members
    params
        .serialize(FiniteCheck)
        .map_err(|e| MarketError::InvalidKeyInput(e.to_string()))?;

    let value = serde_json::to_value(params)
        .map_err(|e| MarketError::InvalidKeyInput(e.to_string()))?;

    match &value {
        Value::Object(_) => {}
        Value::Null => return Ok("{}".to_string()),
        other => {
            return Err(MarketError::InvalidKeyInput(format!(
                "parameters must be a mapping, got {}",
                value_kind(other)
            )))
        }
    }

    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<(&String, &Value)> =
                map.iter().filter(|(_, v)| !v.is_null()).collect();
            members.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
        // Array positions are significant, nulls stay
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// == Finite Check ==
/// Walks a value without producing output, failing on the first non-finite float.
#[derive(Clone, Copy)]
struct FiniteCheck;

type CheckResult = std::result::Result<(), serde_json::Error>;

fn check_float(v: f64) -> CheckResult {
    if v.is_finite() {
        Ok(())
    } else {
        Err(ser::Error::custom(format!(
            "non-finite number {} cannot be part of a key",
            v
        )))
    }
}

impl Serializer for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> CheckResult {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> CheckResult {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> CheckResult {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> CheckResult {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> CheckResult {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> CheckResult {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> CheckResult {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> CheckResult {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> CheckResult {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> CheckResult {
        check_float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> CheckResult {
        check_float(v)
    }
    fn serialize_char(self, _: char) -> CheckResult {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> CheckResult {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> CheckResult {
        Ok(())
    }
    fn serialize_none(self) -> CheckResult {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> CheckResult {
        value.serialize(self)
    }
    fn serialize_unit(self) -> CheckResult {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> CheckResult {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> CheckResult {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, Self::Error> {
        Ok(self)
    }
}

impl SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> CheckResult {
        key.serialize(FiniteCheck)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> CheckResult {
        value.serialize(FiniteCheck)
    }
    fn end(self) -> CheckResult {
        Ok(())
    }
}

// == Key Generator ==
/// Key generator bound to the configured application prefix.
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
}

impl KeyGenerator {
    /// Creates a generator; an empty prefix leaves namespaces untouched.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Derives a key under `<prefix>:<namespace>`.
    pub fn generate<P>(&self, namespace: &str, params: &P) -> Result<QueryKey>
    where
        P: Serialize + ?Sized,
    {
        if self.prefix.is_empty() {
            generate_key(namespace, params)
        } else {
            generate_key(&format!("{}:{}", self.prefix, namespace), params)
        }
    }
}

impl Default for KeyGenerator {
    fn default() -> Self {
        Self::new("")
    }
}
