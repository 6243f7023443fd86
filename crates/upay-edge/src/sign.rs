//! Canonical request signing.
//!
//! A message is signed by sorting its field names, joining `name=value` pairs
//! with `&`, appending the shared secret with no separator, and hashing the
//! result with SHA-256. The digest travels as lowercase hex in the `sign`
//! field, which never takes part in its own computation.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::constants::SIGNATURE_FIELD;
use crate::error::SignError;
use crate::security::constant_time_eq;

/// A scalar field value with a fixed textual rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Unsigned(u64),
    /// Rendered the way the processor prints numbers: shortest round-trip
    /// digits (`1.23`, `1.0` as `1`), exponent form below `1e-6` or from
    /// `1e21` up (`1e-7`, `1e+21`), and `-0` as `0`.
    Float(f64),
    Bool(bool),
}

impl FieldValue {
    /// Convert a JSON value, rejecting `null`, arrays and objects.
    pub fn from_json(name: &str, value: &Value) -> Result<Self, SignError> {
        match value {
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Integer(i))
                } else if let Some(u) = n.as_u64() {
                    Ok(FieldValue::Unsigned(u))
                } else {
                    n.as_f64()
                        .map(FieldValue::Float)
                        .ok_or_else(|| SignError::NonScalarField(name.to_string()))
                }
            }
            Value::Null | Value::Array(_) | Value::Object(_) => {
                Err(SignError::NonScalarField(name.to_string()))
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Unsigned(u) => write!(f, "{u}"),
            FieldValue::Float(x) => write_float(f, *x),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x == 0.0 {
        return f.write_str("0");
    }
    if x.is_nan() {
        return f.write_str("NaN");
    }
    if x.is_infinite() {
        return f.write_str(if x > 0.0 { "Infinity" } else { "-Infinity" });
    }

    let scientific = format!("{x:e}");
    let Some((mantissa, exp)) = scientific
        .split_once('e')
        .and_then(|(m, e)| Some((m, e.parse::<i32>().ok()?)))
    else {
        return write!(f, "{x}");
    };
    match exp {
        -6..=20 => write!(f, "{x}"),
        e if e > 0 => write!(f, "{mantissa}e+{e}"),
        e => write!(f, "{mantissa}e{e}"),
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<u32> for FieldValue {
    fn from(u: u32) -> Self {
        FieldValue::Integer(i64::from(u))
    }
}

impl From<u64> for FieldValue {
    fn from(u: u64) -> Self {
        FieldValue::Unsigned(u)
    }
}

impl From<f64> for FieldValue {
    fn from(x: f64) -> Self {
        FieldValue::Float(x)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// Flat field set to be signed. Keys are kept in byte order, so insertion
/// order never affects the canonical string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignableMessage {
    fields: BTreeMap<String, FieldValue>,
}

impl SignableMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.fields.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    /// Take the `sign` field out of the set.
    ///
    /// Returns `None` when it is absent or not a string; such a message can
    /// never verify.
    pub fn remove_signature(&mut self) -> Option<String> {
        match self.fields.remove(SIGNATURE_FIELD)? {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Build from a decoded JSON object. Every member must be a scalar.
    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self, SignError> {
        object
            .iter()
            .map(|(name, value)| Ok((name.clone(), FieldValue::from_json(name, value)?)))
            .collect()
    }
}

impl FromIterator<(String, FieldValue)> for SignableMessage {
    fn from_iter<I: IntoIterator<Item = (String, FieldValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

/// `k1=v1&k2=v2...` over the sorted fields, without the secret.
fn base_string(fields: &SignableMessage) -> String {
    let mut out = String::new();
    for (i, (name, value)) in fields.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        let _ = write!(out, "{name}={value}");
    }
    out
}

/// The exact string that gets hashed: sorted `name=value` pairs joined by `&`,
/// followed directly by the secret.
///
/// Values are not escaped. A value containing `&` or `=` can make two
/// different field sets render identically; the processor hashes the same
/// unescaped form, so this must stay byte-compatible with it.
pub fn canonical_string(fields: &SignableMessage, secret: &str) -> String {
    let mut out = base_string(fields);
    out.push_str(secret);
    out
}

/// SHA-256 over the canonical string, as 64 lowercase hex characters.
///
/// Callers strip any existing `sign` field first.
pub fn sign(fields: &SignableMessage, secret: &str) -> String {
    tracing::trace!(base = %base_string(fields), "signing base string");
    let digest = Sha256::digest(canonical_string(fields, secret).as_bytes());
    hex::encode(digest)
}

/// Recompute the digest and compare it with `claimed` byte for byte.
///
/// Hex case matters. The comparison is constant-time.
pub fn verify(fields: &SignableMessage, claimed: &str, secret: &str) -> bool {
    let expected = sign(fields, secret);
    constant_time_eq(expected.as_bytes(), claimed.as_bytes())
}

/// A typed message that carries its own digest in a `sign` field.
pub trait SignedMessage {
    /// All fields except the signature.
    fn signable(&self) -> SignableMessage;

    fn signature(&self) -> Option<&str>;

    fn set_signature(&mut self, signature: String);

    /// Compute the digest over [`signable`](Self::signable) and store it.
    fn sign_with(&mut self, secret: &str) {
        let digest = sign(&self.signable(), secret);
        self.set_signature(digest);
    }

    fn verify_with(&self, secret: &str) -> bool {
        match self.signature() {
            Some(claimed) => verify(&self.signable(), claimed, secret),
            None => false,
        }
    }
}

pub(crate) mod hex {
    use std::fmt::Write;

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().fold(String::new(), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }
}
