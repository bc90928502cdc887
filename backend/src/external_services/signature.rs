//! Token signing used by the T-Bank (Tinkoff) acquiring API.
//!
//! A token is the SHA-256 of the values of every top-level scalar field of a
//! request, concatenated in the order of their sorted field names. The
//! terminal password takes part in the hash under the `Password` field but is
//! never transmitted.

use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};

use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::secret::Secret;

/// Reserved field the terminal password is hashed under.
pub const PASSWORD_FIELD: &str = "Password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Flag(bool),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(text) => f.write_str(text),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Flag(true) => f.write_str("true"),
            FieldValue::Flag(false) => f.write_str("false"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

/// Scalar fields of one request, kept sorted by field name.
///
/// `String` ordering is byte-wise, which is exactly the ordinal, case-sensitive
/// order the gateway sorts by.
#[derive(Clone, Default, PartialEq)]
pub struct SignablePayload {
    fields: BTreeMap<String, FieldValue>,
}

impl SignablePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.fields.insert(name.to_string(), value.into())
    }

    /// Inserts the field only when a value is present. Absent optional fields
    /// must not contribute anything to the canonical string.
    pub fn insert_optional<V: Into<FieldValue>>(&mut self, name: &str, value: Option<V>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn canonical_string(&self) -> String {
        self.fields.values().map(ToString::to_string).collect()
    }
}

impl Debug for SignablePayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in &self.fields {
            if name == PASSWORD_FIELD {
                map.entry(name, &"****");
            } else {
                map.entry(name, value);
            }
        }
        map.finish()
    }
}

/// Lowercase hex SHA-256 token, 64 characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signs a payload that already carries every signed field, the password included.
pub fn sign(fields: &SignablePayload) -> Signature {
    let digest = Sha256::digest(fields.canonical_string().as_bytes());

    Signature(hex::encode(digest))
}

/// Recomputes the token over `fields` and compares it with `claimed`.
pub fn verify(fields: &SignablePayload, claimed: &str) -> bool {
    constant_time_eq(sign(fields).as_str().as_bytes(), claimed.as_bytes())
}

pub(crate) fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    left.iter()
        .zip(right)
        .fold(0u8, |acc, (l, r)| acc | (l ^ r))
        == 0
}

/// Outgoing request that carries its own token.
pub trait SignedRequest {
    /// Scalar fields of the request, without the password and without nested objects.
    fn signable_fields(&self) -> SignablePayload;

    fn set_token(&mut self, token: Signature);
}

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
    #[error("Terminal key must not be empty")]
    EmptyTerminalKey,

    #[error("Terminal password must not be empty")]
    EmptyPassword,
}

/// Terminal credentials and the signing operations bound to them.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    terminal_key: String,
    password: Secret<String>,
}

impl TokenCodec {
    pub fn new(terminal_key: impl Into<String>, password: Secret<String>) -> Result<Self, CodecError> {
        let terminal_key = terminal_key.into();

        if terminal_key.trim().is_empty() {
            return Err(CodecError::EmptyTerminalKey);
        }
        if password.reveal().is_empty() {
            return Err(CodecError::EmptyPassword);
        }

        Ok(Self {
            terminal_key,
            password,
        })
    }

    pub fn terminal_key(&self) -> &str {
        &self.terminal_key
    }

    /// Adds the password, signs, and drops the password-bearing payload.
    pub fn token_for(&self, mut fields: SignablePayload) -> Signature {
        fields.insert(PASSWORD_FIELD, self.password.reveal().as_str());
        let token = sign(&fields);
        fields.remove(PASSWORD_FIELD);

        token
    }

    pub fn check(&self, mut fields: SignablePayload, claimed: &str) -> bool {
        fields.insert(PASSWORD_FIELD, self.password.reveal().as_str());

        verify(&fields, claimed)
    }

    pub fn seal<R: SignedRequest>(&self, mut request: R) -> R {
        let token = self.token_for(request.signable_fields());
        request.set_token(token);

        request
    }
}
