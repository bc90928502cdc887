pub mod signature;
pub mod telegram;
pub mod tinkoff;

use serde::{de, Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

fn boolean<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Deserialize::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s == "true",
        Value::Number(num) => num.as_i64().ok_or(de::Error::custom("Invalid number"))? != 0,
        Value::Null => false,
        _ => return Err(de::Error::custom("Wrong type, expected boolean")),
    })
}

/// The gateway sends identifiers such as `PaymentId` either as JSON numbers or strings.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Deserialize::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(num) => Ok(num.to_string()),
        _ => Err(de::Error::custom("Wrong type, expected string or number")),
    }
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Deserialize::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(num) => Ok(Some(num.to_string())),
        _ => Err(de::Error::custom("Wrong type, expected string or number")),
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Can't connect to gateway: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unsupported response code: {code}: {body}")]
    WrongStatusCode { code: u16, body: String },

    #[error("Can't deserialize response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Tinkoff Error: {message} {details}")]
    Rejected {
        code: Option<String>,
        message: String,
        details: String,
    },

    #[error("Missing field: {field:?} in {operation:?} response")]
    FieldMissing {
        field: &'static str,
        operation: &'static str,
    },
}
