//! Payload normalization for bus messages.
//!
//! Publishers use one of two conventions: a wrapped `{"pattern": .., "data": ..}`
//! object, or the bare value. Decoding tries the wrapped form first and falls
//! back to the bare one.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("payload is neither a {{pattern, data}} envelope nor a bare {expected}")]
    UnrecognizedEnvelope { expected: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Wrapped {
        pattern: Option<serde_json::Value>,
        data: T,
    },
    Bare(T),
}

#[derive(Deserialize)]
struct Wrapped<T> {
    #[serde(default)]
    pattern: Option<serde_json::Value>,
    data: T,
}

impl<T> Envelope<T> {
    pub fn into_data(self) -> T {
        match self {
            Envelope::Wrapped { data, .. } | Envelope::Bare(data) => data,
        }
    }

    pub fn data(&self) -> &T {
        match self {
            Envelope::Wrapped { data, .. } | Envelope::Bare(data) => data,
        }
    }

    fn wrapped(payload: &[u8]) -> Option<Self>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice::<Wrapped<T>>(payload)
            .ok()
            .map(|w| Envelope::Wrapped {
                pattern: w.pattern,
                data: w.data,
            })
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Decode a JSON payload (arrays, objects).
    pub fn decode(payload: &[u8]) -> Result<Self, EnvelopeError> {
        if let Some(envelope) = Self::wrapped(payload) {
            return Ok(envelope);
        }
        serde_json::from_slice::<T>(payload)
            .map(Envelope::Bare)
            .map_err(|_| EnvelopeError::UnrecognizedEnvelope {
                expected: "JSON value",
            })
    }
}

impl Envelope<String> {
    /// Decode a scalar payload. Bare scalars arrive as raw text, though a
    /// JSON string literal is also accepted. JSON objects and arrays that are
    /// not a wrapped string are rejected rather than taken as raw text.
    pub fn decode_text(payload: &[u8]) -> Result<Self, EnvelopeError> {
        const UNRECOGNIZED: EnvelopeError =
            EnvelopeError::UnrecognizedEnvelope { expected: "string" };

        if let Some(envelope) = Self::wrapped(payload) {
            return Ok(envelope);
        }
        match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(serde_json::Value::String(s)) => return Ok(Envelope::Bare(s)),
            Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_)) => {
                return Err(UNRECOGNIZED)
            }
            _ => {}
        }
        match std::str::from_utf8(payload) {
            Ok(s) if !s.is_empty() => Ok(Envelope::Bare(s.to_string())),
            _ => Err(UNRECOGNIZED),
        }
    }
}
