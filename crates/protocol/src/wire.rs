//! JSON wire form of a request: `{"type": "<kind>", "payload": {...}}`.
//!
//! Request enums decode themselves from an [`Envelope`]; every shape problem
//! becomes an [`InputError`] instead of a missing-property surprise later.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::InputError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    pub fn parse(text: &str) -> Result<Self, InputError> {
        serde_json::from_str(text).map_err(|e| InputError::Malformed(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        // An Envelope is a string and a JSON value; serializing it cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Look up a dotted path such as `sceneData.cubeRotationY`. `null` counts
    /// as absent.
    pub fn field(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(&self.payload, |value, key| value.get(key))
            .filter(|v| !v.is_null())
    }

    /// A number that may be absent.
    pub fn optional_f64(&self, path: &'static str) -> Result<Option<f64>, InputError> {
        match self.field(path) {
            None => Ok(None),
            Some(v) => v.as_f64().map(Some).ok_or_else(|| InputError::InvalidField {
                field: path,
                reason: format!("expected a number, got {v}"),
            }),
        }
    }

    /// A number that must be present.
    pub fn required_f64(&self, path: &'static str) -> Result<f64, InputError> {
        self.optional_f64(path)?
            .ok_or(InputError::MissingField(path))
    }

    pub fn unknown_kind(&self) -> InputError {
        InputError::UnknownKind(self.kind.clone())
    }
}
