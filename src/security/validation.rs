//! Write-payload validation and sanitization.
//!
//! Required fields must be JSON strings with `1 <= len < 256` characters.
//! Accepted values have `<` and `>` stripped. This only guarantees those two
//! characters are gone; it is not a general-purpose encoder.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

/// Exclusive upper bound on field length, in characters.
pub const MAX_FIELD_LEN: usize = 256;

/// Fields required on note writes.
pub const NOTE_FIELDS: &[&str] = &["title", "body"];

/// A payload that failed validation, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ValidationError {
    pub reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn missing_or_wrong_type() -> Self {
        Self::new("missing or wrong type")
    }

    pub fn length_out_of_bounds() -> Self {
        Self::new("length out of bounds")
    }
}

/// Sanitized values of the required fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedPayload {
    fields: BTreeMap<String, String>,
}

impl ValidatedPayload {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Take a field out of the payload.
    pub fn take(&mut self, field: &str) -> Option<String> {
        self.fields.remove(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Check `payload` against `required` and return the sanitized fields.
///
/// Every field is type-checked before any length check runs, so a payload
/// with both problems reports the type problem.
pub fn validate(payload: &Value, required: &[&str]) -> Result<ValidatedPayload, ValidationError> {
    let values = required
        .iter()
        .map(|field| {
            payload
                .get(field)
                .and_then(Value::as_str)
                .map(|v| (*field, v))
                .ok_or_else(ValidationError::missing_or_wrong_type)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut fields = BTreeMap::new();
    for (field, value) in values {
        let len = value.chars().count();
        if len < 1 || len >= MAX_FIELD_LEN {
            return Err(ValidationError::length_out_of_bounds());
        }
        fields.insert(field.to_string(), sanitize(value));
    }

    Ok(ValidatedPayload { fields })
}

/// Parse a raw request body and validate it.
pub fn validate_body(body: &[u8], required: &[&str]) -> Result<ValidatedPayload, ValidationError> {
    let payload: Value =
        serde_json::from_slice(body).map_err(|_| ValidationError::missing_or_wrong_type())?;
    validate(&payload, required)
}

/// Remove every `<` and `>`.
pub fn sanitize(value: &str) -> String {
    value.chars().filter(|c| !matches!(c, '<' | '>')).collect()
}
