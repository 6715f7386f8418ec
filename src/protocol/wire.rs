// Copyright (c) 2025 Amqp Rpc Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! The JSON-RPC-2.0-compatible wire contract shared by [`super::server`] and
//! [`super::client`].
//!
//! Unlike plain JSON-RPC 2.0, correlation does not live in an `id` field
//! inside the body — it lives in the transport message's `properties`
//! (`replyTo` / `correlationId`), per spec.md §4.1. The body only ever carries
//! `method`/`params` on the way in, and `result`/`error` on the way out.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::protocol::ProtocolError;

/// A 128-bit random identifier, rendered as 32 lowercase hex characters with
/// no delimiters, that ties a response back to its originating request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Correlator(String);

impl Correlator {
    /// Generates a fresh, random correlator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut hex = String::with_capacity(32);
        for byte in bytes {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    /// Borrows the correlator as a plain string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Correlator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Correlator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Method parameters, either positional (an ordered sequence) or named
/// (a mapping from parameter name to value).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Positional arguments, passed in declared parameter order.
    Positional(Vec<Value>),
    /// Named arguments, keyed by declared parameter name.
    Named(Map<String, Value>),
}

impl Params {
    /// Converts these params into a positional list of length `arity`,
    /// assigning `Value::Null` to positions past the supplied length, per
    /// spec.md §4.3 ("converts positional params to a named mapping...
    /// assigning `null` for positions past the supplied length").
    ///
    /// Named params are resolved by looking up each of `param_names` in
    /// order; a name absent from the mapping becomes `Value::Null`.
    pub fn into_positional(self, param_names: &[String]) -> Vec<Value> {
        match self {
            Params::Positional(mut values) => {
                values.resize(param_names.len(), Value::Null);
                values
            }
            Params::Named(map) => param_names
                .iter()
                .map(|name| map.get(name).cloned().unwrap_or(Value::Null))
                .collect(),
        }
    }

    /// Converts these params into a named mapping over `param_names`, used by
    /// the validator adapter, which always validates a named object (§4.3).
    pub fn into_named(self, param_names: &[String]) -> Map<String, Value> {
        match self {
            Params::Named(map) => {
                let mut named = Map::new();
                for name in param_names {
                    named.insert(name.clone(), map.get(name).cloned().unwrap_or(Value::Null));
                }
                named
            }
            Params::Positional(values) => {
                let mut named = Map::new();
                for (idx, name) in param_names.iter().enumerate() {
                    named.insert(name.clone(), values.get(idx).cloned().unwrap_or(Value::Null));
                }
                named
            }
        }
    }
}

/// A single request envelope: `{ method, params? }`. Carried as the body of a
/// request message; a batch is a non-empty, non-nested sequence of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Name of the method to invoke.
    pub method: String,
    /// Positional or named parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl RequestEnvelope {
    /// Creates a request envelope with no parameters.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }
}

/// A decoded request body: either a single request or a non-empty batch.
#[derive(Debug, Clone)]
pub enum DecodedRequest {
    /// A single request object.
    Single(RequestEnvelope),
    /// A non-empty, flat batch of request objects.
    Batch(Vec<RequestEnvelope>),
}

impl DecodedRequest {
    /// Parses a decoded JSON value into a [`DecodedRequest`], distinguishing
    /// single-object from array (batch) form per spec.md §4.2 step 4.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(serde::de::Error::custom(
                        "a batch request must be a non-empty array",
                    ));
                }
                let requests = items
                    .into_iter()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<RequestEnvelope>, _>>()?;
                Ok(DecodedRequest::Batch(requests))
            }
            other => Ok(DecodedRequest::Single(serde_json::from_value(other)?)),
        }
    }
}

/// An error body as it appears inside `ResponseEnvelope::error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    /// Numeric error code (see [`crate::error::protocol::ErrorCode`]).
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Optional structured context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<&ProtocolError> for ErrorBody {
    fn from(error: &ProtocolError) -> Self {
        Self {
            code: error.code(),
            message: error.message().to_string(),
            data: error.data().cloned(),
        }
    }
}

impl From<ProtocolError> for ErrorBody {
    fn from(error: ProtocolError) -> Self {
        Self::from(&error)
    }
}

impl From<ErrorBody> for ProtocolError {
    fn from(body: ErrorBody) -> Self {
        ProtocolError::from_wire(body.code, body.message, body.data)
    }
}

/// A single response envelope: `{ result }` or `{ error }`, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// The successful result, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseEnvelope {
    /// Builds a successful response wrapping `value`, defaulting to `null`
    /// when the handler returned nothing (spec.md §4.1).
    pub fn success(value: Option<Value>) -> Self {
        Self {
            result: Some(value.unwrap_or(Value::Null)),
            error: None,
        }
    }

    /// Builds an error response.
    pub fn failure(error: impl Into<ErrorBody>) -> Self {
        Self {
            result: None,
            error: Some(error.into()),
        }
    }

    /// True if the handler's raw return value should be passed through
    /// verbatim rather than wrapped in `{ result }` — i.e. it is itself an
    /// object carrying a `method` key (spec.md §4.1 pass-through rule).
    pub fn is_forward(value: &Value) -> bool {
        value.as_object().is_some_and(|obj| obj.contains_key("method"))
    }

    /// Returns true if this response is an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn correlator_is_32_lowercase_hex_chars_with_no_delimiters() {
        let correlator = Correlator::generate();
        let s = correlator.as_str();
        assert_eq!(s.len(), 32);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn correlators_are_independent() {
        let a = Correlator::generate();
        let b = Correlator::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn positional_params_pad_missing_tail_with_null() {
        let params = Params::Positional(vec![json!(1), json!("two")]);
        let names = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let positional = params.into_positional(&names);
        assert_eq!(positional, vec![json!(1), json!("two"), Value::Null]);
    }

    #[test]
    fn named_params_reorder_to_declared_order() {
        let mut map = Map::new();
        map.insert("three".to_string(), json!(false));
        map.insert("two".to_string(), json!("two"));
        map.insert("one".to_string(), json!(1));
        let params = Params::Named(map);
        let names = vec!["one".to_string(), "two".to_string(), "three".to_string()];
        let positional = params.into_positional(&names);
        assert_eq!(positional, vec![json!(1), json!("two"), json!(false)]);
    }

    #[test]
    fn forward_detection_requires_a_method_key() {
        assert!(ResponseEnvelope::is_forward(&json!({"method": "sum"})));
        assert!(!ResponseEnvelope::is_forward(&json!({"result": 1})));
        assert!(!ResponseEnvelope::is_forward(&json!([1, 2, 3])));
    }

    #[test]
    fn decodes_single_and_batch_forms() {
        let single = DecodedRequest::from_value(json!({"method": "echo"})).unwrap();
        assert!(matches!(single, DecodedRequest::Single(_)));

        let batch =
            DecodedRequest::from_value(json!([{"method": "a"}, {"method": "b"}])).unwrap();
        match batch {
            DecodedRequest::Batch(items) => assert_eq!(items.len(), 2),
            _ => panic!("expected batch"),
        }
    }

    #[test]
    fn empty_batch_array_is_rejected() {
        let err = DecodedRequest::from_value(json!([])).unwrap_err();
        assert!(err.to_string().contains("non-empty"));
    }

    #[test]
    fn error_body_round_trips_through_protocol_error() {
        let error = ProtocolError::internal("boom", None);
        let body: ErrorBody = error.clone().into();
        let rebuilt: ProtocolError = body.into();
        assert_eq!(rebuilt.code(), error.code());
        assert_eq!(rebuilt.message(), error.message());
    }
}
