//! Pluggable serialization for cross-process state.
//!
//! The coordination cores persist opaque blobs (cache values, breaker
//! states) through a [`Serializer`]. The [`FlexibleSerializer`] adds a
//! registry of named [`Transformer`]s that can rewrite the JSON tree on the
//! way in and out, which is how non-self-describing types (durations,
//! domain errors, user classes) survive a trip through a backend.

use crate::time::TimeSpan;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SerdeError {
    #[error("serialization failed")]
    Serialization(#[source] Arc<dyn std::error::Error + Send + Sync>),
    #[error("deserialization failed")]
    Deserialization(#[source] Arc<dyn std::error::Error + Send + Sync>),
}

impl SerdeError {
    pub fn serialization(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Serialization(Arc::new(cause))
    }

    pub fn deserialization(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Deserialization(Arc::new(cause))
    }
}

/// Byte-level serializer used at adapter boundaries.
pub trait Serializer: Send + Sync {
    fn serialize_value(&self, value: &Value) -> Result<Vec<u8>, SerdeError>;
    fn deserialize_value(&self, bytes: &[u8]) -> Result<Value, SerdeError>;
}

/// Typed convenience over [`Serializer`].
pub trait SerializerExt: Serializer {
    fn serialize<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, SerdeError> {
        let value = serde_json::to_value(value).map_err(SerdeError::serialization)?;
        self.serialize_value(&value)
    }

    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, SerdeError> {
        let value = self.deserialize_value(bytes)?;
        serde_json::from_value(value).map_err(SerdeError::deserialization)
    }
}

impl<S: Serializer + ?Sized> SerializerExt for S {}

/// Plain JSON serializer.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize_value(&self, value: &Value) -> Result<Vec<u8>, SerdeError> {
        serde_json::to_vec(value).map_err(SerdeError::serialization)
    }

    fn deserialize_value(&self, bytes: &[u8]) -> Result<Value, SerdeError> {
        serde_json::from_slice(bytes).map_err(SerdeError::deserialization)
    }
}

/// Named rewrite applied around JSON serialization.
///
/// `serialize` runs when `is_applicable` accepts the outgoing value; the
/// result is wrapped in a `{"$transformer": name, "value": …}` envelope so
/// `deserialize` knows to undo it on the way back.
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;
    fn is_applicable(&self, value: &Value) -> bool;
    fn serialize(&self, value: Value) -> Result<Value, SerdeError>;
    fn deserialize(&self, value: Value) -> Result<Value, SerdeError>;
}

const TRANSFORMER_TAG: &str = "$transformer";

/// JSON serializer with a transformer registry.
#[derive(Clone, Default)]
pub struct FlexibleSerializer {
    inner: JsonSerializer,
    transformers: Vec<Arc<dyn Transformer>>,
}

impl FlexibleSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transformer. Registering a name twice is a no-op.
    pub fn register(mut self, transformer: impl Transformer + 'static) -> Self {
        if !self.transformers.iter().any(|t| t.name() == transformer.name()) {
            self.transformers.push(Arc::new(transformer));
        }
        self
    }

    fn encode(&self, value: Value) -> Result<Value, SerdeError> {
        for transformer in &self.transformers {
            if transformer.is_applicable(&value) {
                let inner = transformer.serialize(value)?;
                return Ok(json!({ TRANSFORMER_TAG: transformer.name(), "value": inner }));
            }
        }
        Ok(value)
    }

    fn decode(&self, value: Value) -> Result<Value, SerdeError> {
        let Some(name) = value.get(TRANSFORMER_TAG).and_then(Value::as_str) else {
            return Ok(value);
        };
        let name = name.to_string();
        let Some(transformer) = self.transformers.iter().find(|t| t.name() == name) else {
            return Err(SerdeError::deserialization(UnknownTransformer { name }));
        };
        let inner = value.get("value").cloned().unwrap_or(Value::Null);
        transformer.deserialize(inner)
    }
}

#[derive(Debug, Error)]
#[error("no transformer registered under {name:?}")]
struct UnknownTransformer {
    name: String,
}

impl Serializer for FlexibleSerializer {
    fn serialize_value(&self, value: &Value) -> Result<Vec<u8>, SerdeError> {
        let encoded = self.encode(value.clone())?;
        self.inner.serialize_value(&encoded)
    }

    fn deserialize_value(&self, bytes: &[u8]) -> Result<Value, SerdeError> {
        let value = self.inner.deserialize_value(bytes)?;
        self.decode(value)
    }
}

/// Round-trips [`TimeSpan`] values as tagged millisecond counts.
///
/// `TimeSpan` serializes as `{"millis": n}`; the transformer collapses that
/// to a bare count inside the envelope and rebuilds it on the way out.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeSpanTransformer;

impl Transformer for TimeSpanTransformer {
    fn name(&self) -> &str {
        "TimeSpan"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        match value.as_object() {
            Some(fields) => fields.len() == 1 && fields.get("millis").is_some_and(Value::is_i64),
            None => false,
        }
    }

    fn serialize(&self, value: Value) -> Result<Value, SerdeError> {
        Ok(value.get("millis").cloned().unwrap_or(Value::Null))
    }

    fn deserialize(&self, value: Value) -> Result<Value, SerdeError> {
        let millis = value
            .as_i64()
            .ok_or_else(|| SerdeError::deserialization(BadPayload("TimeSpan millis")))?;
        serde_json::to_value(TimeSpan::from_millis(millis)).map_err(SerdeError::deserialization)
    }
}

/// Portable representation of an error crossing a process boundary.
///
/// Known classes round-trip by `name`; anything unknown degrades to this
/// shape and still carries its message and cause chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct ErrorEnvelope {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorEnvelope {
    pub fn capture(name: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            name: name.into(),
            message: error.to_string(),
            cause: error.source().map(|cause| cause.to_string()),
        }
    }
}

#[derive(Debug, Error)]
#[error("unexpected payload for {0}")]
struct BadPayload(&'static str);
