//! The domain event model.
//!
//! Events are facts: once the bus has completed an event (id + timestamp) it is
//! handed to consumers behind shared references and never mutated again.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::version::EventVersion;

const DEFAULT_SOURCE: &str = "app";

fn is_false(value: &bool) -> bool {
    !*value
}

/// Metadata carried by every event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Schema version of the payload.
    pub version: EventVersion,
    /// Producer that emitted the event (module or service name).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,
    /// Raw tenant id. Validated by the tenant middleware, not on construction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Superadmin bypass: skip tenant validation entirely.
    #[serde(default, skip_serializing_if = "is_false")]
    pub allow_cross_tenant: bool,
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self {
            version: EventVersion::INITIAL,
            source: DEFAULT_SOURCE.to_string(),
            correlation_id: None,
            causation_id: None,
            tenant_id: None,
            allow_cross_tenant: false,
        }
    }
}

/// A published domain event.
///
/// `event_type` is a dot-delimited topic (`"task.created"`): the first segment
/// names the aggregate family, the rest name the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent<T = JsonValue> {
    event_id: String,
    event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aggregate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aggregate_type: Option<String>,
    payload: T,
    timestamp: DateTime<Utc>,
    metadata: EventMetadata,
}

impl<T> DomainEvent<T> {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn aggregate_id(&self) -> Option<&str> {
        self.aggregate_id.as_deref()
    }

    pub fn aggregate_type(&self) -> Option<&str> {
        self.aggregate_type.as_deref()
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.metadata.tenant_id.as_deref()
    }
}

impl<T: Serialize> DomainEvent<T> {
    /// JSON wire form (camelCase keys, ISO-8601 timestamp).
    pub fn to_json(&self) -> Result<JsonValue, serde_json::Error> {
        serde_json::to_value(self)
    }
}

impl DomainEvent<JsonValue> {
    /// Deserialize the payload into a concrete type.
    pub fn payload_as<U: DeserializeOwned>(&self) -> Result<U, serde_json::Error> {
        U::deserialize(&self.payload)
    }

    /// Look up a string at a JSON pointer inside the payload
    /// (e.g. `"/task/title"`).
    pub fn payload_str(&self, pointer: &str) -> Option<&str> {
        self.payload.pointer(pointer).and_then(JsonValue::as_str)
    }
}

/// An event as built by a producer: id and timestamp may still be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialDomainEvent<T = JsonValue> {
    pub event_id: Option<String>,
    pub event_type: String,
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    pub payload: T,
    pub timestamp: Option<DateTime<Utc>>,
    pub metadata: EventMetadata,
}

impl<T> PartialDomainEvent<T> {
    pub fn new(event_type: impl Into<String>, payload: T) -> Self {
        Self {
            event_id: None,
            event_type: event_type.into(),
            aggregate_id: None,
            aggregate_type: None,
            payload,
            timestamp: None,
            metadata: EventMetadata::default(),
        }
    }

    pub fn with_aggregate(
        mut self,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
    ) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self.aggregate_id = Some(aggregate_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }

    pub fn with_version(mut self, version: EventVersion) -> Self {
        self.metadata.version = version;
        self
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.metadata.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.metadata.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.metadata.causation_id = Some(causation_id.into());
        self
    }

    /// Mark the event as a legitimate cross-tenant operation.
    pub fn allow_cross_tenant(mut self) -> Self {
        self.metadata.allow_cross_tenant = true;
        self
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Fill in identity and freeze the event.
    ///
    /// Values already set by the producer win over the supplied defaults.
    pub fn complete(self, event_id: String, timestamp: DateTime<Utc>) -> DomainEvent<T> {
        DomainEvent {
            event_id: self.event_id.unwrap_or(event_id),
            event_type: self.event_type,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            payload: self.payload,
            timestamp: self.timestamp.unwrap_or(timestamp),
            metadata: self.metadata,
        }
    }
}

impl<T: Serialize> PartialDomainEvent<T> {
    /// Convert a typed payload into the JSON payload the bus dispatches.
    pub fn into_json(self) -> Result<PartialDomainEvent<JsonValue>, serde_json::Error> {
        Ok(PartialDomainEvent {
            event_id: self.event_id,
            event_type: self.event_type,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            payload: serde_json::to_value(self.payload)?,
            timestamp: self.timestamp,
            metadata: self.metadata,
        })
    }
}
