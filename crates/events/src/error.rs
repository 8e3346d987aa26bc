//! Error taxonomy of the event bus.
//!
//! Validation and configuration errors are fail-fast and block the operation
//! that triggered them. Handler errors are isolated: they end up in a
//! [`DispatchReport`](crate::bus::DispatchReport) and never reach the publisher
//! as an `Err`.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::id::IdGeneratorError;
use crate::pattern::PatternError;
use crate::tenant::TenantValidationError;

/// `publish` refused the event before any handler ran.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("tenant rejected: {0}")]
    TenantRejected(#[from] TenantValidationError),

    #[error("event id generation failed: {0}")]
    IdGeneration(#[from] IdGeneratorError),
}

/// Error returned by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Handler execution failed with a message.
    #[error("handler execution failed: {0}")]
    Execution(String),

    /// The payload could not be interpreted.
    #[error("malformed payload: {0}")]
    Payload(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn execution(msg: impl Into<String>) -> Self {
        HandlerError::Execution(msg.into())
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        HandlerError::Payload(msg.into())
    }
}

/// Why a single handler did not succeed during a dispatch.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DispatchFailure {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    TimedOut(#[serde(serialize_with = "millis::serialize")] Duration),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("incompatible version: {0}")]
    Incompatible(String),
}

/// A consumer could not be registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("handler {handler:?} of consumer {group:?}: {source}")]
    InvalidPattern {
        group: String,
        handler: String,
        #[source]
        source: PatternError,
    },
}

mod millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }
}
