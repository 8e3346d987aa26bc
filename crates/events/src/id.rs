//! Event identifier generation.
//!
//! Three strategies are supported:
//! - `Uuid` (default): random UUID v4, not time-ordered
//! - `Ulid`: 26-character Crockford Base32, millisecond timestamp prefix,
//!   sorts lexicographically in creation order
//! - `Custom`: a caller-supplied function
//!
//! Validation helpers check format only; they say nothing about uniqueness.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;
use uuid::Uuid;

/// Largest timestamp a ULID can carry (48 bits of milliseconds).
pub const MAX_ULID_TIMESTAMP: u64 = (1 << 48) - 1;

const ULID_LEN: usize = 26;
const CROCKFORD_ALPHABET: &str = "0123456789ABCDEFGHJKMNPQRSTVWXYZ";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdGeneratorError {
    #[error("custom id strategy selected but no generator function configured")]
    NotConfigured,

    #[error("timestamp {0} ms does not fit in a ULID")]
    TimestampOutOfRange(u64),

    #[error("timestamp {0} ms is before the Unix epoch and cannot stamp an id")]
    TimestampBeforeEpoch(i64),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Uuid,
    Ulid,
    Custom,
}

impl core::str::FromStr for IdStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uuid" => Ok(IdStrategy::Uuid),
            "ulid" => Ok(IdStrategy::Ulid),
            "custom" => Ok(IdStrategy::Custom),
            other => Err(format!("unknown id strategy: {other}")),
        }
    }
}

/// Caller-supplied id function. Receives the requested timestamp (if any).
pub type CustomIdFn = Arc<dyn Fn(Option<u64>) -> String + Send + Sync>;

/// Produces unique event identifiers under a configurable strategy.
#[derive(Clone, Default)]
pub struct EventIdGenerator {
    strategy: IdStrategy,
    custom: Option<CustomIdFn>,
}

impl EventIdGenerator {
    pub fn new(strategy: IdStrategy) -> Self {
        Self {
            strategy,
            custom: None,
        }
    }

    /// Use `f` for every generated id (switches the strategy to `Custom`).
    pub fn with_custom<F>(f: F) -> Self
    where
        F: Fn(Option<u64>) -> String + Send + Sync + 'static,
    {
        Self {
            strategy: IdStrategy::Custom,
            custom: Some(Arc::new(f)),
        }
    }

    pub fn strategy(&self) -> IdStrategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: IdStrategy) {
        self.strategy = strategy;
    }

    /// Generate an id for "now".
    pub fn generate(&self) -> Result<String, IdGeneratorError> {
        match self.strategy {
            IdStrategy::Uuid => Ok(generate_uuid()),
            IdStrategy::Ulid => generate_ulid(now_millis()),
            IdStrategy::Custom => self.custom_id(None),
        }
    }

    /// Generate an id stamped with `timestamp_ms`.
    ///
    /// UUIDs carry no timestamp, so the argument only matters for `Ulid` and
    /// `Custom`.
    pub fn generate_at(&self, timestamp_ms: u64) -> Result<String, IdGeneratorError> {
        match self.strategy {
            IdStrategy::Uuid => Ok(generate_uuid()),
            IdStrategy::Ulid => generate_ulid(timestamp_ms),
            IdStrategy::Custom => self.custom_id(Some(timestamp_ms)),
        }
    }

    fn custom_id(&self, timestamp_ms: Option<u64>) -> Result<String, IdGeneratorError> {
        let f = self.custom.as_ref().ok_or(IdGeneratorError::NotConfigured)?;
        Ok(f(timestamp_ms))
    }
}

impl core::fmt::Debug for EventIdGenerator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventIdGenerator")
            .field("strategy", &self.strategy)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

/// Random RFC 4122 version 4 UUID, hyphenated lower-case.
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// ULID whose first 10 characters encode `timestamp_ms`.
pub fn generate_ulid(timestamp_ms: u64) -> Result<String, IdGeneratorError> {
    if timestamp_ms > MAX_ULID_TIMESTAMP {
        return Err(IdGeneratorError::TimestampOutOfRange(timestamp_ms));
    }
    let at = UNIX_EPOCH + Duration::from_millis(timestamp_ms);
    Ok(Ulid::from_datetime(at).to_string())
}

/// Hyphenated RFC 4122 UUID (versions 1-8), any letter case.
pub fn is_valid_uuid(id: &str) -> bool {
    if id.len() != 36 {
        return false;
    }
    match Uuid::try_parse(id) {
        Ok(uuid) => {
            matches!(uuid.get_version_num(), 1..=8)
                && uuid.get_variant() == uuid::Variant::RFC4122
        }
        Err(_) => false,
    }
}

/// 26 upper-case Crockford Base32 characters (no I, L, O, U), timestamp
/// within 48 bits.
pub fn is_valid_ulid(id: &str) -> bool {
    id.len() == ULID_LEN
        && id.chars().all(|c| CROCKFORD_ALPHABET.contains(c))
        && id.starts_with(|c: char| ('0'..='7').contains(&c))
}

/// Millisecond timestamp encoded in a ULID, or `None` when `id` is not one.
pub fn extract_timestamp_from_ulid(id: &str) -> Option<u64> {
    if !is_valid_ulid(id) {
        return None;
    }
    Ulid::from_string(id).ok().map(|u| u.timestamp_ms())
}

fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}
