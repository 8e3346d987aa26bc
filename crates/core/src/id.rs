//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a raw string is not an acceptable tenant identifier.
///
/// Variants are ordered the way they are checked: emptiness first, then
/// whitespace, then the allowed alphabet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TenantIdError {
    #[error("tenant id must not be empty")]
    Empty,

    #[error("tenant id must not contain whitespace")]
    Whitespace,

    #[error("tenant id may only contain letters, digits, '_' and '-'")]
    InvalidCharacters,
}

/// Identifier of a tenant (multi-tenant boundary).
///
/// A tenant is any isolation boundary an event can belong to: a user, an
/// organization, a team, a partner or a bot. The id is an opaque string
/// matching `^[A-Za-z0-9_-]+$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Validate and wrap a raw tenant identifier.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TenantIdError> {
        let raw = raw.into();
        validate_tenant_id(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Check a raw tenant id without allocating a `TenantId`.
pub fn validate_tenant_id(raw: &str) -> Result<(), TenantIdError> {
    if raw.trim().is_empty() {
        return Err(TenantIdError::Empty);
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(TenantIdError::Whitespace);
    }
    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(TenantIdError::InvalidCharacters);
    }
    Ok(())
}

impl core::fmt::Display for TenantId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantId {
    type Err = TenantIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = TenantIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantId> for String {
    fn from(value: TenantId) -> Self {
        value.0
    }
}
