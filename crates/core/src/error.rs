//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Tenant-id format problems are reported as [`crate::TenantIdError`]; this
/// type covers missing execution context. Dispatch and transport concerns
/// belong to the events crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The current execution has no tenant to act within.
    #[error("no tenant context (context: {context})")]
    MissingTenant { context: String },
}

impl DomainError {
    pub fn missing_tenant(context: impl Into<String>) -> Self {
        Self::MissingTenant {
            context: context.into(),
        }
    }
}
