//! `keystone-core` — tenant primitives shared by the event bus and its consumers.
//!
//! This crate contains **pure domain** primitives (no dispatch or IO concerns).

pub mod error;
pub mod id;
pub mod tenant;

pub use error::{DomainError, DomainResult};
pub use id::{TenantId, TenantIdError, validate_tenant_id};
pub use tenant::{ContextKind, InMemoryTenantContext, TenantContext};
