//! Ambient tenant context (read-only collaborator of the event bus).
//!
//! The host decides where the current tenant comes from (a JWT claim, a CLI
//! flag, a worker's pinned tenant...). The bus only ever reads it through the
//! [`TenantContext`] trait and never mutates it.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::TenantId;

/// What kind of boundary the current tenant represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    User,
    Organization,
    Team,
    Partner,
    Bot,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextKind::User => "user",
            ContextKind::Organization => "organization",
            ContextKind::Team => "team",
            ContextKind::Partner => "partner",
            ContextKind::Bot => "bot",
        }
    }
}

impl core::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supplies the tenant identity of the current execution.
///
/// Implementations must be cheap to query; the bus calls them once per
/// published event.
pub trait TenantContext: Send + Sync {
    /// Tenant the current execution acts within, if any.
    fn current_tenant_id(&self) -> Option<TenantId>;

    /// Kind of the current context, if any.
    fn context_type(&self) -> Option<ContextKind>;

    /// Whether the current principal may operate across tenants.
    fn is_super_admin(&self) -> bool;

    fn has_tenant_context(&self) -> bool {
        self.current_tenant_id().is_some()
    }

    /// Like [`TenantContext::current_tenant_id`], but fails when absent.
    fn ensure_tenant_id(&self) -> DomainResult<TenantId> {
        self.current_tenant_id().ok_or_else(|| {
            DomainError::missing_tenant(
                self.context_type()
                    .map(ContextKind::as_str)
                    .unwrap_or("none"),
            )
        })
    }
}

impl<C> TenantContext for Arc<C>
where
    C: TenantContext + ?Sized,
{
    fn current_tenant_id(&self) -> Option<TenantId> {
        (**self).current_tenant_id()
    }

    fn context_type(&self) -> Option<ContextKind> {
        (**self).context_type()
    }

    fn is_super_admin(&self) -> bool {
        (**self).is_super_admin()
    }

    fn has_tenant_context(&self) -> bool {
        (**self).has_tenant_context()
    }

    fn ensure_tenant_id(&self) -> DomainResult<TenantId> {
        (**self).ensure_tenant_id()
    }
}

#[derive(Debug, Clone, Default)]
struct ContextState {
    tenant_id: Option<TenantId>,
    kind: Option<ContextKind>,
    super_admin: bool,
}

/// Settable tenant context for hosts, workers and tests.
#[derive(Debug, Default)]
pub struct InMemoryTenantContext {
    state: RwLock<ContextState>,
}

impl InMemoryTenantContext {
    /// A context with no tenant selected.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_tenant(tenant_id: TenantId, kind: ContextKind) -> Self {
        let ctx = Self::new();
        ctx.enter(tenant_id, kind);
        ctx
    }

    /// Switch the current tenant.
    pub fn enter(&self, tenant_id: TenantId, kind: ContextKind) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.tenant_id = Some(tenant_id);
        state.kind = Some(kind);
    }

    /// Leave the current tenant (the superadmin flag is kept).
    pub fn clear(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.tenant_id = None;
        state.kind = None;
    }

    pub fn set_super_admin(&self, super_admin: bool) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.super_admin = super_admin;
    }

    fn snapshot(&self) -> ContextState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TenantContext for InMemoryTenantContext {
    fn current_tenant_id(&self) -> Option<TenantId> {
        self.snapshot().tenant_id
    }

    fn context_type(&self) -> Option<ContextKind> {
        self.snapshot().kind
    }

    fn is_super_admin(&self) -> bool {
        self.snapshot().super_admin
    }
}
