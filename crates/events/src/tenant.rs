//! Tenant enforcement for inbound events.
//!
//! Every event accepted by the bus either carries a valid tenant id or is
//! explicitly marked cross-tenant. The middleware is fail-closed: anything it
//! cannot attribute to a tenant is rejected before any handler runs.
//!
//! Decision table, evaluated in order:
//!
//! 1. `allow_cross_tenant` set: pass through unchanged (superadmin bypass).
//! 2. `tenant_id` set: validate its format, pass through unchanged.
//! 3. otherwise: copy the ambient tenant from [`TenantContext`], or reject.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use keystone_core::{TenantContext, TenantId, TenantIdError, validate_tenant_id};

use crate::event::PartialDomainEvent;

/// The tenant rule an event violated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantRule {
    #[error("{0}")]
    InvalidFormat(TenantIdError),

    #[error("event has no tenant id and no tenant context is available (context: {context})")]
    MissingContext { context: String },
}

/// An event was rejected for missing or invalid tenant identity.
///
/// Carries enough of the offending event to identify it in logs and to the
/// publisher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("tenant validation failed for {event_type:?}: {rule}")]
pub struct TenantValidationError {
    pub event_type: String,
    pub event_id: Option<String>,
    pub aggregate_id: Option<String>,
    pub producer: String,
    pub tenant_id: Option<String>,
    pub rule: TenantRule,
}

impl TenantValidationError {
    fn new<T>(event: &PartialDomainEvent<T>, rule: TenantRule) -> Self {
        Self {
            event_type: event.event_type.clone(),
            event_id: event.event_id.clone(),
            aggregate_id: event.aggregate_id.clone(),
            producer: event.metadata.source.clone(),
            tenant_id: event.metadata.tenant_id.clone(),
            rule,
        }
    }
}

/// Validates or injects tenant identity before the bus accepts an event.
#[derive(Clone)]
pub struct TenantValidationMiddleware {
    context: Arc<dyn TenantContext>,
}

impl TenantValidationMiddleware {
    pub fn new(context: Arc<dyn TenantContext>) -> Self {
        Self { context }
    }

    pub fn validate_and_enrich<T>(
        &self,
        mut event: PartialDomainEvent<T>,
    ) -> Result<PartialDomainEvent<T>, TenantValidationError> {
        if event.metadata.allow_cross_tenant {
            if !self.context.is_super_admin() {
                warn!(
                    event_type = %event.event_type,
                    source = %event.metadata.source,
                    "cross-tenant event published outside a superadmin context"
                );
            }
            return Ok(event);
        }

        if let Some(tenant_id) = event.metadata.tenant_id.as_deref() {
            if let Err(violation) = validate_tenant_id(tenant_id) {
                let err = TenantValidationError::new(&event, TenantRule::InvalidFormat(violation));
                warn!(event_type = %err.event_type, error = %err.rule, "event rejected: invalid tenant id");
                return Err(err);
            }
            return Ok(event);
        }

        match self.context.ensure_tenant_id() {
            Ok(tenant_id) => {
                debug!(
                    event_type = %event.event_type,
                    tenant_id = %tenant_id,
                    "tenant id injected from context"
                );
                event.metadata.tenant_id = Some(tenant_id.into_string());
                Ok(event)
            }
            Err(_) => {
                let context = self
                    .context
                    .context_type()
                    .map(|kind| kind.to_string())
                    .unwrap_or_else(|| "none".to_string());
                let err = TenantValidationError::new(&event, TenantRule::MissingContext { context });
                warn!(event_type = %err.event_type, error = %err.rule, "event rejected: no tenant");
                Err(err)
            }
        }
    }

    /// Validate every event; the whole batch fails if any single event fails.
    pub fn validate_and_enrich_batch<T>(
        &self,
        events: Vec<PartialDomainEvent<T>>,
    ) -> Result<Vec<PartialDomainEvent<T>>, TenantValidationError> {
        events
            .into_iter()
            .map(|event| self.validate_and_enrich(event))
            .collect()
    }

    pub fn is_super_admin(&self) -> bool {
        self.context.is_super_admin()
    }

    pub fn get_current_tenant_id(&self) -> Option<TenantId> {
        self.context.current_tenant_id()
    }

    pub fn has_tenant_context(&self) -> bool {
        self.context.has_tenant_context()
    }
}

impl core::fmt::Debug for TenantValidationMiddleware {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TenantValidationMiddleware")
            .field("has_tenant_context", &self.context.has_tenant_context())
            .finish_non_exhaustive()
    }
}
