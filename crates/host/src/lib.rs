//! Wiring for the keystone host process.
//!
//! [`build`] assembles the bus and the stock consumers; the caller runs
//! [`Host::start`] before any producer publishes.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use keystone_consumers::{
    ActivityFeed, AuditCollector, NotificationStore, StartupInitializer, StartupStatus,
};
use keystone_core::{ContextKind, InMemoryTenantContext, TenantId};
use keystone_events::{DispatchReport, EventBus, EventBusConfig, PartialDomainEvent, PublishError};

pub const ENV_TENANT_ID: &str = "KEYSTONE_TENANT_ID";
pub const DEFAULT_TENANT_ID: &str = "demo-tenant";

pub struct Host {
    pub context: Arc<InMemoryTenantContext>,
    pub bus: Arc<EventBus>,
    pub audit: Arc<AuditCollector>,
    pub feed: Arc<ActivityFeed>,
    pub notifications: Arc<NotificationStore>,
    pub startup: StartupInitializer,
}

pub fn build(config: EventBusConfig, tenant_id: TenantId) -> Host {
    let context = Arc::new(InMemoryTenantContext::for_tenant(tenant_id, ContextKind::Organization));
    let bus = Arc::new(EventBus::with_config(context.clone(), config));

    let audit = Arc::new(AuditCollector::new());
    let feed = Arc::new(ActivityFeed::new());
    let notifications = Arc::new(NotificationStore::new());

    let startup = StartupInitializer::new(bus.clone(), audit.clone())
        .with_consumer(feed.clone())
        .with_consumer(notifications.clone());

    Host {
        context,
        bus,
        audit,
        feed,
        notifications,
        startup,
    }
}

impl Host {
    pub async fn start(&self) -> StartupStatus {
        let status = self.startup.initialize().await;
        if let StartupStatus::Degraded(reason) = &status {
            warn!(reason = %reason, "starting with degraded event consumers");
        }
        status
    }
}

/// A short session of domain activity for the current tenant.
pub fn sample_events() -> Vec<PartialDomainEvent> {
    vec![
        PartialDomainEvent::new("user.login", json!({"userId": "u-1"})),
        PartialDomainEvent::new("project.created", json!({"project": {"name": "Warehouse"}, "userId": "u-1"}))
            .with_aggregate("project", "p-1"),
        PartialDomainEvent::new(
            "task.assigned",
            json!({"task": {"title": "Count stock", "assigneeId": "u-2"}, "userId": "u-1"}),
        )
        .with_aggregate("task", "t-1")
        .with_correlation_id("session-1"),
        PartialDomainEvent::new("user.logout", json!({"userId": "u-1"})),
    ]
}

pub async fn publish_samples(bus: &EventBus) -> Result<Vec<DispatchReport>, PublishError> {
    let reports = bus.publish_batch(sample_events()).await?;
    for report in &reports {
        info!(
            event_type = %report.event_type,
            event_id = %report.event_id,
            handlers = report.handler_count(),
            failures = report.failures().count(),
            "event dispatched"
        );
    }
    Ok(reports)
}
