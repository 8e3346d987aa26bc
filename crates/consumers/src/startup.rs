//! One-shot registration of the consumers with the bus.
//!
//! The host runs [`StartupInitializer::initialize`] before any producer
//! publishes. A consumer that fails to register is logged and leaves the
//! process in [`StartupStatus::Degraded`]; the remaining consumers are still
//! registered and startup never aborts the host.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{error, info};

use keystone_events::{Consumer, ConsumerRegistration, EventBus, RegistrationError, register_consumer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupStatus {
    Pending,
    Ready,
    Degraded(String),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("consumer {group:?} failed to register: {source}")]
    Registration {
        group: String,
        #[source]
        source: RegistrationError,
    },
}

#[derive(Debug)]
struct StartupState {
    status: StartupStatus,
    registrations: Vec<ConsumerRegistration>,
    errors: Vec<StartupError>,
}

pub struct StartupInitializer {
    bus: Arc<EventBus>,
    consumers: Vec<Arc<dyn Consumer>>,
    state: OnceCell<StartupState>,
}

impl StartupInitializer {
    /// The audit consumer is registered first so it observes every event.
    pub fn new(bus: Arc<EventBus>, audit: Arc<dyn Consumer>) -> Self {
        Self {
            bus,
            consumers: vec![audit],
            state: OnceCell::new(),
        }
    }

    pub fn with_consumer(mut self, consumer: Arc<dyn Consumer>) -> Self {
        self.consumers.push(consumer);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Register every consumer, in order. Runs once; later calls return the
    /// stored status.
    pub async fn initialize(&self) -> StartupStatus {
        self.state
            .get_or_init(|| async { self.register_all() })
            .await
            .status
            .clone()
    }

    fn register_all(&self) -> StartupState {
        let mut registrations = Vec::with_capacity(self.consumers.len());
        let mut errors = Vec::new();

        for consumer in &self.consumers {
            let group = consumer.group().to_string();
            match register_consumer(&self.bus, consumer.clone()) {
                Ok(registration) => registrations.push(registration),
                Err(source) => {
                    let err = StartupError::Registration { group, source };
                    error!(error = %err, "consumer registration failed during startup");
                    errors.push(err);
                }
            }
        }

        let status = if errors.is_empty() {
            info!(
                consumers = registrations.len(),
                subscriptions = self.bus.subscription_count(),
                "event consumers initialized"
            );
            StartupStatus::Ready
        } else {
            let reason = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            error!(failed = errors.len(), reason = %reason, "event consumers degraded");
            StartupStatus::Degraded(reason)
        };

        StartupState {
            status,
            registrations,
            errors,
        }
    }

    pub fn status(&self) -> StartupStatus {
        self.state
            .get()
            .map(|s| s.status.clone())
            .unwrap_or(StartupStatus::Pending)
    }

    pub fn is_ready(&self) -> bool {
        self.status() == StartupStatus::Ready
    }

    /// Successful registrations, in consumer order. Empty before initialization.
    pub fn registrations(&self) -> &[ConsumerRegistration] {
        self.state
            .get()
            .map(|s| s.registrations.as_slice())
            .unwrap_or(&[])
    }

    pub fn errors(&self) -> &[StartupError] {
        self.state.get().map(|s| s.errors.as_slice()).unwrap_or(&[])
    }
}

impl core::fmt::Debug for StartupInitializer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let groups: Vec<&str> = self.consumers.iter().map(|c| c.group()).collect();
        f.debug_struct("StartupInitializer")
            .field("consumers", &groups)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone_core::{ContextKind, InMemoryTenantContext, TenantId};
    use keystone_events::{DomainEvent, HandlerError, HandlerSpec};

    use crate::{ActivityFeed, AuditCollector, DEFAULT_AUDIT_DEPTH};

    struct Broken;

    impl Consumer for Broken {
        fn group(&self) -> &str {
            "broken"
        }

        fn handlers(self: Arc<Self>) -> Vec<HandlerSpec> {
            let noop = |_: Arc<DomainEvent>| async { Ok::<(), HandlerError>(()) };
            vec![
                HandlerSpec::new("fine", "task.created", noop),
                HandlerSpec::new("bad", "task..x", noop),
            ]
        }
    }

    fn bus() -> Arc<EventBus> {
        let tenant = TenantId::parse("acme").unwrap();
        Arc::new(EventBus::new(Arc::new(InMemoryTenantContext::for_tenant(
            tenant,
            ContextKind::Organization,
        ))))
    }

    #[tokio::test]
    async fn registers_audit_first_and_reports_ready() {
        let bus = bus();
        let startup = StartupInitializer::new(bus.clone(), Arc::new(AuditCollector::new()))
            .with_consumer(Arc::new(ActivityFeed::new()));

        assert_eq!(startup.status(), StartupStatus::Pending);
        assert_eq!(startup.initialize().await, StartupStatus::Ready);
        assert!(startup.is_ready());

        let groups: Vec<&str> = startup.registrations().iter().map(|r| r.group()).collect();
        assert_eq!(groups, vec!["audit", "activity-feed"]);
        assert_eq!(bus.subscription_count(), DEFAULT_AUDIT_DEPTH + 4);
    }

    #[tokio::test]
    async fn initialize_runs_once() {
        let bus = bus();
        let startup = StartupInitializer::new(bus.clone(), Arc::new(AuditCollector::new()));

        startup.initialize().await;
        let count = bus.subscription_count();
        assert_eq!(startup.initialize().await, StartupStatus::Ready);
        assert_eq!(bus.subscription_count(), count);
    }

    #[tokio::test]
    async fn failing_consumer_degrades_without_aborting() {
        let bus = bus();
        let startup = StartupInitializer::new(bus.clone(), Arc::new(AuditCollector::new()))
            .with_consumer(Arc::new(Broken))
            .with_consumer(Arc::new(ActivityFeed::new()));

        let status = startup.initialize().await;
        let StartupStatus::Degraded(reason) = status else {
            panic!("expected degraded, got {status:?}");
        };
        assert!(reason.contains("broken"), "{reason}");
        assert!(!startup.is_ready());
        assert_eq!(startup.errors().len(), 1);

        // audit and activity feed registered; the broken consumer rolled back
        assert_eq!(startup.registrations().len(), 2);
        assert_eq!(bus.subscription_count(), DEFAULT_AUDIT_DEPTH + 4);
        assert!(bus.subscriptions().iter().all(|s| s.group != "broken"));
    }
}
