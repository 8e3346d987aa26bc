//! The in-process, tenant-aware event bus.
//!
//! The bus routes domain events from producers to pattern-matched handlers.
//!
//! ```text
//! producer ─ publish ─► tenant middleware ─► id/timestamp ─► match ─► order ─► handlers
//!                         (fail-closed)                                         └─ DispatchReport
//! ```
//!
//! ## Delivery model
//!
//! - **In-process only**: no persistence, no cross-process delivery
//! - **Priority order**: matched handlers are started in ascending priority,
//!   ties broken by registration order; completion order is not defined
//! - **Fault isolation**: a failing, panicking or slow handler is recorded in the
//!   report and never prevents other handlers from running
//! - **Bounded**: every handler invocation runs under a timeout
//! - **No ordering between publishes**: concurrent `publish` calls may
//!   interleave, even for the same consumer
//!
//! Handlers must be idempotent-safe where practical; the bus does not
//! deduplicate.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{Instrument, debug, error, info_span, warn};

use keystone_core::TenantContext;

use crate::config::{EventBusConfig, VersionCheck};
use crate::error::{DispatchFailure, PublishError};
use crate::event::{DomainEvent, PartialDomainEvent};
use crate::id::{EventIdGenerator, IdGeneratorError, IdStrategy};
use crate::pattern::{PatternError, TopicPattern};
use crate::subscription::{
    DEFAULT_GROUP, EventHandler, SubscribeOptions, Subscription, SubscriptionHandle,
    SubscriptionId, SubscriptionInfo, SubscriptionRegistry,
};
use crate::tenant::TenantValidationMiddleware;
use crate::version::is_compatible;

/// Outcome of one handler during a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerOutcome {
    pub subscription_id: SubscriptionId,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DispatchFailure>,
}

impl HandlerOutcome {
    fn succeeded(subscription_id: SubscriptionId) -> Self {
        Self {
            subscription_id,
            ok: true,
            error: None,
        }
    }

    fn failed(subscription_id: SubscriptionId, failure: DispatchFailure) -> Self {
        Self {
            subscription_id,
            ok: false,
            error: Some(failure),
        }
    }
}

/// Per-publish summary of which handlers succeeded or failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub event_id: String,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// One entry per matched subscription, in invocation order.
    pub results: Vec<HandlerOutcome>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.results.iter().filter(|r| !r.ok)
    }

    pub fn handler_count(&self) -> usize {
        self.results.len()
    }

    pub fn outcome(&self, id: SubscriptionId) -> Option<&HandlerOutcome> {
        self.results.iter().find(|r| r.subscription_id == id)
    }
}

/// Producer-facing side of the bus.
///
/// Producers should depend on this trait rather than on [`EventBus`] so they
/// can be tested with a recording publisher.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: PartialDomainEvent) -> Result<DispatchReport, PublishError>;
}

#[async_trait]
impl<P> EventPublisher for Arc<P>
where
    P: EventPublisher + ?Sized,
{
    async fn publish(&self, event: PartialDomainEvent) -> Result<DispatchReport, PublishError> {
        (**self).publish(event).await
    }
}

/// Tenant-aware publish/subscribe dispatcher.
pub struct EventBus {
    registry: Arc<SubscriptionRegistry>,
    tenant: TenantValidationMiddleware,
    ids: EventIdGenerator,
    config: EventBusConfig,
    /// Event types that were dispatched to no subscription at all.
    unrouted: Mutex<BTreeSet<String>>,
}

impl EventBus {
    pub fn new(context: Arc<dyn TenantContext>) -> Self {
        Self::with_config(context, EventBusConfig::default())
    }

    pub fn with_config(context: Arc<dyn TenantContext>, config: EventBusConfig) -> Self {
        Self {
            registry: Arc::new(SubscriptionRegistry::default()),
            tenant: TenantValidationMiddleware::new(context),
            ids: EventIdGenerator::new(config.id_strategy),
            config,
            unrouted: Mutex::new(BTreeSet::new()),
        }
    }

    /// Replace the id generator (e.g. to plug in a custom function).
    pub fn with_id_generator(mut self, ids: EventIdGenerator) -> Self {
        self.config.id_strategy = ids.strategy();
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Tenant queries (`is_super_admin`, `get_current_tenant_id`, ...).
    pub fn tenant(&self) -> &TenantValidationMiddleware {
        &self.tenant
    }

    pub fn subscribe<H>(
        &self,
        pattern: &str,
        handler: H,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle, PatternError>
    where
        H: EventHandler + 'static,
    {
        self.subscribe_shared(pattern, Arc::new(handler), options)
    }

    /// Like [`EventBus::subscribe`] for handlers that are already shared.
    pub fn subscribe_shared(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle, PatternError> {
        let pattern = TopicPattern::parse(pattern)?;
        let id = self.registry.next_id();
        let handle =
            SubscriptionHandle::new(id, pattern.to_string(), Arc::downgrade(&self.registry));

        self.registry.insert(Subscription {
            id,
            pattern,
            priority: options.priority.unwrap_or(self.config.default_priority),
            tags: options.tags,
            group: options.group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
            version: options.version.unwrap_or_default(),
            handler,
        });

        Ok(handle)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.registry.remove(handle.id())
    }

    /// Remove every subscription registered under `group`.
    pub fn unsubscribe_group(&self, group: &str) -> usize {
        self.registry.remove_group(group)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.registry.infos()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.len()
    }

    /// Validate, complete and dispatch one event.
    ///
    /// Fails only if the event is refused (tenant or id generation); handler
    /// failures are reported in the returned [`DispatchReport`].
    pub async fn publish(&self, event: PartialDomainEvent) -> Result<DispatchReport, PublishError> {
        let event = self.tenant.validate_and_enrich(event)?;
        let event = self.complete(event)?;
        Ok(self.dispatch(event).await)
    }

    /// Publish several events; nothing is dispatched unless every event is
    /// accepted.
    pub async fn publish_batch(
        &self,
        events: Vec<PartialDomainEvent>,
    ) -> Result<Vec<DispatchReport>, PublishError> {
        let events = self
            .tenant
            .validate_and_enrich_batch(events)?
            .into_iter()
            .map(|event| self.complete(event))
            .collect::<Result<Vec<_>, _>>()?;

        let mut reports = Vec::with_capacity(events.len());
        for event in events {
            reports.push(self.dispatch(event).await);
        }
        Ok(reports)
    }

    fn complete(&self, event: PartialDomainEvent) -> Result<DomainEvent, PublishError> {
        let timestamp = event.timestamp.unwrap_or_else(Utc::now);
        let event_id = match &event.event_id {
            Some(id) => id.clone(),
            None => {
                let ms = timestamp.timestamp_millis();
                match u64::try_from(ms) {
                    Ok(ms) => self.ids.generate_at(ms)?,
                    // UUIDs carry no timestamp.
                    Err(_) if self.ids.strategy() == IdStrategy::Uuid => self.ids.generate()?,
                    Err(_) => {
                        warn!(
                            event_type = %event.event_type,
                            timestamp_ms = ms,
                            "event refused: pre-epoch timestamp cannot stamp a sortable id"
                        );
                        return Err(IdGeneratorError::TimestampBeforeEpoch(ms).into());
                    }
                }
            }
        };
        Ok(event.complete(event_id, timestamp))
    }

    async fn dispatch(&self, event: DomainEvent) -> DispatchReport {
        let span = info_span!(
            "dispatch",
            event_type = %event.event_type(),
            event_id = %event.event_id(),
        );

        async move {
            let matched = self.registry.matching(event.event_type());
            let event = Arc::new(event);

            if matched.is_empty() {
                self.note_unrouted(event.event_type());
            }

            let timeout = self.config.handler_timeout;
            let check = self.config.version_check;
            let results = join_all(
                matched
                    .into_iter()
                    .map(|sub| invoke(sub, event.clone(), timeout, check)),
            )
            .await;

            let report = DispatchReport {
                event_id: event.event_id().to_string(),
                event_type: event.event_type().to_string(),
                tenant_id: event.tenant_id().map(str::to_string),
                results,
            };
            debug!(
                handlers = report.handler_count(),
                failed = report.failures().count(),
                "event dispatched"
            );
            report
        }
        .instrument(span)
        .await
    }
}

impl EventBus {
    /// Event types published so far that reached no subscription, audit
    /// included.
    pub fn unrouted_event_types(&self) -> Vec<String> {
        self.unrouted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn note_unrouted(&self, event_type: &str) {
        let first = self
            .unrouted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_type.to_string());
        if first {
            warn!(
                event_type,
                segments = event_type.split('.').count(),
                "event type matched no subscription"
            );
        } else {
            debug!("no subscriptions matched event");
        }
    }
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.registry.len())
            .field("config", &self.config)
            .field("ids", &self.ids)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: PartialDomainEvent) -> Result<DispatchReport, PublishError> {
        EventBus::publish(self, event).await
    }
}

async fn invoke(
    sub: Arc<Subscription>,
    event: Arc<DomainEvent>,
    timeout: Duration,
    check: VersionCheck,
) -> HandlerOutcome {
    if check != VersionCheck::Off {
        let compat = is_compatible(&sub.version, &event.metadata().version);
        if !compat.compatible {
            let reason = compat.reason.unwrap_or_default();
            if check == VersionCheck::Enforce {
                warn!(subscription = %sub.id, %reason, "handler skipped: incompatible version");
                return HandlerOutcome::failed(sub.id, DispatchFailure::Incompatible(reason));
            }
            warn!(subscription = %sub.id, %reason, "handler version is incompatible with event");
        }
    }

    let result = tokio::time::timeout(
        timeout,
        AssertUnwindSafe(sub.handler.handle(event)).catch_unwind(),
    )
    .await;

    match result {
        Ok(Ok(Ok(()))) => HandlerOutcome::succeeded(sub.id),
        Ok(Ok(Err(e))) => {
            warn!(subscription = %sub.id, group = %sub.group, error = %e, "handler failed");
            HandlerOutcome::failed(sub.id, DispatchFailure::Failed(e.to_string()))
        }
        Ok(Err(panic)) => {
            let message = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            error!(subscription = %sub.id, group = %sub.group, panic = %message, "handler panicked");
            HandlerOutcome::failed(sub.id, DispatchFailure::Panicked(message))
        }
        Err(_) => {
            error!(
                subscription = %sub.id,
                group = %sub.group,
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "handler timed out"
            );
            HandlerOutcome::failed(sub.id, DispatchFailure::TimedOut(timeout))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use keystone_core::{ContextKind, InMemoryTenantContext, TenantId};
    use serde_json::json;

    use crate::error::HandlerError;
    use crate::id::{EventIdGenerator, IdGeneratorError, IdStrategy, is_valid_ulid, is_valid_uuid};
    use crate::tenant::TenantRule;
    use crate::version::EventVersion;

    fn acme_context() -> Arc<InMemoryTenantContext> {
        Arc::new(InMemoryTenantContext::for_tenant(
            TenantId::parse("acme-1").unwrap(),
            ContextKind::Organization,
        ))
    }

    fn bus() -> EventBus {
        EventBus::new(acme_context())
    }

    fn task_created() -> PartialDomainEvent {
        PartialDomainEvent::new("task.created", json!({"task": {"title": "Pour foundation"}}))
            .with_source("tasks")
    }

    type Captured = Arc<Mutex<Vec<Arc<DomainEvent>>>>;

    fn capture(bus: &EventBus, pattern: &str) -> Captured {
        let seen: Captured = Arc::default();
        let sink = seen.clone();
        bus.subscribe(
            pattern,
            move |event: Arc<DomainEvent>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(event);
                    Ok::<(), HandlerError>(())
                }
            },
            SubscribeOptions::new(),
        )
        .unwrap();
        seen
    }

    #[tokio::test]
    async fn task_created_reaches_exact_and_wildcard_subscribers() {
        let bus = bus();
        let exact = capture(&bus, "task.created");
        let wildcard = capture(&bus, "task.*");
        let other = capture(&bus, "project.*");

        let report = bus.publish(task_created()).await.unwrap();

        assert_eq!(report.handler_count(), 2);
        assert!(report.all_succeeded());
        assert_eq!(report.tenant_id.as_deref(), Some("acme-1"));
        assert!(is_valid_uuid(&report.event_id));

        let exact = exact.lock().unwrap();
        let wildcard = wildcard.lock().unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(wildcard.len(), 1);
        assert!(other.lock().unwrap().is_empty());

        let delivered = &exact[0];
        assert_eq!(delivered.tenant_id(), Some("acme-1"));
        assert_eq!(delivered.event_id(), report.event_id);
        assert_eq!(delivered.payload_str("/task/title"), Some("Pour foundation"));
        assert_eq!(wildcard[0].event_id(), delivered.event_id());
    }

    #[tokio::test]
    async fn invalid_explicit_tenant_rejects_before_any_handler() {
        let bus = bus();
        let seen = capture(&bus, "task.*");

        let err = bus
            .publish(task_created().with_tenant("bad id"))
            .await
            .unwrap_err();

        match err {
            PublishError::TenantRejected(e) => {
                assert_eq!(
                    e.rule,
                    TenantRule::InvalidFormat(keystone_core::TenantIdError::Whitespace)
                );
                assert!(e.to_string().contains("whitespace"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_tenant_without_context_is_rejected() {
        let bus = EventBus::new(Arc::new(InMemoryTenantContext::new()));
        let seen = capture(&bus, "task.*");

        let err = bus.publish(task_created()).await.unwrap_err();
        assert!(matches!(
            err,
            PublishError::TenantRejected(ref e)
                if e.rule == TenantRule::MissingContext { context: "none".into() }
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cross_tenant_events_publish_without_context() {
        let bus = EventBus::new(Arc::new(InMemoryTenantContext::new()));
        let seen = capture(&bus, "system.*");

        let report = bus
            .publish(PartialDomainEvent::new("system.maintenance", json!({})).allow_cross_tenant())
            .await
            .unwrap();

        assert_eq!(report.tenant_id, None);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn handlers_run_in_priority_then_registration_order() {
        let bus = bus();
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();

        for (label, priority) in [("p10", 10), ("p1", 1), ("p5-first", 5), ("p5-second", 5)] {
            let order = order.clone();
            bus.subscribe(
                "task.created",
                move |_event: Arc<DomainEvent>| {
                    let order = order.clone();
                    async move {
                        order.lock().unwrap().push(label);
                        Ok::<(), HandlerError>(())
                    }
                },
                SubscribeOptions::new().priority(priority),
            )
            .unwrap();
        }

        let report = bus.publish(task_created()).await.unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["p1", "p5-first", "p5-second", "p10"]
        );
        let ids: Vec<u64> = report.results.iter().map(|r| r.subscription_id.as_u64()).collect();
        assert_eq!(ids, vec![2, 3, 4, 1]);
    }

    #[tokio::test]
    async fn default_priority_comes_from_config() {
        let bus = EventBus::with_config(
            acme_context(),
            EventBusConfig::default().with_default_priority(7),
        );
        let _ = capture(&bus, "task.*");
        assert_eq!(bus.subscriptions()[0].priority, 7);
    }

    #[tokio::test]
    async fn failing_handler_does_not_stop_others() {
        let bus = bus();
        let failing = bus
            .subscribe(
                "task.*",
                |_event: Arc<DomainEvent>| async { Err::<(), _>(HandlerError::execution("boom")) },
                SubscribeOptions::new().priority(1),
            )
            .unwrap();
        let seen = capture(&bus, "task.created");

        let report = bus.publish(task_created()).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(!report.all_succeeded());
        let failed = report.outcome(failing.id()).unwrap();
        assert!(!failed.ok);
        assert_eq!(
            failed.error,
            Some(DispatchFailure::Failed("handler execution failed: boom".into()))
        );
        assert_eq!(report.failures().count(), 1);
    }

    #[tokio::test]
    async fn panicking_handler_is_reported_not_propagated() {
        let bus = bus();
        let panicking = bus
            .subscribe(
                "task.created",
                |_event: Arc<DomainEvent>| async {
                    if true {
                        panic!("handler exploded");
                    }
                    Ok::<(), HandlerError>(())
                },
                SubscribeOptions::new(),
            )
            .unwrap();
        let seen = capture(&bus, "task.created");

        let report = bus.publish(task_created()).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(
            report.outcome(panicking.id()).unwrap().error,
            Some(DispatchFailure::Panicked("handler exploded".into()))
        );
    }

    #[tokio::test]
    async fn slow_handler_times_out_and_others_complete() {
        let timeout = Duration::from_millis(50);
        let bus = EventBus::with_config(
            acme_context(),
            EventBusConfig::default().with_handler_timeout(timeout),
        );
        let slow = bus
            .subscribe(
                "task.created",
                |_event: Arc<DomainEvent>| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<(), HandlerError>(())
                },
                SubscribeOptions::new(),
            )
            .unwrap();
        let seen = capture(&bus, "task.created");

        let report = bus.publish(task_created()).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(
            report.outcome(slow.id()).unwrap().error,
            Some(DispatchFailure::TimedOut(timeout))
        );
    }

    #[tokio::test]
    async fn all_handlers_failing_still_returns_a_report() {
        let bus = bus();
        for _ in 0..2 {
            bus.subscribe(
                "task.*",
                |_event: Arc<DomainEvent>| async { Err::<(), _>(HandlerError::payload("no task")) },
                SubscribeOptions::new(),
            )
            .unwrap();
        }

        let report = bus.publish(task_created()).await.unwrap();
        assert_eq!(report.failures().count(), 2);
    }

    #[tokio::test]
    async fn events_reaching_no_subscription_are_tracked_once() {
        let bus = bus();
        let _seen = capture(&bus, "task.*");

        bus.publish(task_created()).await.unwrap();
        assert!(bus.unrouted_event_types().is_empty());

        for _ in 0..2 {
            let report = bus
                .publish(PartialDomainEvent::new("org.team.member.added", json!({})))
                .await
                .unwrap();
            assert_eq!(report.handler_count(), 0);
        }
        bus.publish(PartialDomainEvent::new("heartbeat", json!({})))
            .await
            .unwrap();

        assert_eq!(
            bus.unrouted_event_types(),
            vec!["heartbeat".to_string(), "org.team.member.added".to_string()]
        );
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = bus();
        let seen: Captured = Arc::default();
        let sink = seen.clone();
        let handle = bus
            .subscribe(
                "task.*",
                move |event: Arc<DomainEvent>| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(event);
                        Ok::<(), HandlerError>(())
                    }
                },
                SubscribeOptions::new(),
            )
            .unwrap();

        bus.publish(task_created()).await.unwrap();
        assert!(handle.is_active());
        assert!(bus.unsubscribe(&handle));
        assert!(!handle.is_active());
        assert!(!handle.unsubscribe());
        bus.publish(task_created()).await.unwrap();

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn unsubscribe_group_removes_only_that_group() {
        let bus = bus();
        let noop = |_event: Arc<DomainEvent>| async { Ok::<(), HandlerError>(()) };
        bus.subscribe("task.*", noop, SubscribeOptions::new().group("feed")).unwrap();
        bus.subscribe("user.*", noop, SubscribeOptions::new().group("feed")).unwrap();
        bus.subscribe("task.*", noop, SubscribeOptions::new().group("audit")).unwrap();

        assert_eq!(bus.unsubscribe_group("feed"), 2);
        let remaining = bus.subscriptions();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].group, "audit");
    }

    #[tokio::test]
    async fn invalid_patterns_are_refused() {
        let bus = bus();
        let noop = |_event: Arc<DomainEvent>| async { Ok::<(), HandlerError>(()) };
        assert_eq!(
            bus.subscribe("", noop, SubscribeOptions::new()).unwrap_err(),
            PatternError::Empty
        );
        assert!(bus.subscribe("task..x", noop, SubscribeOptions::new()).is_err());
        assert_eq!(bus.subscription_count(), 0);
    }

    #[tokio::test]
    async fn producer_supplied_identity_is_kept() {
        let bus = bus();
        let seen = capture(&bus, "task.created");
        let at = Utc::now() - chrono::Duration::hours(1);

        let report = bus
            .publish(task_created().with_event_id("evt-fixed").with_timestamp(at))
            .await
            .unwrap();

        assert_eq!(report.event_id, "evt-fixed");
        assert_eq!(seen.lock().unwrap()[0].timestamp(), at);
    }

    #[tokio::test]
    async fn ulid_strategy_stamps_the_event_timestamp() {
        let bus = EventBus::with_config(
            acme_context(),
            EventBusConfig::default().with_id_strategy(IdStrategy::Ulid),
        );
        let seen = capture(&bus, "task.created");

        let report = bus.publish(task_created()).await.unwrap();
        assert!(is_valid_ulid(&report.event_id));

        let event = seen.lock().unwrap()[0].clone();
        assert_eq!(
            crate::id::extract_timestamp_from_ulid(event.event_id()),
            Some(event.timestamp().timestamp_millis() as u64)
        );
    }

    #[tokio::test]
    async fn pre_epoch_timestamp_cannot_stamp_a_ulid() {
        let bus = EventBus::with_config(
            acme_context(),
            EventBusConfig::default().with_id_strategy(IdStrategy::Ulid),
        );
        let seen = capture(&bus, "task.created");
        let before_epoch = chrono::DateTime::from_timestamp_millis(-1_000).unwrap();

        let err = bus
            .publish(task_created().with_timestamp(before_epoch))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PublishError::IdGeneration(IdGeneratorError::TimestampBeforeEpoch(-1_000))
        );
        assert!(seen.lock().unwrap().is_empty());

        // a producer-supplied id needs no stamping
        let report = bus
            .publish(
                task_created()
                    .with_timestamp(before_epoch)
                    .with_event_id("evt-old"),
            )
            .await
            .unwrap();
        assert_eq!(report.event_id, "evt-old");
    }

    #[tokio::test]
    async fn pre_epoch_timestamp_is_fine_for_uuids() {
        let bus = bus();
        let before_epoch = chrono::DateTime::from_timestamp_millis(-1_000).unwrap();
        let report = bus
            .publish(task_created().with_timestamp(before_epoch))
            .await
            .unwrap();
        assert!(is_valid_uuid(&report.event_id));
    }

    #[tokio::test]
    async fn custom_strategy_without_function_refuses_publish() {
        let mut ids = EventIdGenerator::default();
        ids.set_strategy(IdStrategy::Custom);
        let bus = bus().with_id_generator(ids);
        let seen = capture(&bus, "task.created");

        let err = bus.publish(task_created()).await.unwrap_err();
        assert_eq!(err, PublishError::IdGeneration(IdGeneratorError::NotConfigured));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn custom_generator_is_used() {
        let bus = bus().with_id_generator(EventIdGenerator::with_custom(|_| "evt-custom".into()));
        let report = bus.publish(task_created()).await.unwrap();
        assert_eq!(report.event_id, "evt-custom");
        assert_eq!(bus.config().id_strategy, IdStrategy::Custom);
    }

    #[tokio::test]
    async fn batch_is_admitted_all_or_nothing() {
        let bus = bus();
        let seen = capture(&bus, "task.*");

        let rejected = bus
            .publish_batch(vec![task_created(), task_created().with_tenant("bad id")])
            .await;
        assert!(rejected.is_err());
        assert!(seen.lock().unwrap().is_empty());

        let reports = bus
            .publish_batch(vec![
                task_created(),
                PartialDomainEvent::new("task.completed", json!({})),
            ])
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].event_type(), "task.created");
        assert_eq!(seen[1].event_type(), "task.completed");
    }

    #[tokio::test]
    async fn enforced_version_check_skips_stale_consumers() {
        let bus = EventBus::with_config(
            acme_context(),
            EventBusConfig::default().with_version_check(VersionCheck::Enforce),
        );
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let stale = bus
            .subscribe(
                "task.created",
                move |_event: Arc<DomainEvent>| {
                    let counter = counter.clone();
                    async move {
                        *counter.lock().unwrap() += 1;
                        Ok::<(), HandlerError>(())
                    }
                },
                SubscribeOptions::new().version(EventVersion::new(1, 0, 0)),
            )
            .unwrap();
        let current = capture(&bus, "task.created");

        let report = bus
            .publish(task_created().with_version(EventVersion::new(1, 1, 0)))
            .await
            .unwrap();

        assert_eq!(*calls.lock().unwrap(), 0);
        assert!(matches!(
            report.outcome(stale.id()).unwrap().error,
            Some(DispatchFailure::Incompatible(_))
        ));
        // The default subscription version (1.0.0) is stale too.
        assert!(current.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn warn_version_check_still_invokes() {
        let bus = bus();
        let seen = capture(&bus, "task.created");
        let report = bus
            .publish(task_created().with_version(EventVersion::new(2, 0, 0)))
            .await
            .unwrap();
        assert!(report.all_succeeded());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn publisher_trait_object_delegates() {
        let bus = Arc::new(bus());
        let seen = capture(&bus, "task.created");
        let publisher: Arc<dyn EventPublisher> = bus.clone();

        publisher.publish(task_created()).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn report_serializes_for_logging() {
        let report = DispatchReport {
            event_id: "evt-1".into(),
            event_type: "task.created".into(),
            tenant_id: Some("acme-1".into()),
            results: vec![
                HandlerOutcome::succeeded(SubscriptionId::for_tests(1)),
                HandlerOutcome::failed(
                    SubscriptionId::for_tests(2),
                    DispatchFailure::TimedOut(Duration::from_millis(250)),
                ),
            ],
        };
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "eventId": "evt-1",
                "eventType": "task.created",
                "tenantId": "acme-1",
                "results": [
                    {"subscriptionId": 1, "ok": true},
                    {"subscriptionId": 2, "ok": false, "error": {"kind": "timed_out", "detail": 250}}
                ]
            })
        );
    }
}
