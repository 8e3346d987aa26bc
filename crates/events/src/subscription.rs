//! Subscriptions and the registry that holds them.
//!
//! Subscriptions are immutable once registered; removal is the only mutation.
//! The registry is read on every publish and written only by
//! subscribe/unsubscribe, so a plain `RwLock<Vec<_>>` is enough.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::error::HandlerError;
use crate::event::DomainEvent;
use crate::pattern::TopicPattern;
use crate::version::EventVersion;

/// Group assigned to subscriptions registered without one.
pub const DEFAULT_GROUP: &str = "default";

/// Reacts to events delivered by the bus.
///
/// Handlers receive a shared, frozen event. Errors are recorded in the
/// dispatch report and never affect other handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: Arc<DomainEvent>) -> Result<(), HandlerError> {
        (self)(event).await
    }
}

/// Identity of a registered subscription, unique for the process lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: u64) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Optional settings for [`EventBus::subscribe`](crate::bus::EventBus::subscribe).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Lower runs first. Falls back to the bus default.
    pub priority: Option<i32>,
    pub tags: BTreeSet<String>,
    pub group: Option<String>,
    /// Schema version the handler was written against.
    pub version: Option<EventVersion>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn version(mut self, version: EventVersion) -> Self {
        self.version = Some(version);
        self
    }
}

/// A registered handler plus its routing metadata.
pub(crate) struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) pattern: TopicPattern,
    pub(crate) priority: i32,
    pub(crate) tags: BTreeSet<String>,
    pub(crate) group: String,
    pub(crate) version: EventVersion,
    pub(crate) handler: Arc<dyn EventHandler>,
}

impl Subscription {
    pub(crate) fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            pattern: self.pattern.to_string(),
            priority: self.priority,
            tags: self.tags.clone(),
            group: self.group.clone(),
            version: self.version,
        }
    }
}

impl core::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern.as_str())
            .field("priority", &self.priority)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// Introspection snapshot of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionInfo {
    pub id: SubscriptionId,
    pub pattern: String,
    pub priority: i32,
    pub tags: BTreeSet<String>,
    pub group: String,
    pub version: EventVersion,
}

#[derive(Debug, Default)]
pub(crate) struct SubscriptionRegistry {
    entries: RwLock<Vec<Arc<Subscription>>>,
    next_id: AtomicU64,
}

impl SubscriptionRegistry {
    pub(crate) fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, subscription: Subscription) {
        debug!(
            subscription = %subscription.id,
            pattern = %subscription.pattern,
            priority = subscription.priority,
            group = %subscription.group,
            "subscription registered"
        );
        // Registration order is the tie-break for equal priorities.
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(subscription));
    }

    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|s| s.id != id);
        let removed = entries.len() != before;
        if removed {
            debug!(subscription = %id, "subscription removed");
        }
        removed
    }

    pub(crate) fn remove_group(&self, group: &str) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|s| s.group != group);
        let removed = before - entries.len();
        debug!(group, removed, "subscription group removed");
        removed
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|s| s.id == id)
    }

    /// Subscriptions matching `event_type`, ordered by ascending priority and
    /// then registration order.
    pub(crate) fn matching(&self, event_type: &str) -> Vec<Arc<Subscription>> {
        let mut matched: Vec<Arc<Subscription>> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|s| s.pattern.matches(event_type))
            .cloned()
            .collect();
        // `sort_by_key` is stable.
        matched.sort_by_key(|s| s.priority);
        matched
    }

    pub(crate) fn infos(&self) -> Vec<SubscriptionInfo> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.info())
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Returned by `subscribe`; removes the subscription on request.
///
/// Dropping the handle does **not** unsubscribe: subscriptions live until
/// explicitly removed or the process exits.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    pattern: String,
    registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, pattern: String, registry: Weak<SubscriptionRegistry>) -> Self {
        Self {
            id,
            pattern,
            registry,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Remove the subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}
