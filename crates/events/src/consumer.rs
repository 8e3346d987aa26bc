//! Declarative consumer registration.
//!
//! A consumer is a unit owning several pattern-scoped handlers that share a
//! group, tags and schema version. Each consumer builds an explicit
//! registration table ([`HandlerSpec`]s) and the bus registers the whole table
//! at once.
//!
//! ```ignore
//! impl Consumer for ActivityFeed {
//!     fn group(&self) -> &str { "activity-feed" }
//!
//!     fn handlers(self: Arc<Self>) -> Vec<HandlerSpec> {
//!         let feed = self.clone();
//!         vec![HandlerSpec::new("on_task", "task.*", move |event| {
//!             let feed = feed.clone();
//!             async move { feed.record(&event); Ok(()) }
//!         })]
//!     }
//! }
//!
//! let registration = register_consumer(&bus, Arc::new(ActivityFeed::new()))?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::EventBus;
use crate::error::RegistrationError;
use crate::subscription::{EventHandler, SubscribeOptions, SubscriptionHandle};
use crate::version::EventVersion;

/// One row of a consumer's registration table.
pub struct HandlerSpec {
    pub name: String,
    pub pattern: String,
    pub priority: Option<i32>,
    pub tags: BTreeSet<String>,
    pub handler: Arc<dyn EventHandler>,
}

impl HandlerSpec {
    pub fn new<H>(name: impl Into<String>, pattern: impl Into<String>, handler: H) -> Self
    where
        H: EventHandler + 'static,
    {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            priority: None,
            tags: BTreeSet::new(),
            handler: Arc::new(handler),
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}

impl core::fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("name", &self.name)
            .field("pattern", &self.pattern)
            .field("priority", &self.priority)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Everything needed to register a consumer in one call.
#[derive(Debug)]
pub struct ConsumerSpec {
    pub group: String,
    pub tags: BTreeSet<String>,
    pub version: EventVersion,
    pub handlers: Vec<HandlerSpec>,
}

impl ConsumerSpec {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            tags: BTreeSet::new(),
            version: EventVersion::INITIAL,
            handlers: Vec::new(),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn version(mut self, version: EventVersion) -> Self {
        self.version = version;
        self
    }

    pub fn handler(mut self, spec: HandlerSpec) -> Self {
        self.handlers.push(spec);
        self
    }
}

/// A unit of one or more handlers subscribed as a group.
pub trait Consumer: Send + Sync + 'static {
    /// Group shared by every handler of this consumer.
    fn group(&self) -> &str;

    fn tags(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn version(&self) -> EventVersion {
        EventVersion::INITIAL
    }

    /// The registration table. Handlers typically capture a clone of `self`.
    fn handlers(self: Arc<Self>) -> Vec<HandlerSpec>;

    fn spec(self: Arc<Self>) -> ConsumerSpec {
        let mut spec = ConsumerSpec::new(self.group()).version(self.version());
        spec.tags = self.tags();
        spec.handlers = self.handlers();
        spec
    }
}

/// Handles of every subscription made for one consumer.
#[derive(Debug, Clone)]
pub struct ConsumerRegistration {
    group: String,
    handles: Vec<SubscriptionHandle>,
}

impl ConsumerRegistration {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn handles(&self) -> &[SubscriptionHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Remove every subscription of this registration; returns how many were
    /// still active.
    pub fn unsubscribe_all(&self) -> usize {
        self.handles.iter().filter(|h| h.unsubscribe()).count()
    }
}

impl EventBus {
    /// Register all handlers of a consumer.
    ///
    /// All-or-nothing: if any handler has an invalid pattern, the handlers
    /// already registered for this consumer are removed again.
    pub fn subscribe_batch(&self, spec: ConsumerSpec) -> Result<ConsumerRegistration, RegistrationError> {
        let ConsumerSpec {
            group,
            tags,
            version,
            handlers,
        } = spec;

        let mut registration = ConsumerRegistration {
            group: group.clone(),
            handles: Vec::with_capacity(handlers.len()),
        };

        for handler in handlers {
            let mut options = SubscribeOptions::new()
                .group(group.clone())
                .version(version)
                .tags(tags.iter().cloned())
                .tags(handler.tags);
            options.priority = handler.priority;

            match self.subscribe_shared(&handler.pattern, handler.handler, options) {
                Ok(handle) => registration.handles.push(handle),
                Err(source) => {
                    let rolled_back = registration.unsubscribe_all();
                    warn!(
                        group = %group,
                        handler = %handler.name,
                        rolled_back,
                        error = %source,
                        "consumer registration failed"
                    );
                    return Err(RegistrationError::InvalidPattern {
                        group,
                        handler: handler.name,
                        source,
                    });
                }
            }
        }

        debug!(group = %registration.group, handlers = registration.len(), "consumer registered");
        Ok(registration)
    }
}

/// Register a [`Consumer`] with the bus.
pub fn register_consumer<C>(bus: &EventBus, consumer: Arc<C>) -> Result<ConsumerRegistration, RegistrationError>
where
    C: Consumer + ?Sized,
{
    bus.subscribe_batch(consumer.spec())
}
