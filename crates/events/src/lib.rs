//! `keystone-events` — tenant-aware domain event bus.
//!
//! Producers publish [`PartialDomainEvent`]s; the [`EventBus`] validates or
//! injects the tenant, assigns identity, matches topic patterns and invokes
//! handlers in priority order, returning a [`DispatchReport`].

pub mod bus;
pub mod config;
pub mod consumer;
pub mod error;
pub mod event;
pub mod id;
pub mod pattern;
pub mod subscription;
pub mod tenant;
pub mod version;

pub use bus::{DispatchReport, EventBus, EventPublisher, HandlerOutcome};
pub use config::{EventBusConfig, VersionCheck};
pub use consumer::{Consumer, ConsumerRegistration, ConsumerSpec, HandlerSpec, register_consumer};
pub use error::{DispatchFailure, HandlerError, PublishError, RegistrationError};
pub use event::{DomainEvent, EventMetadata, PartialDomainEvent};
pub use id::{
    EventIdGenerator, IdGeneratorError, IdStrategy, extract_timestamp_from_ulid, generate_ulid,
    generate_uuid, is_valid_ulid, is_valid_uuid,
};
pub use pattern::{PatternError, TopicPattern, topic_matches};
pub use subscription::{
    EventHandler, SubscribeOptions, SubscriptionHandle, SubscriptionId, SubscriptionInfo,
};
pub use tenant::{TenantRule, TenantValidationError, TenantValidationMiddleware};
pub use version::{Compatibility, EventVersion, VersionBump, VersionError, compare, is_compatible};
