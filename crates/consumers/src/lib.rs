//! `keystone-consumers` — the event consumers shipped with the bus.
//!
//! Each consumer implements [`keystone_events::Consumer`] and is registered by
//! the [`StartupInitializer`] before producers start publishing.

pub mod activity_feed;
pub mod audit;
pub mod notifications;
mod payload;
pub mod startup;

pub use activity_feed::{ActivityEntry, ActivityFeed, ActivityKind, DEFAULT_FEED_CAPACITY};
pub use audit::{AuditCollector, AuditRecord, DEFAULT_AUDIT_CAPACITY, DEFAULT_AUDIT_DEPTH, audit_patterns};
pub use notifications::{Notification, NotificationStore};
pub use payload::{SYSTEM_USER, UNTITLED};
pub use startup::{StartupError, StartupInitializer, StartupStatus};
