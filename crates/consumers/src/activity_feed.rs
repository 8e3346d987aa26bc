//! Activity feed: a bounded, newest-first list of human-readable activity.
//!
//! UI layers observe the feed through [`ActivityFeed::subscribe_changes`], a
//! `watch` channel carrying a revision number bumped on every change.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use keystone_events::{Consumer, DomainEvent, HandlerError, HandlerSpec};

use crate::payload::{UNTITLED, action, first_str, user_id};

pub const DEFAULT_FEED_CAPACITY: usize = 50;
pub const ACTIVITY_FEED_GROUP: &str = "activity-feed";

const FEED_PRIORITY: i32 = 10;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Task,
    Project,
    Session,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub event_id: String,
    pub event_type: String,
    pub kind: ActivityKind,
    pub tenant_id: Option<String>,
    pub user_id: String,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ActivityFeed {
    entries: RwLock<VecDeque<ActivityEntry>>,
    capacity: usize,
    changes: watch::Sender<u64>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FEED_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
            changes,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest first.
    pub fn entries(&self) -> Vec<ActivityEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn entries_for_tenant(&self, tenant_id: &str) -> Vec<ActivityEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.tenant_id.as_deref() == Some(tenant_id))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.bump();
    }

    /// Receiver that observes a new revision after every change.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.changes.borrow()
    }

    fn push(&self, entry: ActivityEntry) {
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.push_front(entry);
            // Oldest entries live at the back.
            entries.truncate(self.capacity);
        }
        self.bump();
    }

    fn bump(&self) {
        self.changes.send_modify(|revision| *revision += 1);
    }

    fn entry(event: &DomainEvent, kind: ActivityKind, summary: String) -> ActivityEntry {
        ActivityEntry {
            event_id: event.event_id().to_string(),
            event_type: event.event_type().to_string(),
            kind,
            tenant_id: event.tenant_id().map(str::to_string),
            user_id: user_id(event),
            summary,
            occurred_at: event.timestamp(),
        }
    }

    fn on_task(&self, event: &DomainEvent) {
        let title = first_str(event, &["/task/title", "/title"]).unwrap_or(UNTITLED);
        let summary = match action(event) {
            "created" => format!("Created task \"{title}\""),
            "updated" => format!("Updated task \"{title}\""),
            "completed" => format!("Completed task \"{title}\""),
            "deleted" => format!("Deleted task \"{title}\""),
            "assigned" => format!("Assigned task \"{title}\""),
            other => format!("Task \"{title}\": {other}"),
        };
        self.push(Self::entry(event, ActivityKind::Task, summary));
    }

    fn on_project(&self, event: &DomainEvent) {
        let name = first_str(event, &["/project/name", "/name"]).unwrap_or(UNTITLED);
        let summary = match action(event) {
            "created" => format!("Created project \"{name}\""),
            "updated" => format!("Updated project \"{name}\""),
            "archived" => format!("Archived project \"{name}\""),
            other => format!("Project \"{name}\": {other}"),
        };
        self.push(Self::entry(event, ActivityKind::Project, summary));
    }

    fn on_session(&self, event: &DomainEvent) {
        let user = user_id(event);
        let summary = match action(event) {
            "login" => format!("{user} signed in"),
            _ => format!("{user} signed out"),
        };
        self.push(Self::entry(event, ActivityKind::Session, summary));
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new()
    }
}

fn feed_handler(
    name: &str,
    pattern: &str,
    feed: &Arc<ActivityFeed>,
    apply: fn(&ActivityFeed, &DomainEvent),
) -> HandlerSpec {
    let feed = feed.clone();
    HandlerSpec::new(name, pattern, move |event: Arc<DomainEvent>| {
        let feed = feed.clone();
        async move {
            apply(&feed, &event);
            debug!(event_type = %event.event_type(), entries = feed.len(), "activity recorded");
            Ok::<(), HandlerError>(())
        }
    })
    .priority(FEED_PRIORITY)
}

impl Consumer for ActivityFeed {
    fn group(&self) -> &str {
        ACTIVITY_FEED_GROUP
    }

    fn tags(&self) -> BTreeSet<String> {
        BTreeSet::from(["activity".to_string(), "ui".to_string()])
    }

    fn handlers(self: Arc<Self>) -> Vec<HandlerSpec> {
        vec![
            feed_handler("on_task", "task.*", &self, ActivityFeed::on_task),
            feed_handler("on_project", "project.*", &self, ActivityFeed::on_project),
            feed_handler("on_login", "user.login", &self, ActivityFeed::on_session),
            feed_handler("on_logout", "user.logout", &self, ActivityFeed::on_session),
        ]
    }
}
