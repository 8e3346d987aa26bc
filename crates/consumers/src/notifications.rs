//! Tenant-isolated, per-recipient notification store.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use keystone_core::TenantId;
use keystone_events::{Consumer, DomainEvent, HandlerError, HandlerSpec};

use crate::payload::{SYSTEM_USER, UNTITLED, first_str};

pub const DEFAULT_NOTIFICATIONS_PER_TENANT: usize = 500;
pub const NOTIFICATIONS_GROUP: &str = "notifications";

const NOTIFICATION_PRIORITY: i32 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Id of the event that produced the notification.
    pub id: String,
    pub tenant_id: TenantId,
    pub recipient_id: String,
    pub title: String,
    pub body: Option<String>,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

#[derive(Debug)]
pub struct NotificationStore {
    by_tenant: RwLock<HashMap<TenantId, VecDeque<Notification>>>,
    per_tenant_capacity: usize,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_NOTIFICATIONS_PER_TENANT)
    }

    pub fn with_capacity(per_tenant_capacity: usize) -> Self {
        Self {
            by_tenant: RwLock::new(HashMap::new()),
            per_tenant_capacity: per_tenant_capacity.max(1),
        }
    }

    /// Notifications for one recipient, newest first.
    pub fn list(&self, tenant_id: &TenantId, recipient_id: &str) -> Vec<Notification> {
        let guard = self.by_tenant.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(tenant_id)
            .map(|items| {
                items
                    .iter()
                    .rev()
                    .filter(|n| n.recipient_id == recipient_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn unread_count(&self, tenant_id: &TenantId, recipient_id: &str) -> usize {
        let guard = self.by_tenant.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(tenant_id)
            .map(|items| {
                items
                    .iter()
                    .filter(|n| n.recipient_id == recipient_id && !n.read)
                    .count()
            })
            .unwrap_or(0)
    }

    /// Returns `false` when the tenant has no notification with that id.
    pub fn mark_read(&self, tenant_id: &TenantId, id: &str) -> bool {
        let mut guard = self.by_tenant.write().unwrap_or_else(|e| e.into_inner());
        match guard
            .get_mut(tenant_id)
            .and_then(|items| items.iter_mut().find(|n| n.id == id))
        {
            Some(notification) => {
                notification.read = true;
                true
            }
            None => false,
        }
    }

    /// Returns the number of notifications that changed state.
    pub fn mark_all_read(&self, tenant_id: &TenantId, recipient_id: &str) -> usize {
        let mut guard = self.by_tenant.write().unwrap_or_else(|e| e.into_inner());
        let Some(items) = guard.get_mut(tenant_id) else {
            return 0;
        };
        let mut changed = 0;
        for n in items
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
        {
            n.read = true;
            changed += 1;
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.by_tenant
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .map(VecDeque::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, notification: Notification) {
        let mut guard = self.by_tenant.write().unwrap_or_else(|e| e.into_inner());
        let items = guard.entry(notification.tenant_id.clone()).or_default();
        if items.len() == self.per_tenant_capacity {
            items.pop_front();
        }
        items.push_back(notification);
    }

    fn on_task_assigned(&self, event: &DomainEvent) {
        let recipient = first_str(event, &["/assigneeId", "/task/assigneeId"]);
        let title = first_str(event, &["/task/title", "/title"]).unwrap_or(UNTITLED);
        self.notify(
            event,
            recipient,
            "Task assigned".to_string(),
            Some(format!("You were assigned \"{title}\"")),
        );
    }

    fn on_notification(&self, event: &DomainEvent) {
        let recipient = first_str(event, &["/recipientId", "/userId"]);
        let title = first_str(event, &["/title"]).unwrap_or("Notification");
        let body = first_str(event, &["/message", "/body"]).map(str::to_string);
        self.notify(event, recipient, title.to_string(), body);
    }

    fn notify(&self, event: &DomainEvent, recipient: Option<&str>, title: String, body: Option<String>) {
        let Some(tenant_id) = event.tenant_id().and_then(|t| TenantId::parse(t).ok()) else {
            debug!(event_id = %event.event_id(), "notification skipped: event carries no tenant");
            return;
        };
        self.insert(Notification {
            id: event.event_id().to_string(),
            tenant_id,
            recipient_id: recipient.unwrap_or(SYSTEM_USER).to_string(),
            title,
            body,
            event_type: event.event_type().to_string(),
            created_at: event.timestamp(),
            read: false,
        });
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

fn store_handler(
    name: &str,
    pattern: &str,
    store: &Arc<NotificationStore>,
    apply: fn(&NotificationStore, &DomainEvent),
) -> HandlerSpec {
    let store = store.clone();
    HandlerSpec::new(name, pattern, move |event: Arc<DomainEvent>| {
        let store = store.clone();
        async move {
            apply(&store, &event);
            Ok::<(), HandlerError>(())
        }
    })
    .priority(NOTIFICATION_PRIORITY)
}

impl Consumer for NotificationStore {
    fn group(&self) -> &str {
        NOTIFICATIONS_GROUP
    }

    fn tags(&self) -> BTreeSet<String> {
        BTreeSet::from(["notifications".to_string(), "ui".to_string()])
    }

    fn handlers(self: Arc<Self>) -> Vec<HandlerSpec> {
        vec![
            store_handler("task assigned", "task.assigned", &self, NotificationStore::on_task_assigned),
            store_handler("notification", "notification.*", &self, NotificationStore::on_notification),
        ]
    }
}
