//! Audit collector: records every event the bus dispatches.
//!
//! Patterns match a fixed number of segments, so the collector registers one
//! all-wildcard pattern per topic depth (`*`, `*.*`, ...) up to
//! [`AuditCollector::max_depth`], at priority 0 so it runs before other
//! consumers. Deeper topics reach no audit handler; the bus reports them through
//! `EventBus::unrouted_event_types` and a warning. Durable storage is an
//! external concern; the collector keeps a bounded in-memory buffer and exports
//! NDJSON.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::debug;

use keystone_events::{Consumer, DomainEvent, HandlerError, HandlerSpec};

pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;
pub const DEFAULT_AUDIT_DEPTH: usize = 8;
pub const AUDIT_GROUP: &str = "audit";

const AUDIT_PRIORITY: i32 = 0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub event_id: String,
    pub event_type: String,
    pub tenant_id: Option<String>,
    pub cross_tenant: bool,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    pub source: String,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    /// The event in its JSON wire form.
    pub event: JsonValue,
}

#[derive(Debug)]
pub struct AuditCollector {
    records: RwLock<VecDeque<AuditRecord>>,
    capacity: usize,
    max_depth: usize,
    evicted: AtomicU64,
}

/// `*`, `*.*`, ... one pattern per depth from 1 to `max_depth`.
pub fn audit_patterns(max_depth: usize) -> Vec<String> {
    (1..=max_depth.max(1))
        .map(|depth| vec!["*"; depth].join("."))
        .collect()
}

impl AuditCollector {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            max_depth: DEFAULT_AUDIT_DEPTH,
            evicted: AtomicU64::new(0),
        }
    }

    /// Deepest topic (in segments) the collector subscribes to. At least 1.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn record(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let wire = event
            .to_json()
            .map_err(|e| HandlerError::payload(e.to_string()))?;
        let metadata = event.metadata();

        let record = AuditRecord {
            event_id: event.event_id().to_string(),
            event_type: event.event_type().to_string(),
            tenant_id: metadata.tenant_id.clone(),
            cross_tenant: metadata.allow_cross_tenant,
            aggregate_type: event.aggregate_type().map(str::to_string),
            aggregate_id: event.aggregate_id().map(str::to_string),
            source: metadata.source.clone(),
            correlation_id: metadata.correlation_id.clone(),
            causation_id: metadata.causation_id.clone(),
            occurred_at: event.timestamp(),
            recorded_at: Utc::now(),
            event: wire,
        };

        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.len() == self.capacity {
            records.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        records.push_back(record);
        Ok(())
    }

    /// Oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn records_for_tenant(&self, tenant_id: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|r| r.tenant_id.as_deref() == Some(tenant_id))
            .cloned()
            .collect()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|r| r.event_id == event_id)
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records dropped because the buffer was full.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    /// One JSON record per line, oldest first.
    pub fn export_ndjson(&self) -> Result<String, serde_json::Error> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut out = String::new();
        for record in records.iter() {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Default for AuditCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Consumer for AuditCollector {
    fn group(&self) -> &str {
        AUDIT_GROUP
    }

    fn tags(&self) -> BTreeSet<String> {
        BTreeSet::from(["audit".to_string(), "compliance".to_string()])
    }

    fn handlers(self: Arc<Self>) -> Vec<HandlerSpec> {
        audit_patterns(self.max_depth)
            .into_iter()
            .map(|pattern| {
                let collector = self.clone();
                HandlerSpec::new(format!("audit {pattern}"), pattern, move |event: Arc<DomainEvent>| {
                    let collector = collector.clone();
                    async move {
                        collector.record(&event)?;
                        debug!(event_id = %event.event_id(), "event audited");
                        Ok::<(), HandlerError>(())
                    }
                })
                .priority(AUDIT_PRIORITY)
            })
            .collect()
    }
}
