//! Bus configuration.

use std::time::Duration;

use tracing::warn;

use crate::id::IdStrategy;

/// Default bound on a single handler invocation.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Priority given to subscriptions that don't specify one.
pub const DEFAULT_PRIORITY: i32 = 5;

/// What the bus does when a subscription's declared version cannot read an
/// event's schema version.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum VersionCheck {
    Off,
    /// Log and invoke anyway.
    #[default]
    Warn,
    /// Skip the handler and report it as incompatible.
    Enforce,
}

impl core::str::FromStr for VersionCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(VersionCheck::Off),
            "warn" => Ok(VersionCheck::Warn),
            "enforce" => Ok(VersionCheck::Enforce),
            other => Err(format!("unknown version check mode: {other}")),
        }
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusConfig {
    /// Upper bound for one handler; exceeding it is a handler-level failure.
    pub handler_timeout: Duration,
    pub default_priority: i32,
    pub id_strategy: IdStrategy,
    pub version_check: VersionCheck,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
            default_priority: DEFAULT_PRIORITY,
            id_strategy: IdStrategy::default(),
            version_check: VersionCheck::default(),
        }
    }
}

impl EventBusConfig {
    pub const ENV_HANDLER_TIMEOUT_MS: &'static str = "KEYSTONE_HANDLER_TIMEOUT_MS";
    pub const ENV_DEFAULT_PRIORITY: &'static str = "KEYSTONE_DEFAULT_PRIORITY";
    pub const ENV_ID_STRATEGY: &'static str = "KEYSTONE_EVENT_ID_STRATEGY";
    pub const ENV_VERSION_CHECK: &'static str = "KEYSTONE_VERSION_CHECK";

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    pub fn with_version_check(mut self, mode: VersionCheck) -> Self {
        self.version_check = mode;
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults;
    /// unparsable values are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = parsed::<u64>(&lookup, Self::ENV_HANDLER_TIMEOUT_MS) {
            config.handler_timeout = Duration::from_millis(ms);
        }
        if let Some(priority) = parsed::<i32>(&lookup, Self::ENV_DEFAULT_PRIORITY) {
            config.default_priority = priority;
        }
        if let Some(strategy) = parsed::<IdStrategy>(&lookup, Self::ENV_ID_STRATEGY) {
            if strategy == IdStrategy::Custom {
                warn!(key = Self::ENV_ID_STRATEGY, "custom id strategy needs code; keeping default");
            } else {
                config.id_strategy = strategy;
            }
        }
        if let Some(mode) = parsed::<VersionCheck>(&lookup, Self::ENV_VERSION_CHECK) {
            config.version_check = mode;
        }

        config
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring invalid configuration value");
            None
        }
    }
}
