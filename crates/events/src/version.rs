//! Semantic versions attached to event schemas.
//!
//! Versions are compared lexicographically on `(major, minor, patch)`. A
//! consumer built against `a` can read an event written at `b` when both share
//! a major line and `a` is not older than `b`.

use core::cmp::Ordering;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version format {input:?}: {reason}")]
    InvalidFormat { input: String, reason: &'static str },

    #[error("cannot bump {component} of {version}: component at maximum")]
    Overflow {
        version: EventVersion,
        component: &'static str,
    },
}

/// Schema version of an event (`major.minor.patch`).
///
/// Field order matters: the derived `Ord` is the lexicographic order the bus
/// relies on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// Which component [`EventVersion::increment`] bumps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VersionBump {
    Major,
    Minor,
    Patch,
}

/// Outcome of [`is_compatible`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Compatibility {
    pub compatible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migration_path: Option<String>,
}

impl Compatibility {
    fn compatible() -> Self {
        Self {
            compatible: true,
            reason: None,
            migration_path: None,
        }
    }

    fn incompatible(reason: String, from: EventVersion, to: EventVersion) -> Self {
        Self {
            compatible: false,
            reason: Some(reason),
            migration_path: Some(format!("{from} -> {to}")),
        }
    }
}

impl EventVersion {
    pub const INITIAL: EventVersion = EventVersion::new(1, 0, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse exactly three dot-separated non-negative integers.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = |reason| VersionError::InvalidFormat {
            input: input.to_string(),
            reason,
        };

        let parts: Vec<&str> = input.split('.').collect();
        if parts.len() != 3 {
            return Err(invalid("expected major.minor.patch"));
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid("components must be non-negative integers"));
            }
            *slot = part
                .parse()
                .map_err(|_| invalid("component out of range"))?;
        }

        Ok(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    /// Next version after a change of the given kind.
    ///
    /// Bumping a component resets every less significant one to zero. A
    /// component already at `u32::MAX` cannot be bumped.
    pub fn increment(self, bump: VersionBump) -> Result<Self, VersionError> {
        let overflow = |component| VersionError::Overflow {
            version: self,
            component,
        };
        match bump {
            VersionBump::Major => self
                .major
                .checked_add(1)
                .map(|major| Self::new(major, 0, 0))
                .ok_or_else(|| overflow("major")),
            VersionBump::Minor => self
                .minor
                .checked_add(1)
                .map(|minor| Self::new(self.major, minor, 0))
                .ok_or_else(|| overflow("minor")),
            VersionBump::Patch => self
                .patch
                .checked_add(1)
                .map(|patch| Self::new(self.major, self.minor, patch))
                .ok_or_else(|| overflow("patch")),
        }
    }
}

impl Default for EventVersion {
    fn default() -> Self {
        Self::INITIAL
    }
}

/// Lexicographic comparison on `(major, minor, patch)`.
pub fn compare(a: &EventVersion, b: &EventVersion) -> Ordering {
    a.cmp(b)
}

/// Can a consumer at `consumer` handle an event written at `publisher`?
///
/// Incompatible across a major boundary, and incompatible when the consumer is
/// older than the publisher within the same major line.
pub fn is_compatible(consumer: &EventVersion, publisher: &EventVersion) -> Compatibility {
    if consumer.major != publisher.major {
        let (from, to) = if consumer < publisher {
            (*consumer, *publisher)
        } else {
            (*publisher, *consumer)
        };
        return Compatibility::incompatible(
            format!(
                "major version mismatch ({} vs {})",
                consumer.major, publisher.major
            ),
            from,
            to,
        );
    }

    if compare(consumer, publisher) == Ordering::Less {
        return Compatibility::incompatible(
            format!("version {consumer} is older than {publisher}"),
            *consumer,
            *publisher,
        );
    }

    Compatibility::compatible()
}

impl core::fmt::Display for EventVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for EventVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EventVersion {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventVersion> for String {
    fn from(value: EventVersion) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(major: u32, minor: u32, patch: u32) -> EventVersion {
        EventVersion::new(major, minor, patch)
    }

    #[test]
    fn parses_three_components() {
        assert_eq!(EventVersion::parse("1.2.3").unwrap(), v(1, 2, 3));
        assert_eq!(EventVersion::parse("0.0.0").unwrap(), v(0, 0, 0));
    }

    #[test]
    fn rejects_malformed_versions() {
        for bad in ["", "1", "1.2", "1.2.3.4", "1..3", "a.b.c", "-1.0.0", "1.0.0-beta", " 1.0.0"] {
            match EventVersion::parse(bad) {
                Err(VersionError::InvalidFormat { input, .. }) => assert_eq!(input, bad),
                Ok(parsed) => panic!("{bad:?} unexpectedly parsed as {parsed}"),
                Err(other) => panic!("{bad:?} produced unexpected error {other}"),
            }
        }
    }

    #[test]
    fn rejects_components_beyond_u32() {
        assert!(EventVersion::parse("4294967296.0.0").is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert_eq!(compare(&v(1, 0, 0), &v(0, 9, 9)), Ordering::Greater);
        assert_eq!(compare(&v(1, 2, 0), &v(1, 10, 0)), Ordering::Less);
        assert_eq!(compare(&v(1, 2, 3), &v(1, 2, 3)), Ordering::Equal);
    }

    #[test]
    fn major_mismatch_is_incompatible_with_migration_hint() {
        let c = is_compatible(&v(1, 4, 0), &v(2, 0, 0));
        assert!(!c.compatible);
        assert_eq!(c.reason.as_deref(), Some("major version mismatch (1 vs 2)"));
        assert_eq!(c.migration_path.as_deref(), Some("1.4.0 -> 2.0.0"));

        let newer_consumer = is_compatible(&v(3, 0, 0), &v(2, 5, 1));
        assert!(!newer_consumer.compatible);
        assert_eq!(newer_consumer.migration_path.as_deref(), Some("2.5.1 -> 3.0.0"));
    }

    #[test]
    fn older_consumer_is_incompatible() {
        let c = is_compatible(&v(1, 2, 0), &v(1, 3, 0));
        assert!(!c.compatible);
        assert_eq!(c.migration_path.as_deref(), Some("1.2.0 -> 1.3.0"));
    }

    #[test]
    fn same_or_newer_consumer_is_compatible() {
        assert!(is_compatible(&v(1, 3, 0), &v(1, 3, 0)).compatible);
        assert!(is_compatible(&v(1, 5, 2), &v(1, 3, 9)).compatible);
        assert_eq!(is_compatible(&v(1, 5, 2), &v(1, 3, 9)).reason, None);
    }

    #[test]
    fn increment_resets_lower_components() {
        let base = v(1, 2, 3);
        assert_eq!(base.increment(VersionBump::Major), Ok(v(2, 0, 0)));
        assert_eq!(base.increment(VersionBump::Minor), Ok(v(1, 3, 0)));
        assert_eq!(base.increment(VersionBump::Patch), Ok(v(1, 2, 4)));
    }

    #[test]
    fn increment_at_component_maximum_is_an_error() {
        let top = EventVersion::parse("4294967295.0.0").unwrap();
        assert_eq!(
            top.increment(VersionBump::Major),
            Err(VersionError::Overflow {
                version: top,
                component: "major"
            })
        );
        // lower components can still move
        assert_eq!(top.increment(VersionBump::Minor), Ok(v(u32::MAX, 1, 0)));

        let patch_top = v(1, 2, u32::MAX);
        assert!(patch_top.increment(VersionBump::Patch).is_err());
        assert_eq!(patch_top.increment(VersionBump::Minor), Ok(v(1, 3, 0)));
        assert!(v(1, u32::MAX, 0).increment(VersionBump::Minor).is_err());
    }

    #[test]
    fn serializes_as_dotted_string() {
        let json = serde_json::to_string(&v(2, 1, 0)).unwrap();
        assert_eq!(json, "\"2.1.0\"");
        let back: EventVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v(2, 1, 0));
        assert!(serde_json::from_str::<EventVersion>("\"2.1\"").is_err());
    }

    fn any_version() -> impl Strategy<Value = EventVersion> {
        (any::<u32>(), any::<u32>(), any::<u32>()).prop_map(|(a, b, c)| v(a, b, c))
    }

    proptest! {
        #[test]
        fn parse_inverts_display(version in any_version()) {
            prop_assert_eq!(EventVersion::parse(&version.to_string()).unwrap(), version);
        }

        #[test]
        fn compare_is_antisymmetric_and_reflexive(a in any_version(), b in any_version()) {
            prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
            prop_assert_eq!(compare(&a, &a), Ordering::Equal);
        }

        #[test]
        fn a_version_is_compatible_with_itself(a in any_version()) {
            prop_assert!(is_compatible(&a, &a).compatible);
        }
    }
}
