//! Topic patterns for subscriptions.
//!
//! Patterns and event types are split on `.`. A pattern matches when both have
//! the same number of segments and each pattern segment is either `*` (exactly
//! one arbitrary segment) or equal to the event's segment. There is no
//! multi-level wildcard: `task.*` matches `task.created` but not
//! `task.sub.created`.

use thiserror::Error;

const WILDCARD: &str = "*";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("subscription pattern must not be empty")]
    Empty,

    #[error("subscription pattern {0:?} contains an empty segment")]
    EmptySegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Any,
    Literal(String),
}

/// A parsed, validated subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl TopicPattern {
    pub fn parse(raw: impl Into<String>) -> Result<Self, PatternError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let segments = raw
            .split('.')
            .map(|s| match s {
                "" => Err(PatternError::EmptySegment(raw.clone())),
                WILDCARD => Ok(Segment::Any),
                literal => Ok(Segment::Literal(literal.to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { raw, segments })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn matches(&self, event_type: &str) -> bool {
        let mut parts = event_type.split('.');
        for segment in &self.segments {
            match (segment, parts.next()) {
                (Segment::Any, Some(_)) => {}
                (Segment::Literal(expected), Some(part)) if expected == part => {}
                _ => return false,
            }
        }
        parts.next().is_none()
    }
}

impl core::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl core::str::FromStr for TopicPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One-off check without keeping the parsed pattern around.
pub fn topic_matches(pattern: &str, event_type: &str) -> bool {
    TopicPattern::parse(pattern).is_ok_and(|p| p.matches(event_type))
}
