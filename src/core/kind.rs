use super::{ImpressionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Counter value at which the next impression triggers a durable flush.
///
/// A read of `9` means the current view is the 10th since the last flush.
pub const IMPRESSION_THRESHOLD: u64 = 9;

/// Amount added to the durable column per flush.
///
/// Always the fixed batch size, never the exact number of views observed.
pub const FLUSH_AMOUNT: i64 = 10;

/// Default number of flush units allowed inside the durable store at once.
pub const DEFAULT_WORKER_BUDGET: usize = 5;

/// Durable column holding the long-lived impression count.
pub const IMPRESSIONS_COLUMN: &str = "impressions";

/// The entity kinds that carry an impression counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Post,
    Project,
    Event,
    Opening,
    User,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Post,
        EntityKind::Project,
        EntityKind::Event,
        EntityKind::Opening,
        EntityKind::User,
    ];

    /// Prefix used in fast counter keys
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Post => "post",
            EntityKind::Project => "project",
            EntityKind::Event => "event",
            EntityKind::Opening => "opening",
            EntityKind::User => "user",
        }
    }

    /// Durable table owning the impressions column for this kind
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Post => "posts",
            EntityKind::Project => "projects",
            EntityKind::Event => "events",
            EntityKind::Opening => "openings",
            EntityKind::User => "users",
        }
    }

    pub fn counter_key(&self, entity_id: &str) -> CounterKey {
        CounterKey::new(*self, entity_id)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ImpressionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" | "posts" => Ok(EntityKind::Post),
            "project" | "projects" => Ok(EntityKind::Project),
            "event" | "events" => Ok(EntityKind::Event),
            "opening" | "openings" => Ok(EntityKind::Opening),
            "user" | "users" => Ok(EntityKind::User),
            _ => Err(ImpressionError::UnknownEntityKind(s.to_string())),
        }
    }
}

/// Fast counter store key, rendered as `<kind>:<entityID>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey(String);

impl CounterKey {
    pub fn new(kind: EntityKind, entity_id: &str) -> Self {
        Self(format!("{}:{}", kind.as_str(), entity_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CounterKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
