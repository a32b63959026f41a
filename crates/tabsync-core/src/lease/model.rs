//! Lease domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::elapsed;

/// The claim a leader tab keeps refreshed under the lease key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub owner_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn new(owner_id: impl Into<String>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            owner_id: owner_id.into(),
            acquired_at,
        }
    }

    /// A record older than the TTL belongs to a tab that stopped renewing.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        elapsed(self.acquired_at, now) > ttl
    }

    pub fn is_owned_by(&self, tab_id: &str) -> bool {
        self.owner_id == tab_id
    }
}

/// The role a tab holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Holds the live connection.
    Leader,
    /// Relies on mirrored broadcasts.
    Follower,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Leader => "leader",
            Self::Follower => "follower",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
