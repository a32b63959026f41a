//! Issue event models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The slice of an issue that the server pushes with every event.
///
/// Only `id` is required. Fields this crate does not know about are kept
/// in `extra` so they survive relaying to other tabs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueSummary {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IssueSummary {
    /// A summary carrying only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            status: None,
            issue_type: None,
            priority: None,
            assignee: None,
            labels: Vec::new(),
            updated_at: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Issue event kinds carried by the push stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueEventType {
    Created,
    Updated,
    Closed,
    Deleted,
}

impl IssueEventType {
    /// Map an SSE event name. Non-issue events (`heartbeat`, ...) yield `None`.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "closed" => Some(Self::Closed),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Closed => "closed",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for IssueEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue event waiting for the debounce window to close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingIssueEvent {
    pub event_type: IssueEventType,
    pub issue: IssueSummary,
}

impl PendingIssueEvent {
    pub fn new(event_type: IssueEventType, issue: IssueSummary) -> Self {
        Self { event_type, issue }
    }

    pub fn issue_id(&self) -> &str {
        &self.issue.id
    }
}

/// A coalesced burst of issue events, delivered once per debounce window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchedUpdateNotification {
    /// Ids in the order they were first seen within the window.
    pub issue_ids: Vec<String>,
    /// Latest event per id, same order as `issue_ids`.
    pub events: Vec<PendingIssueEvent>,
    /// Every distinct event type seen, including overwritten ones.
    pub event_types: BTreeSet<IssueEventType>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl BatchedUpdateNotification {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn saw(&self, event_type: IssueEventType) -> bool {
        self.event_types.contains(&event_type)
    }
}
