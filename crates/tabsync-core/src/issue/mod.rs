//! Issue events pushed by the dashboard server.

pub mod model;

use serde::Deserialize;

use crate::error::IntakeError;
use model::{IssueEventType, IssueSummary, PendingIssueEvent};

/// Payload of `created`, `updated`, `closed` and `deleted` events.
#[derive(Deserialize)]
struct WirePayload {
    #[serde(default)]
    issue: Option<IssueSummary>,
}

/// Parse the JSON payload of a qualifying event.
pub fn parse_issue_event(
    event_type: IssueEventType,
    data: &str,
) -> Result<PendingIssueEvent, IntakeError> {
    let payload: WirePayload = serde_json::from_str(data)?;
    let issue = payload.issue.ok_or(IntakeError::MissingIssueId)?;
    if issue.id.trim().is_empty() {
        return Err(IntakeError::MissingIssueId);
    }
    Ok(PendingIssueEvent::new(event_type, issue))
}
