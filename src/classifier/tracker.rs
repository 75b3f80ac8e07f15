//! Tracker-specific payload selectors and derivation rules.
//!
//! The classifier is written against [`TrackerParser`]; one struct per
//! tracker backend implements it, selected by configuration at startup.
//! Selectors are pure functions of the raw payload: they never touch the
//! store or the network.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::types::{ActionName, IssueKey, ProjectKey, RoomCreationRecord};

/// Pure selectors and derivation rules for one tracker backend.
pub trait TrackerParser: Send + Sync {
    /// The webhook-type marker, if the payload carries one.
    fn event_type<'a>(&self, event: &'a Value) -> Option<&'a str>;

    /// Delivery timestamp in tracker epoch milliseconds. Required for key
    /// derivation; events without it cannot be accepted.
    fn timestamp(&self, event: &Value) -> Option<u64>;

    /// Key of the affected issue, if any.
    fn issue_key(&self, event: &Value) -> Option<IssueKey>;

    /// Key of the affected project, if any.
    fn project_key(&self, event: &Value) -> Option<ProjectKey>;

    /// Issue-type name of the affected issue (for per-project ignore rules).
    fn issue_type(&self, event: &Value) -> Option<String>;

    /// Tracker login of the issue's creator.
    fn creator(&self, event: &Value) -> Option<String>;

    /// Tracker login of the comment's author, for comment events.
    fn comment_author(&self, event: &Value) -> Option<String>;

    /// True when this webhook type has no mapped handler.
    fn is_hook_type_ignored(&self, event: &Value) -> bool;

    /// Action names this event implies. Multiplicity, not mutual exclusion:
    /// one event may imply several actions.
    fn actions_for(&self, event: &Value) -> Vec<ActionName>;

    /// Room-creation record this event implies, or `None` when the event
    /// targets an existing room only.
    fn room_creation_for(&self, event: &Value) -> Option<RoomCreationRecord>;
}

/// Parser for Jira-style webhook payloads.
///
/// Recognized webhook types and the work they imply:
///
/// | `webhookEvent`        | room | actions                                |
/// |-----------------------|------|----------------------------------------|
/// | `jira:issue_created`  | yes  | `inviteNewMembers`                     |
/// | `jira:issue_updated`  | no   | `inviteNewMembers`, `postEpicUpdates`  |
/// | `comment_created`     | no   | `postComment`                          |
/// | `comment_updated`     | no   | `postComment`                          |
///
/// Everything else is a hook-type ignore.
#[derive(Debug, Clone, Default)]
pub struct JiraParser;

const ISSUE_CREATED: &str = "jira:issue_created";
const ISSUE_UPDATED: &str = "jira:issue_updated";
const COMMENT_CREATED: &str = "comment_created";
const COMMENT_UPDATED: &str = "comment_updated";

impl JiraParser {
    pub fn new() -> Self {
        JiraParser
    }

    fn issue<'a>(&self, event: &'a Value) -> Option<&'a Value> {
        event.get("issue")
    }

    fn fields<'a>(&self, event: &'a Value) -> Option<&'a Value> {
        self.issue(event)?.get("fields")
    }
}

impl TrackerParser for JiraParser {
    fn event_type<'a>(&self, event: &'a Value) -> Option<&'a str> {
        event.get("webhookEvent")?.as_str()
    }

    fn timestamp(&self, event: &Value) -> Option<u64> {
        event.get("timestamp")?.as_u64()
    }

    fn issue_key(&self, event: &Value) -> Option<IssueKey> {
        let raw = self.issue(event)?.get("key")?.as_str()?;
        IssueKey::parse(raw)
    }

    fn project_key(&self, event: &Value) -> Option<ProjectKey> {
        if let Some(key) = self
            .fields(event)
            .and_then(|f| f.get("project")?.get("key")?.as_str())
        {
            return Some(ProjectKey::new(key));
        }
        // Fall back to the project part of the issue key
        self.issue_key(event).map(|k| k.project())
    }

    fn issue_type(&self, event: &Value) -> Option<String> {
        let name = self
            .fields(event)?
            .get("issuetype")?
            .get("name")?
            .as_str()?;
        Some(name.to_string())
    }

    fn creator(&self, event: &Value) -> Option<String> {
        let name = self.fields(event)?.get("creator")?.get("name")?.as_str()?;
        Some(name.to_string())
    }

    fn comment_author(&self, event: &Value) -> Option<String> {
        let name = event.get("comment")?.get("author")?.get("name")?.as_str()?;
        Some(name.to_string())
    }

    fn is_hook_type_ignored(&self, event: &Value) -> bool {
        !matches!(
            self.event_type(event),
            Some(ISSUE_CREATED | ISSUE_UPDATED | COMMENT_CREATED | COMMENT_UPDATED)
        )
    }

    fn actions_for(&self, event: &Value) -> Vec<ActionName> {
        let names: &[&str] = match self.event_type(event) {
            Some(ISSUE_CREATED) => &["inviteNewMembers"],
            Some(ISSUE_UPDATED) => &["inviteNewMembers", "postEpicUpdates"],
            Some(COMMENT_CREATED | COMMENT_UPDATED) => &["postComment"],
            _ => &[],
        };
        names.iter().copied().map(ActionName::new).collect()
    }

    fn room_creation_for(&self, event: &Value) -> Option<RoomCreationRecord> {
        if self.event_type(event) != Some(ISSUE_CREATED) {
            return None;
        }
        let issue_key = self.issue_key(event)?;
        let fields = self.fields(event);

        let summary = fields
            .and_then(|f| f.get("summary")?.as_str())
            .map(String::from);

        let mut description_fields = BTreeMap::new();
        if let Some(type_name) = self.issue_type(event) {
            description_fields.insert("issueType".to_string(), type_name);
        }
        if let Some(priority) = fields.and_then(|f| f.get("priority")?.get("name")?.as_str()) {
            description_fields.insert("priority".to_string(), priority.to_string());
        }

        let milestone_id = fields.and_then(|f| f.get("milestone")?.get("id")?.as_u64());

        Some(RoomCreationRecord {
            project_key: self.project_key(event),
            issue_key: Some(issue_key),
            summary,
            description_fields,
            milestone_id,
        })
    }
}
