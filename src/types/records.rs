//! Durable record types persisted by the work queue.
//!
//! Three record kinds flow through the queue:
//!
//! - [`ActionRecord`]: one pending chat-side side effect, keyed so that
//!   redelivery of the same event derives the same key.
//! - [`RoomCreationRecord`]: a chat room that must exist before dependent
//!   actions can succeed. Persisted as a single JSON aggregate holding at
//!   most one record per room identity.
//! - [`CommandRecord`]: an administrative command serialized as
//!   `<projectKey>::<opt>=<val>::...` inside a durable set keyed by
//!   operation name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{ActionName, IssueKey, OperationName, ProjectKey, RecordKey};

/// One pending chat-side side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Deterministic key: `<action_name>_<event timestamp>`.
    pub key: RecordKey,
    /// Which executor action this record invokes.
    pub action_name: ActionName,
    /// Opaque payload handed to the executor unchanged.
    pub payload: serde_json::Value,
}

impl ActionRecord {
    /// Builds an action record for an event delivered at `timestamp`,
    /// deriving the deduplication key.
    pub fn new(action_name: ActionName, timestamp: u64, payload: serde_json::Value) -> Self {
        let key = RecordKey::derive(&action_name, timestamp);
        ActionRecord {
            key,
            action_name,
            payload,
        }
    }
}

/// The identity under which room-creation records are collapsed.
///
/// Issue key if present, else project key. Two records with the same identity
/// describe the same room; the later one wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomIdentity {
    Issue(IssueKey),
    Project(ProjectKey),
}

impl std::fmt::Display for RoomIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomIdentity::Issue(k) => write!(f, "{k}"),
            RoomIdentity::Project(k) => write!(f, "{k}"),
        }
    }
}

/// A chat room that must exist before other actions can target it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCreationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_key: Option<IssueKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_key: Option<ProjectKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub description_fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone_id: Option<u64>,
}

impl RoomCreationRecord {
    /// A minimal record synthesized during self-healing, when all we know is
    /// the issue key the failed action was targeting.
    pub fn for_issue(issue_key: IssueKey) -> Self {
        let project_key = Some(issue_key.project());
        RoomCreationRecord {
            issue_key: Some(issue_key),
            project_key,
            ..Default::default()
        }
    }

    /// Identity for aggregate collapsing: issue key if present, else project
    /// key. Records with neither are malformed and have no identity.
    pub fn identity(&self) -> Option<RoomIdentity> {
        if let Some(key) = &self.issue_key {
            return Some(RoomIdentity::Issue(key.clone()));
        }
        self.project_key
            .clone()
            .map(RoomIdentity::Project)
    }
}

/// Merges `incoming` into the aggregate, replacing any existing record with
/// the same identity (last write wins) while keeping the position of the
/// earlier record stable.
///
/// Records without an identity never match anything and are appended as-is.
pub fn merge_room_record(aggregate: &mut Vec<RoomCreationRecord>, incoming: RoomCreationRecord) {
    if let Some(identity) = incoming.identity() {
        if let Some(slot) = aggregate
            .iter_mut()
            .find(|r| r.identity().as_ref() == Some(&identity))
        {
            *slot = incoming;
            return;
        }
    }
    aggregate.push(incoming);
}

/// Errors from decoding a serialized administrative command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandDecodeError {
    #[error("empty command record")]
    Empty,

    #[error("option segment without '=': {0}")]
    MalformedOption(String),
}

/// An administrative command consumed from the durable command set.
///
/// The operation name comes from the set's key, not from the serialized
/// value; `raw` preserves the exact set member so it can be removed after
/// consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub operation: OperationName,
    pub project_key: ProjectKey,
    pub options: BTreeMap<String, String>,
    pub raw: String,
}

impl CommandRecord {
    /// Decodes `<projectKey>::<opt>=<val>::...` as stored in the command set.
    pub fn decode(operation: OperationName, raw: &str) -> Result<Self, CommandDecodeError> {
        let mut segments = raw.split("::");
        let project = segments.next().filter(|s| !s.is_empty());
        let project_key = match project {
            Some(p) => ProjectKey::new(p),
            None => return Err(CommandDecodeError::Empty),
        };

        let mut options = BTreeMap::new();
        for segment in segments {
            match segment.split_once('=') {
                Some((name, value)) => {
                    options.insert(name.to_string(), value.to_string());
                }
                None => return Err(CommandDecodeError::MalformedOption(segment.to_string())),
            }
        }

        Ok(CommandRecord {
            operation,
            project_key,
            options,
            raw: raw.to_string(),
        })
    }

    /// Encodes a command into its set-member form. Options are emitted in
    /// sorted order so encoding is deterministic.
    pub fn encode(project_key: &ProjectKey, options: &BTreeMap<String, String>) -> String {
        let mut out = project_key.as_str().to_string();
        for (name, value) in options {
            out.push_str("::");
            out.push_str(name);
            out.push('=');
            out.push_str(value);
        }
        out
    }
}

/// One unit of work derived from an accepted event.
///
/// Every accepted event yields exactly one `RoomCreation` item (with `None`
/// as the no-op marker when the event implies no room) plus zero or more
/// `Action` items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    RoomCreation(Option<RoomCreationRecord>),
    Action(ActionRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(s: &str) -> IssueKey {
        IssueKey::parse(s).unwrap()
    }

    mod room_merge {
        use super::*;

        #[test]
        fn same_issue_identity_last_write_wins() {
            let mut aggregate = vec![RoomCreationRecord {
                issue_key: Some(issue("REL-5")),
                summary: Some("first".into()),
                ..Default::default()
            }];

            merge_room_record(
                &mut aggregate,
                RoomCreationRecord {
                    issue_key: Some(issue("REL-5")),
                    summary: Some("second".into()),
                    ..Default::default()
                },
            );

            assert_eq!(aggregate.len(), 1);
            assert_eq!(aggregate[0].summary.as_deref(), Some("second"));
        }

        #[test]
        fn distinct_identities_coexist() {
            let mut aggregate = Vec::new();
            merge_room_record(&mut aggregate, RoomCreationRecord::for_issue(issue("A-1")));
            merge_room_record(&mut aggregate, RoomCreationRecord::for_issue(issue("A-2")));
            merge_room_record(
                &mut aggregate,
                RoomCreationRecord {
                    project_key: Some(ProjectKey::new("B")),
                    ..Default::default()
                },
            );
            assert_eq!(aggregate.len(), 3);
        }

        #[test]
        fn issue_identity_beats_project_identity() {
            // A record with an issue key never collapses with a project-only
            // record, even for the same project.
            let mut aggregate = vec![RoomCreationRecord {
                project_key: Some(ProjectKey::new("REL")),
                ..Default::default()
            }];
            merge_room_record(&mut aggregate, RoomCreationRecord::for_issue(issue("REL-5")));
            assert_eq!(aggregate.len(), 2);
        }

        #[test]
        fn merge_replaces_in_place() {
            let mut aggregate = Vec::new();
            merge_room_record(&mut aggregate, RoomCreationRecord::for_issue(issue("A-1")));
            merge_room_record(&mut aggregate, RoomCreationRecord::for_issue(issue("A-2")));

            let mut updated = RoomCreationRecord::for_issue(issue("A-1"));
            updated.summary = Some("updated".into());
            merge_room_record(&mut aggregate, updated);

            // A-1 keeps its original position
            assert_eq!(aggregate[0].issue_key, Some(issue("A-1")));
            assert_eq!(aggregate[0].summary.as_deref(), Some("updated"));
        }

        #[test]
        fn for_issue_fills_project_key() {
            let record = RoomCreationRecord::for_issue(issue("OPS-17"));
            assert_eq!(record.project_key, Some(ProjectKey::new("OPS")));
        }
    }

    mod command_codec {
        use super::*;
        use proptest::prelude::*;

        fn op() -> OperationName {
            OperationName::new("archiveproject")
        }

        #[test]
        fn decode_plain_project() {
            let cmd = CommandRecord::decode(op(), "REL").unwrap();
            assert_eq!(cmd.project_key.as_str(), "REL");
            assert!(cmd.options.is_empty());
            assert_eq!(cmd.raw, "REL");
        }

        #[test]
        fn decode_with_options() {
            let cmd = CommandRecord::decode(op(), "REL::status=Done::keepTimestamp=1").unwrap();
            assert_eq!(cmd.project_key.as_str(), "REL");
            assert_eq!(cmd.options.get("status").map(String::as_str), Some("Done"));
            assert_eq!(
                cmd.options.get("keepTimestamp").map(String::as_str),
                Some("1")
            );
        }

        #[test]
        fn decode_rejects_empty() {
            assert_eq!(
                CommandRecord::decode(op(), ""),
                Err(CommandDecodeError::Empty)
            );
        }

        #[test]
        fn decode_rejects_bare_option() {
            assert_eq!(
                CommandRecord::decode(op(), "REL::status"),
                Err(CommandDecodeError::MalformedOption("status".into()))
            );
        }

        #[test]
        fn value_may_contain_equals() {
            let cmd = CommandRecord::decode(op(), "REL::filter=a=b").unwrap();
            assert_eq!(cmd.options.get("filter").map(String::as_str), Some("a=b"));
        }

        proptest! {
            /// Encode then decode reproduces the project key and options.
            #[test]
            fn roundtrip(
                project in "[A-Z][A-Z0-9]{0,9}",
                options in prop::collection::btree_map(
                    "[a-zA-Z][a-zA-Z0-9]{0,15}",
                    "[a-zA-Z0-9 _.-]{0,20}",
                    0..5,
                ),
            ) {
                let project_key = ProjectKey::new(&project);
                let encoded = CommandRecord::encode(&project_key, &options);
                let decoded = CommandRecord::decode(op(), &encoded).unwrap();
                prop_assert_eq!(decoded.project_key, project_key);
                prop_assert_eq!(decoded.options, options);
                prop_assert_eq!(decoded.raw, encoded);
            }
        }
    }

    mod action_record {
        use super::*;

        #[test]
        fn serde_roundtrip() {
            let record = ActionRecord::new(
                ActionName::new("inviteNewMembers"),
                1_700_000_000_000,
                serde_json::json!({"issue": {"key": "REL-5"}}),
            );
            let json = serde_json::to_string(&record).unwrap();
            let parsed: ActionRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(record, parsed);
        }

        #[test]
        fn identical_events_derive_identical_keys() {
            let a = ActionRecord::new(ActionName::new("postComment"), 42, serde_json::json!({}));
            let b = ActionRecord::new(ActionName::new("postComment"), 42, serde_json::json!({}));
            assert_eq!(a.key, b.key);
        }
    }
}
