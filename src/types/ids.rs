//! Newtype wrappers for domain identifiers.
//!
//! These types prevent accidental mixing of different identifier kinds (e.g.
//! using an action name where an issue key is expected) and make the code
//! more self-documenting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An issue key in the tracker's `PROJ-123` format.
///
/// The project part is one or more ASCII alphanumerics starting with a letter,
/// followed by a dash and a numeric sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueKey(String);

impl IssueKey {
    /// Parses a string as an issue key, returning `None` if it does not match
    /// the `PROJ-123` shape.
    ///
    /// Used during self-healing to decide whether a room identity refers to an
    /// issue (and therefore can be checked for existence upstream) or to
    /// something else.
    pub fn parse(s: &str) -> Option<Self> {
        let (project, number) = s.rsplit_once('-')?;
        if project.is_empty() || number.is_empty() {
            return None;
        }
        let mut chars = project.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        if !chars.all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        if !number.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        Some(IssueKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the project portion of the key (`PROJ` for `PROJ-123`).
    pub fn project(&self) -> ProjectKey {
        // parse() guarantees a dash is present
        let project = self.0.rsplit_once('-').map(|(p, _)| p).unwrap_or(&self.0);
        ProjectKey::new(project)
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A tracker project key (`PROJ`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn new(s: impl Into<String>) -> Self {
        ProjectKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of a chat-side action the executor knows how to run
/// (e.g. `postComment`, `inviteNewMembers`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionName(String);

impl ActionName {
    pub fn new(s: impl Into<String>) -> Self {
        ActionName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The durable key of a pending action record.
///
/// Derived deterministically from the action name and the event timestamp so
/// that redelivery of the identical event produces the identical key. This is
/// the first layer of deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordKey(String);

impl RecordKey {
    /// Derives the record key for an action implied by an event delivered at
    /// `timestamp` (tracker epoch milliseconds).
    pub fn derive(action: &ActionName, timestamp: u64) -> Self {
        RecordKey(format!("{}_{}", action.as_str(), timestamp))
    }

    /// Wraps an already-derived key read back from the store.
    pub fn from_raw(s: impl Into<String>) -> Self {
        RecordKey(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The name of an administrative operation (e.g. `archiveproject`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationName(String);

impl OperationName {
    pub fn new(s: impl Into<String>) -> Self {
        OperationName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod issue_key {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parses_standard_keys(
                project in "[A-Z][A-Z0-9]{0,9}",
                number in 1u64..1_000_000,
            ) {
                let raw = format!("{project}-{number}");
                let key = IssueKey::parse(&raw).unwrap();
                prop_assert_eq!(key.as_str(), raw.as_str());
                let project_key = key.project();
                prop_assert_eq!(project_key.as_str(), project.as_str());
            }

            #[test]
            fn serde_roundtrip(project in "[A-Z]{2,5}", number in 1u64..100_000) {
                let key = IssueKey::parse(&format!("{project}-{number}")).unwrap();
                let json = serde_json::to_string(&key).unwrap();
                let parsed: IssueKey = serde_json::from_str(&json).unwrap();
                prop_assert_eq!(key, parsed);
            }

            #[test]
            fn rejects_plain_words(word in "[a-zA-Z]{1,20}") {
                prop_assert!(IssueKey::parse(&word).is_none());
            }
        }

        #[test]
        fn rejects_malformed_keys() {
            assert!(IssueKey::parse("").is_none());
            assert!(IssueKey::parse("-123").is_none());
            assert!(IssueKey::parse("PROJ-").is_none());
            assert!(IssueKey::parse("123-456").is_none());
            assert!(IssueKey::parse("PROJ-12a").is_none());
            assert!(IssueKey::parse("PR OJ-12").is_none());
        }

        #[test]
        fn accepts_digits_in_project_part() {
            let key = IssueKey::parse("SUB1-42").unwrap();
            assert_eq!(key.project().as_str(), "SUB1");
        }
    }

    mod record_key {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Identical (action, timestamp) pairs always derive identical keys.
            #[test]
            fn derivation_is_deterministic(
                action in "[a-zA-Z]{3,20}",
                timestamp: u64,
            ) {
                let name = ActionName::new(&action);
                let a = RecordKey::derive(&name, timestamp);
                let b = RecordKey::derive(&name, timestamp);
                prop_assert_eq!(a, b);
            }

            #[test]
            fn distinct_timestamps_derive_distinct_keys(
                action in "[a-zA-Z]{3,20}",
                t1: u64,
                t2: u64,
            ) {
                prop_assume!(t1 != t2);
                let name = ActionName::new(&action);
                prop_assert_ne!(RecordKey::derive(&name, t1), RecordKey::derive(&name, t2));
            }
        }

        #[test]
        fn derive_format() {
            let key = RecordKey::derive(&ActionName::new("postComment"), 1_700_000_000_000);
            assert_eq!(key.as_str(), "postComment_1700000000000");
        }
    }
}
