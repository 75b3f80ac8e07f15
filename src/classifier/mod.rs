//! Event classification: decide disposition of one raw event and enumerate
//! the work it implies.
//!
//! Four independent ignore predicates are evaluated in order; the event is
//! ignored if any returns true:
//!
//! 1. Hook-type ignore (tracker-specific, no mapped handler)
//! 2. Manual per-project ignore (durable issue-type list per project)
//! 3. Self-authored comment ignore (prevents feedback loops)
//! 4. Test-mode creator filter (allow-list in test mode, deny-list otherwise)
//!
//! An accepted event always derives one room-creation work item (possibly the
//! no-op marker) plus zero or more action records. Classification failures
//! degrade to "ignored" and are logged; event loss on classifier failure is
//! safer than blocking the webhook response.

pub mod tracker;

use chrono::DateTime;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::queue::{QueueError, QueueHandler};
use crate::store::{KeySpace, Store, StoreError};
use crate::types::{ActionRecord, RecordKey, WorkItem};

pub use tracker::{JiraParser, TrackerParser};

/// Errors internal to classification. Never propagated to the event source;
/// `classify_and_enqueue` converts them into a logged `false`.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("ignore configuration is not valid JSON: {0}")]
    IgnoreConfig(#[from] serde_json::Error),

    /// The event carries no usable timestamp, so no record key can be
    /// derived for it.
    #[error("event carries no usable timestamp")]
    MissingTimestamp,
}

/// Which predicate caused an event to be ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    HookType,
    ProjectRule,
    OwnComment,
    CreatorFilter,
}

impl IgnoreReason {
    fn as_str(self) -> &'static str {
        match self {
            IgnoreReason::HookType => "hook_type",
            IgnoreReason::ProjectRule => "project_rule",
            IgnoreReason::OwnComment => "own_comment",
            IgnoreReason::CreatorFilter => "creator_filter",
        }
    }
}

/// Outcome of the ignore check, with the contributing signal for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreDecision {
    pub reason: Option<IgnoreReason>,
}

impl IgnoreDecision {
    pub fn ignored(&self) -> bool {
        self.reason.is_some()
    }
}

/// Bot identity and creator-filter configuration for the classifier.
#[derive(Debug, Clone, Default)]
pub struct ClassifierSettings {
    /// The bot's own tracker login; comments it authors are ignored.
    pub bot_user: String,

    /// Shadow-instance mode: accept only events from `test_users`.
    pub test_mode: bool,

    /// Allow-list of creators accepted in test mode.
    pub test_users: Vec<String>,

    /// Deny-list of creators rejected in normal mode.
    pub ignored_creators: Vec<String>,
}

/// The event classifier.
///
/// Holds its own store handle for reading per-project ignore configuration;
/// all work-item persistence goes through the queue, which exclusively owns
/// the durable collections.
pub struct HookParser<S, P> {
    store: S,
    keys: KeySpace,
    queue: QueueHandler<S>,
    parser: P,
    settings: ClassifierSettings,
}

impl<S: Store + Clone, P: TrackerParser> HookParser<S, P> {
    pub fn new(
        store: S,
        keys: KeySpace,
        queue: QueueHandler<S>,
        parser: P,
        settings: ClassifierSettings,
    ) -> Self {
        HookParser {
            store,
            keys,
            queue,
            parser,
            settings,
        }
    }

    /// Evaluates the four ignore predicates in order, short-circuiting on the
    /// first that fires.
    pub async fn is_ignored(&self, event: &Value) -> Result<IgnoreDecision, ClassifyError> {
        if self.parser.is_hook_type_ignored(event) {
            return Ok(IgnoreDecision {
                reason: Some(IgnoreReason::HookType),
            });
        }

        if self.project_rule_ignores(event).await? {
            return Ok(IgnoreDecision {
                reason: Some(IgnoreReason::ProjectRule),
            });
        }

        if self.parser.comment_author(event).as_deref() == Some(self.settings.bot_user.as_str()) {
            return Ok(IgnoreDecision {
                reason: Some(IgnoreReason::OwnComment),
            });
        }

        if self.creator_filter_ignores(event) {
            return Ok(IgnoreDecision {
                reason: Some(IgnoreReason::CreatorFilter),
            });
        }

        Ok(IgnoreDecision { reason: None })
    }

    /// Manual per-project ignore: the durable `ignore:<project>` key holds a
    /// JSON array of issue-type names an administrator configured.
    async fn project_rule_ignores(&self, event: &Value) -> Result<bool, ClassifyError> {
        let (Some(project), Some(issue_type)) = (
            self.parser.project_key(event),
            self.parser.issue_type(event),
        ) else {
            return Ok(false);
        };

        let Some(raw) = self.store.get(&self.keys.ignore_key(&project)).await? else {
            return Ok(false);
        };
        let ignored_types: Vec<String> = serde_json::from_str(&raw)?;
        Ok(ignored_types.iter().any(|t| t == &issue_type))
    }

    /// Test-mode creator filter. In test mode only creators on the allow-list
    /// are accepted (events without a creator are rejected); in normal mode
    /// creators on the deny-list are rejected.
    fn creator_filter_ignores(&self, event: &Value) -> bool {
        let creator = self.parser.creator(event);
        if self.settings.test_mode {
            return !creator.is_some_and(|c| self.settings.test_users.contains(&c));
        }
        creator.is_some_and(|c| self.settings.ignored_creators.contains(&c))
    }

    /// Enumerates the work an accepted event implies: always one room-creation
    /// item (the no-op marker when no room is implied), plus one action record
    /// per implied action.
    pub fn derive_work(&self, event: &Value) -> Result<Vec<WorkItem>, ClassifyError> {
        let timestamp = self
            .parser
            .timestamp(event)
            .ok_or(ClassifyError::MissingTimestamp)?;

        let mut items = vec![WorkItem::RoomCreation(self.parser.room_creation_for(event))];
        for action in self.parser.actions_for(event) {
            items.push(WorkItem::Action(ActionRecord::new(
                action,
                timestamp,
                event.clone(),
            )));
        }
        Ok(items)
    }

    /// Top-level entry: classify, persist, mark handled.
    ///
    /// Returns `false` for ignored events and for any internal failure (the
    /// failure is logged, never raised to the caller); `true` once all
    /// derived work items are durably persisted.
    pub async fn classify_and_enqueue(&self, event: &Value) -> bool {
        match self.classify(event).await {
            Ok(accepted) => accepted,
            Err(error) => {
                warn!(%error, "classification failed; event dropped");
                false
            }
        }
    }

    async fn classify(&self, event: &Value) -> Result<bool, ClassifyError> {
        let decision = self.is_ignored(event).await?;
        self.log_decision(event, &decision);
        if decision.ignored() {
            return Ok(false);
        }

        let items = self.derive_work(event)?;
        let mut new_keys: Vec<RecordKey> = Vec::new();
        for item in items {
            if let Some(key) = self.queue.save_incoming(item).await? {
                new_keys.push(key);
            }
        }
        // Mark the newly persisted keys handled so redelivery of the same
        // event is a no-op even after the records execute and are deleted.
        self.queue.mark_handled(&new_keys).await?;
        Ok(true)
    }

    /// Structured log of the decision and its contributing signals. Required
    /// for operability, not correctness.
    fn log_decision(&self, event: &Value, decision: &IgnoreDecision) {
        let event_type = self.parser.event_type(event).unwrap_or("unknown");
        let timestamp = self
            .parser
            .timestamp(event)
            .and_then(|ms| DateTime::from_timestamp_millis(ms as i64))
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        let issue = self
            .parser
            .issue_key(event)
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".to_string());

        match decision.reason {
            Some(reason) => debug!(
                event_type,
                %timestamp,
                issue,
                ignored = true,
                reason = reason.as_str(),
                "event classified"
            ),
            None => info!(event_type, %timestamp, issue, ignored = false, "event classified"),
        }
    }
}
