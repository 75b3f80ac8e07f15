//! Collaborator traits for chat-side and tracker-side effects.
//!
//! The pipeline never performs a side effect itself; it hands action names
//! and payloads to an [`ActionExecutor`] and asks a [`TrackerApi`] whether an
//! issue still exists upstream. Concrete Matrix/Slack executors and
//! Jira/Gitlab clients implement these traits; tests substitute mocks.

use std::collections::BTreeMap;
use std::future::Future;

use thiserror::Error;

use crate::types::{ActionName, CommandRecord, IssueKey, RoomCreationRecord};

/// Errors returned by the action executor.
///
/// `RoomNotFound` is a typed contract between the executor and the work
/// queue: it carries the missing room's identity so the queue can decide
/// between self-healing re-enqueue and permanent deletion without sniffing
/// error text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecuteError {
    /// The room the action targets does not exist (yet).
    #[error("target room not found: {room_id}")]
    RoomNotFound { room_id: String },

    /// Any other failure; retried optimistically on the next cycle.
    #[error("action failed: {0}")]
    Failed(String),
}

/// Outcome of one sub-item of an administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Succeeded,
    Skipped(String),
    Failed(String),
}

/// Per-sub-item results of an administrative command.
///
/// Administrative operations fan out over many rooms; partial failure is
/// reported here rather than through `ExecuteError` because the command
/// record is consumed regardless of how many sub-items succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandReport {
    pub outcomes: BTreeMap<String, CommandOutcome>,
}

impl CommandReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, CommandOutcome::Failed(_)))
            .count()
    }
}

/// Executes chat-side effects.
pub trait ActionExecutor: Send + Sync {
    /// Runs one named action with its persisted payload.
    fn run(
        &self,
        action: &ActionName,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), ExecuteError>> + Send;

    /// The synthetic "create room" action used by drain step 1.
    fn create_room(
        &self,
        record: &RoomCreationRecord,
    ) -> impl Future<Output = Result<(), ExecuteError>> + Send;

    /// Runs one administrative command, returning per-sub-item outcomes.
    fn run_command(
        &self,
        command: &CommandRecord,
    ) -> impl Future<Output = Result<CommandReport, ExecuteError>> + Send;
}

impl<X: ActionExecutor + ?Sized> ActionExecutor for std::sync::Arc<X> {
    fn run(
        &self,
        action: &ActionName,
        payload: &serde_json::Value,
    ) -> impl Future<Output = Result<(), ExecuteError>> + Send {
        (**self).run(action, payload)
    }

    fn create_room(
        &self,
        record: &RoomCreationRecord,
    ) -> impl Future<Output = Result<(), ExecuteError>> + Send {
        (**self).create_room(record)
    }

    fn run_command(
        &self,
        command: &CommandRecord,
    ) -> impl Future<Output = Result<CommandReport, ExecuteError>> + Send {
        (**self).run_command(command)
    }
}

/// Error from an upstream tracker lookup.
#[derive(Debug, Error)]
#[error("tracker request failed: {0}")]
pub struct TrackerError(pub String);

/// Upstream tracker existence check, used only during self-healing.
pub trait TrackerApi: Send + Sync {
    fn issue_exists(
        &self,
        issue: &IssueKey,
    ) -> impl Future<Output = Result<bool, TrackerError>> + Send;
}

impl<X: TrackerApi + ?Sized> TrackerApi for std::sync::Arc<X> {
    fn issue_exists(
        &self,
        issue: &IssueKey,
    ) -> impl Future<Output = Result<bool, TrackerError>> + Send {
        (**self).issue_exists(issue)
    }
}

/// Executor that logs effects without performing them.
///
/// Used when no chat backend is configured, so the pipeline can run end to
/// end in dry-run mode.
#[derive(Debug, Clone, Default)]
pub struct LoggingExecutor;

impl ActionExecutor for LoggingExecutor {
    async fn run(
        &self,
        action: &ActionName,
        _payload: &serde_json::Value,
    ) -> Result<(), ExecuteError> {
        tracing::info!(action = %action, "dry-run: action not executed");
        Ok(())
    }

    async fn create_room(&self, record: &RoomCreationRecord) -> Result<(), ExecuteError> {
        tracing::info!(identity = ?record.identity(), "dry-run: room not created");
        Ok(())
    }

    async fn run_command(&self, command: &CommandRecord) -> Result<CommandReport, ExecuteError> {
        tracing::info!(
            operation = %command.operation,
            project = %command.project_key,
            "dry-run: command not executed"
        );
        Ok(CommandReport::default())
    }
}

/// Tracker that reports every issue as existing.
///
/// The dry-run counterpart of [`LoggingExecutor`]: with it, self-healing
/// never deletes a record on the word of an unconfigured backend.
#[derive(Debug, Clone, Default)]
pub struct AlwaysExistsTracker;

impl TrackerApi for AlwaysExistsTracker {
    async fn issue_exists(&self, _issue: &IssueKey) -> Result<bool, TrackerError> {
        Ok(true)
    }
}
