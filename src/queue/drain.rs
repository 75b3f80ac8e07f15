//! The drain cycle: one full pass over all three durable collections.
//!
//! Order within a cycle matters: room creations are fully resolved before
//! action records are scanned, so a room created in step 1 is available to an
//! action executed in step 2 of the same cycle. Action records themselves
//! have no relative ordering guarantee.
//!
//! Failure semantics: a store error aborts the cycle (the caller logs it and
//! the next trigger retries from the last durably-written state); executor
//! failures are local to one item and never abort the cycle.

use tracing::{debug, info, warn};

use crate::executor::{ActionExecutor, ExecuteError, TrackerApi};
use crate::store::Store;
use crate::types::{
    ActionRecord, CommandRecord, IssueKey, OperationName, RoomCreationRecord,
};

use super::{QueueHandler, Result};

/// Administrative operations the drain consumes. Adding an operation means
/// adding its name here and an arm in the executor.
const KNOWN_OPERATIONS: &[&str] = &["archiveproject"];

/// Counters from one drain cycle, logged and asserted on in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Rooms whose creation succeeded this cycle.
    pub rooms_created: usize,
    /// Rooms whose creation failed and remain in the aggregate.
    pub rooms_pending: usize,
    /// Action records executed and deleted.
    pub actions_executed: usize,
    /// Action records left in place for the next cycle.
    pub actions_retried: usize,
    /// Action records deleted without execution (issue gone, or corrupt).
    pub actions_dropped: usize,
    /// Room-creation records synthesized by self-healing.
    pub rooms_healed: usize,
    /// Administrative command records consumed.
    pub commands_consumed: usize,
}

impl<S: Store> QueueHandler<S> {
    /// Runs one drain cycle: rooms, then actions, then administrative
    /// commands.
    pub async fn drain<E, T>(&self, executor: &E, tracker: &T) -> Result<DrainSummary>
    where
        E: ActionExecutor,
        T: TrackerApi,
    {
        let mut summary = DrainSummary::default();
        self.drain_rooms(executor, &mut summary).await?;
        self.drain_actions(executor, tracker, &mut summary).await?;
        self.drain_commands(executor, &mut summary).await?;
        info!(?summary, "drain cycle complete");
        Ok(summary)
    }

    /// Step 1: attempt every pending room creation; keep only the failures.
    async fn drain_rooms<E: ActionExecutor>(
        &self,
        executor: &E,
        summary: &mut DrainSummary,
    ) -> Result<()> {
        let rooms = self.load_rooms().await?;
        if rooms.is_empty() {
            return Ok(());
        }

        let mut still_pending = Vec::new();
        for record in rooms {
            match executor.create_room(&record).await {
                Ok(()) => {
                    summary.rooms_created += 1;
                    debug!(identity = ?record.identity(), "room created");
                }
                Err(error) => {
                    warn!(identity = ?record.identity(), %error, "room creation failed; kept");
                    still_pending.push(record);
                }
            }
        }
        summary.rooms_pending = still_pending.len();
        self.store_rooms(&still_pending).await
    }

    /// Step 2: scan the namespace for action records and execute each one.
    ///
    /// Self-healing decision tree for a typed room-not-found failure:
    /// - identity parses as an issue key and the issue still exists: a
    ///   room-creation record is synthesized and the action is retried next
    ///   cycle;
    /// - the issue no longer exists: the action can never succeed and is
    ///   deleted;
    /// - anything else: the action is left unchanged and retried
    ///   optimistically.
    ///
    /// Synthesized records are merged into the aggregate only after the scan
    /// completes, so they are attempted starting with the next cycle.
    async fn drain_actions<E, T>(
        &self,
        executor: &E,
        tracker: &T,
        summary: &mut DrainSummary,
    ) -> Result<()>
    where
        E: ActionExecutor,
        T: TrackerApi,
    {
        let store = self.store();
        let keys = self.keys();
        let mut healed: Vec<RoomCreationRecord> = Vec::new();

        for store_key in store.keys_matching(&keys.scan_pattern()).await? {
            let Some(record_key) = keys.record_key_of(&store_key) else {
                continue;
            };
            // The key may have expired or raced with a concurrent delete
            let Some(raw) = store.get(&store_key).await? else {
                continue;
            };
            let record: ActionRecord = match serde_json::from_str(&raw) {
                Ok(record) => record,
                Err(error) => {
                    warn!(key = %record_key, %error, "corrupt action record; deleted");
                    store.delete(&store_key).await?;
                    summary.actions_dropped += 1;
                    continue;
                }
            };

            match executor.run(&record.action_name, &record.payload).await {
                Ok(()) => {
                    store.delete(&store_key).await?;
                    summary.actions_executed += 1;
                    debug!(key = %record_key, action = %record.action_name, "action executed");
                }
                Err(ExecuteError::RoomNotFound { room_id }) => match IssueKey::parse(&room_id) {
                    Some(issue) => match tracker.issue_exists(&issue).await {
                        Ok(true) => {
                            info!(key = %record_key, %issue, "room missing; re-enqueueing creation");
                            healed.push(RoomCreationRecord::for_issue(issue));
                            summary.actions_retried += 1;
                        }
                        Ok(false) => {
                            info!(key = %record_key, %issue, "issue gone upstream; action deleted");
                            store.delete(&store_key).await?;
                            summary.actions_dropped += 1;
                        }
                        Err(error) => {
                            warn!(key = %record_key, %issue, %error, "existence check failed; kept");
                            summary.actions_retried += 1;
                        }
                    },
                    None => {
                        warn!(key = %record_key, room_id, "room identity is not an issue key; kept");
                        summary.actions_retried += 1;
                    }
                },
                Err(error) => {
                    warn!(key = %record_key, action = %record.action_name, %error, "action failed; kept");
                    summary.actions_retried += 1;
                }
            }
        }

        if !healed.is_empty() {
            summary.rooms_healed = healed.len();
            self.merge_into_rooms(healed).await?;
        }
        Ok(())
    }

    /// Step 3: consume every administrative command exactly once, regardless
    /// of the outcome of the underlying multi-room operation.
    async fn drain_commands<E: ActionExecutor>(
        &self,
        executor: &E,
        summary: &mut DrainSummary,
    ) -> Result<()> {
        let store = self.store();
        for op in KNOWN_OPERATIONS {
            let operation = OperationName::new(*op);
            let set_key = self.keys().command_key(&operation);

            for raw in store.set_all(&set_key).await? {
                match CommandRecord::decode(operation.clone(), &raw) {
                    Ok(command) => match executor.run_command(&command).await {
                        Ok(report) => {
                            info!(
                                operation = %operation,
                                project = %command.project_key,
                                outcomes = report.outcomes.len(),
                                failed = report.failed_count(),
                                "administrative command executed"
                            );
                        }
                        Err(error) => {
                            warn!(operation = %operation, raw, %error, "administrative command failed");
                        }
                    },
                    Err(error) => {
                        warn!(operation = %operation, raw, %error, "undecodable command record");
                    }
                }
                // Removed unconditionally: administrative operations are
                // best-effort and never retried at this layer.
                store.set_remove(&set_key, &raw).await?;
                summary.commands_consumed += 1;
            }
        }
        Ok(())
    }
}
