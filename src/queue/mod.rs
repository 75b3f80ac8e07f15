//! Durable work queue: idempotent enqueue and the drain cycle.
//!
//! The queue exclusively owns four durable collections:
//!
//! - the room-creation aggregate (one JSON array value),
//! - the pending action records (one key each in the namespace),
//! - the administrative command sets (one per operation name),
//! - the handled-keys list used for deduplication.
//!
//! No other component reads or writes these keys.

mod drain;

pub use drain::DrainSummary;

use thiserror::Error;
use tracing::{debug, warn};

use crate::store::{KeySpace, Store, StoreError};
use crate::types::{RecordKey, RoomCreationRecord, WorkItem, merge_room_record};

/// Errors from queue operations.
///
/// Store errors abort the enclosing drain cycle; JSON errors indicate a
/// corrupted record and are handled locally where possible.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("record serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Owns the durable collections and executes drain cycles over them.
#[derive(Debug, Clone)]
pub struct QueueHandler<S> {
    store: S,
    keys: KeySpace,
    /// TTL applied to persisted action records, in seconds. Zero disables
    /// expiry.
    record_ttl_secs: u64,
}

impl<S: Store> QueueHandler<S> {
    pub fn new(store: S, keys: KeySpace, record_ttl_secs: u64) -> Self {
        QueueHandler {
            store,
            keys,
            record_ttl_secs,
        }
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Persists one derived work item.
    ///
    /// Room-creation records are merged into the aggregate by identity (last
    /// write wins); they never produce a record key. Action records are
    /// persisted under their derived key unless that key is already pending
    /// or already handled; the key is returned only when newly persisted.
    pub async fn save_incoming(&self, item: WorkItem) -> Result<Option<RecordKey>> {
        match item {
            WorkItem::RoomCreation(None) => Ok(None),
            WorkItem::RoomCreation(Some(record)) => {
                self.merge_into_rooms(vec![record]).await?;
                Ok(None)
            }
            WorkItem::Action(record) => {
                if self.is_handled(&record.key).await? {
                    debug!(key = %record.key, "action record already handled; skipped");
                    return Ok(None);
                }
                let store_key = self.keys.action_key(&record.key);
                if self.store.get(&store_key).await?.is_some() {
                    debug!(key = %record.key, "action record already pending; skipped");
                    return Ok(None);
                }
                let value = serde_json::to_string(&record)?;
                self.store
                    .set_with_expiry(&store_key, &value, self.record_ttl_secs)
                    .await?;
                Ok(Some(record.key))
            }
        }
    }

    /// Appends record keys to the handled list. A key on this list is never
    /// re-persisted, even if the identical event is delivered again.
    pub async fn mark_handled(&self, keys: &[RecordKey]) -> Result<()> {
        let handled_key = self.keys.handled_key();
        for key in keys {
            self.store.list_append(&handled_key, key.as_str()).await?;
        }
        Ok(())
    }

    async fn is_handled(&self, key: &RecordKey) -> Result<bool> {
        let handled = self.store.list_all(&self.keys.handled_key()).await?;
        Ok(handled.iter().any(|k| k == key.as_str()))
    }

    /// Reads the room-creation aggregate. A missing key is an empty aggregate.
    pub(crate) async fn load_rooms(&self) -> Result<Vec<RoomCreationRecord>> {
        let Some(raw) = self.store.get(&self.keys.rooms_key()).await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(rooms) => Ok(rooms),
            Err(error) => {
                // A corrupted aggregate can never drain; start over rather
                // than wedging every future cycle.
                warn!(%error, "room aggregate is not valid JSON; resetting");
                self.store.delete(&self.keys.rooms_key()).await?;
                Ok(Vec::new())
            }
        }
    }

    /// Writes the aggregate back, deleting the key entirely when empty.
    pub(crate) async fn store_rooms(&self, rooms: &[RoomCreationRecord]) -> Result<()> {
        let key = self.keys.rooms_key();
        if rooms.is_empty() {
            self.store.delete(&key).await?;
        } else {
            let value = serde_json::to_string(rooms)?;
            self.store.set(&key, &value).await?;
        }
        Ok(())
    }

    /// Merges records into the persisted aggregate, last write wins per
    /// identity.
    pub(crate) async fn merge_into_rooms(&self, records: Vec<RoomCreationRecord>) -> Result<()> {
        let mut aggregate = self.load_rooms().await?;
        for record in records {
            merge_room_record(&mut aggregate, record);
        }
        self.store_rooms(&aggregate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{ActionName, ActionRecord, IssueKey};
    use serde_json::json;

    fn queue() -> (QueueHandler<InMemoryStore>, InMemoryStore, KeySpace) {
        let store = InMemoryStore::new();
        let keys = KeySpace::new("relay");
        (
            QueueHandler::new(store.clone(), keys.clone(), 0),
            store,
            keys,
        )
    }

    fn issue(s: &str) -> IssueKey {
        IssueKey::parse(s).unwrap()
    }

    fn action(name: &str, timestamp: u64) -> ActionRecord {
        ActionRecord::new(ActionName::new(name), timestamp, json!({"n": name}))
    }

    #[tokio::test]
    async fn noop_room_marker_persists_nothing() {
        let (queue, store, keys) = queue();
        let result = queue
            .save_incoming(WorkItem::RoomCreation(None))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(store.get(&keys.rooms_key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn room_records_collapse_by_identity() {
        let (queue, _, _) = queue();

        let mut first = RoomCreationRecord::for_issue(issue("REL-1"));
        first.summary = Some("first".into());
        let mut second = RoomCreationRecord::for_issue(issue("REL-1"));
        second.summary = Some("second".into());

        queue
            .save_incoming(WorkItem::RoomCreation(Some(first)))
            .await
            .unwrap();
        queue
            .save_incoming(WorkItem::RoomCreation(Some(second)))
            .await
            .unwrap();

        let rooms = queue.load_rooms().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].summary.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn action_enqueue_returns_key_once() {
        let (queue, store, keys) = queue();
        let record = action("postComment", 100);

        let first = queue
            .save_incoming(WorkItem::Action(record.clone()))
            .await
            .unwrap();
        assert_eq!(first, Some(record.key.clone()));

        // Identical redelivery while still pending
        let second = queue
            .save_incoming(WorkItem::Action(record.clone()))
            .await
            .unwrap();
        assert_eq!(second, None);

        // Exactly one persisted record
        let stored = store
            .get(&keys.action_key(&record.key))
            .await
            .unwrap()
            .unwrap();
        let parsed: ActionRecord = serde_json::from_str(&stored).unwrap();
        assert_eq!(parsed, record);
    }

    #[tokio::test]
    async fn handled_keys_suppress_reenqueue_after_completion() {
        let (queue, store, keys) = queue();
        let record = action("postComment", 100);

        let key = queue
            .save_incoming(WorkItem::Action(record.clone()))
            .await
            .unwrap()
            .unwrap();
        queue.mark_handled(&[key.clone()]).await.unwrap();

        // Simulate successful execution: the pending key is deleted
        store.delete(&keys.action_key(&key)).await.unwrap();

        // Redelivery after completion must not re-persist
        let result = queue
            .save_incoming(WorkItem::Action(record.clone()))
            .await
            .unwrap();
        assert_eq!(result, None);
        assert_eq!(store.get(&keys.action_key(&key)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_aggregate_deletes_its_key() {
        let (queue, store, keys) = queue();
        queue
            .save_incoming(WorkItem::RoomCreation(Some(RoomCreationRecord::for_issue(
                issue("REL-1"),
            ))))
            .await
            .unwrap();
        assert!(store.get(&keys.rooms_key()).await.unwrap().is_some());

        queue.store_rooms(&[]).await.unwrap();
        assert_eq!(store.get(&keys.rooms_key()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupted_aggregate_resets_instead_of_wedging() {
        let (queue, store, keys) = queue();
        store.set(&keys.rooms_key(), "not json").await.unwrap();

        let rooms = queue.load_rooms().await.unwrap();
        assert!(rooms.is_empty());
        assert_eq!(store.get(&keys.rooms_key()).await.unwrap(), None);
    }
}
