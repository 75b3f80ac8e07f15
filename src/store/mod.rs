//! Durable store interface and key namespace layout.
//!
//! The pipeline issues primitive key/value, list, and set operations against
//! a Redis-compatible store. All durable collections live under a single
//! configurable prefix so several deployments can share one store:
//!
//! ```text
//! <prefix>:rooms            - room-creation aggregate (one JSON array value)
//! <prefix>:handled          - list of completed action record keys
//! <prefix>:commands:<op>    - set of pending administrative commands
//! <prefix>:ignore:<project> - per-project ignored issue types (JSON array)
//! <prefix>:<record key>     - one pending action record each
//! ```
//!
//! Everything under the prefix that is not a reserved sub-key is an action
//! record; [`KeySpace::record_key_of`] is the namespace predicate that makes
//! that distinction.

use std::future::Future;

use thiserror::Error;

use crate::types::{OperationName, ProjectKey, RecordKey};

pub mod memory;
pub mod redis;

pub use memory::InMemoryStore;
pub use redis::RedisStore;

/// Errors from the durable store.
///
/// Store errors abort the current drain cycle; the next triggered cycle
/// retries from the last durably-written state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing Redis connection failed.
    #[error("store backend error: {0}")]
    Backend(#[from] ::redis::RedisError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Primitive operations the pipeline needs from a durable store.
///
/// No transactions are assumed across calls; the pipeline tolerates
/// interleavings because drain cycles are serialized and it is the sole
/// writer of these keys.
pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    /// Sets a value with a per-key expiry in seconds. A TTL of zero behaves
    /// like [`Store::set`].
    fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Returns all keys matching a glob pattern. Only trailing-`*` patterns
    /// are required by the pipeline.
    fn keys_matching(&self, pattern: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn list_append(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    fn list_all(&self, key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn set_add(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_remove(&self, key: &str, value: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_all(&self, key: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Deployment namespace: derives every store key the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

const ROOMS: &str = "rooms";
const HANDLED: &str = "handled";
const COMMANDS: &str = "commands:";
const IGNORE: &str = "ignore:";

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        KeySpace {
            prefix: prefix.into(),
        }
    }

    fn qualify(&self, rest: &str) -> String {
        format!("{}:{}", self.prefix, rest)
    }

    /// Key of the room-creation aggregate.
    pub fn rooms_key(&self) -> String {
        self.qualify(ROOMS)
    }

    /// Key of the handled-record-keys list.
    pub fn handled_key(&self) -> String {
        self.qualify(HANDLED)
    }

    /// Key of the administrative command set for one operation.
    pub fn command_key(&self, operation: &OperationName) -> String {
        self.qualify(&format!("{COMMANDS}{}", operation.as_str()))
    }

    /// Key of the per-project ignore configuration.
    pub fn ignore_key(&self, project: &ProjectKey) -> String {
        self.qualify(&format!("{IGNORE}{}", project.as_str()))
    }

    /// Store key under which one action record is persisted.
    pub fn action_key(&self, key: &RecordKey) -> String {
        self.qualify(key.as_str())
    }

    /// Pattern matching every key in this deployment's namespace.
    pub fn scan_pattern(&self) -> String {
        format!("{}:*", self.prefix)
    }

    /// Namespace predicate: extracts the record key from a scanned store key,
    /// or `None` if the key is reserved (rooms, handled, commands, ignore
    /// config) or outside this namespace.
    pub fn record_key_of(&self, store_key: &str) -> Option<RecordKey> {
        let rest = store_key
            .strip_prefix(&self.prefix)
            .and_then(|r| r.strip_prefix(':'))?;
        if rest.is_empty()
            || rest == ROOMS
            || rest == HANDLED
            || rest.starts_with(COMMANDS)
            || rest.starts_with(IGNORE)
        {
            return None;
        }
        Some(RecordKey::from_raw(rest))
    }
}
