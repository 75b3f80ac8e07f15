//! Tracker Relay - bridges issue-tracker webhooks to durable chat-side work.
//!
//! Webhook deliveries are classified, deduplicated, and persisted into a
//! Redis-backed work queue; a coordinator drains the queue in serialized
//! cycles and hands each item to a pluggable executor.

pub mod classifier;
pub mod config;
pub mod executor;
pub mod fsm;
pub mod queue;
pub mod server;
pub mod store;
pub mod types;
