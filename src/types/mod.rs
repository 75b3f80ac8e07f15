//! Core domain types.

pub mod ids;
pub mod records;

pub use ids::{ActionName, IssueKey, OperationName, ProjectKey, RecordKey};
pub use records::{
    ActionRecord, CommandDecodeError, CommandRecord, RoomCreationRecord, RoomIdentity, WorkItem,
    merge_room_record,
};
