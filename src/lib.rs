// raft-log-core - the replicated log at the heart of a Raft consensus node.
//
// Three cooperating pieces, leaves first: the `storage` contract (a read-only view
// over a durable backend), the `unstable` tail (entries appended but not yet
// persisted), and `raft_log::RaftLog`, the coordinator that spans both and enforces
// Raft's log-matching and commit-index invariants. Election, messaging, and the
// tick loop live in the hosting consensus node, not here.

pub mod entry;
pub mod error;
pub mod logger;
pub mod raft_log;
pub mod storage;
pub mod unstable;

pub use entry::{ConfState, Entry, EntryType, HardState, Snapshot, SnapshotMetadata};
pub use error::{Error, Result};
pub use logger::{Logger, TracingLogger};
pub use raft_log::RaftLog;
pub use storage::{MemStorage, Storage, NO_LIMIT};
