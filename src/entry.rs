use serde::{Deserialize, Serialize};

/// A single replicated-log record.
///
/// Entries are immutable once written: every field is set at construction and never
/// mutated afterwards. `index` is strictly positive and strictly increasing across the
/// log; `index == 0` is reserved to mean "none" at the call sites that compare against it
/// (see [`crate::raft_log::RaftLog::term`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub index: u64,
    pub term: u64,
    pub entry_type: EntryType,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn new(index: u64, term: u64, entry_type: EntryType, data: Vec<u8>) -> Self {
        Self {
            index,
            term,
            entry_type,
            data,
        }
    }

    /// Approximate encoded size, used by [`crate::raft_log::limit_size`] to bound
    /// how much of a slice is handed back to a caller.
    pub fn encoded_len(&self) -> u64 {
        (16 + self.data.len()) as u64
    }
}

/// What an entry represents. Opaque to this core: the payload inside `Entry::data` is
/// never inspected here, only carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Normal,
    ConfigChange,
}

/// Membership recorded alongside a snapshot or the initial storage state.
///
/// `voters_outgoing` and `learners` are carried for joint-consensus membership changes;
/// the log core never interprets them, it only plumbs them from `Storage::initial_state`
/// and `SnapshotMetadata::conf_state` to the out-of-scope role machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfState {
    pub voters: Vec<u64>,
    pub voters_outgoing: Vec<u64>,
    pub learners: Vec<u64>,
}

/// Hard (must-survive-a-restart) Raft state, vended by `Storage::initial_state`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardState {
    pub term: u64,
    pub vote: u64,
    pub commit: u64,
}

/// Metadata describing the log prefix a [`Snapshot`] collapses into state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub index: u64,
    pub term: u64,
    pub conf_state: ConfState,
}

/// A compacted representation of the log prefix up to and including `metadata`.
///
/// At most one pending snapshot is ever held by [`crate::unstable::Unstable`] at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.metadata.index == 0
    }
}
