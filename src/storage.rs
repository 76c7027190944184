//! The Storage contract (§4.1) and a reference in-memory implementation.
//!
//! `Storage` is a read-only view from the log core's perspective: the core never
//! writes through it directly, it only reads. A host node is expected to persist
//! entries and snapshots itself and advance its `Storage` accordingly, then tell
//! the core about it via [`crate::raft_log::RaftLog::stable_to`] and
//! [`crate::raft_log::RaftLog::stable_snap_to`].

use parking_lot::RwLock;
use std::sync::Arc;

use crate::entry::{ConfState, Entry, EntryType, HardState, Snapshot};
use crate::error::{Error, Result};

/// Read-only capability set the log core requires of a persistent backend.
///
/// Implementations must observe: `first_index`/`last_index` are non-decreasing across
/// successful compactions/appends respectively, and reads below the current
/// compaction horizon deterministically report [`Error::Compacted`]. The core's
/// behavior is undefined if these monotonicity guarantees are violated underneath it
/// (see the crate's concurrency notes).
pub trait Storage: Send + Sync {
    /// The hard state and conf state this storage was initialized with (or last told
    /// about). Called once, at [`crate::raft_log::RaftLog::new`].
    fn initial_state(&self) -> Result<(HardState, ConfState)>;

    /// Index of the first entry still available (one past the last compacted snapshot).
    fn first_index(&self) -> Result<u64>;

    /// Index of the last entry in storage.
    fn last_index(&self) -> Result<u64>;

    /// Term at `index`. `Err(Compacted)` if `index < first_index - 1`;
    /// `Err(Unavailable)` if `index > last_index`.
    fn term(&self, index: u64) -> Result<u64>;

    /// Entries in the half-open range `[lo, hi)`. May be truncated to honor
    /// `max_size` (an approximate encoded-byte budget; `u64::MAX` means unlimited),
    /// but must return at least one entry unless `lo == hi`.
    /// `Err(Compacted)` if `lo < first_index`; `Err(Unavailable)` if `hi > last_index + 1`.
    fn entries(&self, lo: u64, hi: u64, max_size: u64) -> Result<Vec<Entry>>;

    /// The current snapshot. `Err(SnapshotTemporarilyUnavailable)` while one is being built.
    fn snapshot(&self) -> Result<Snapshot>;
}

/// Sentinel for "no byte budget": keep every entry the range otherwise yields.
pub const NO_LIMIT: u64 = u64::MAX;

struct MemStorageCore {
    hard_state: HardState,
    conf_state: ConfState,
    snapshot: Snapshot,
    /// `entries[0]` is a dummy entry at `first_index() - 1`, carrying only the
    /// index/term of the compaction point; real entries start at `entries[1]`.
    entries: Vec<Entry>,
}

impl MemStorageCore {
    fn first_index(&self) -> u64 {
        self.entries[0].index + 1
    }

    fn last_index(&self) -> u64 {
        self.entries[0].index + self.entries.len() as u64 - 1
    }
}

/// A simple, thread-safe, in-memory [`Storage`] for tests and for host
/// applications that want to exercise the log core before wiring up a real
/// durable backend. Not intended for production use: it never persists anything.
#[derive(Clone)]
pub struct MemStorage {
    core: Arc<RwLock<MemStorageCore>>,
}

impl Default for MemStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStorage {
    pub fn new() -> Self {
        let core = MemStorageCore {
            hard_state: HardState::default(),
            conf_state: ConfState::default(),
            snapshot: Snapshot::default(),
            entries: vec![Entry::new(0, 0, EntryType::Normal, Vec::new())],
        };
        Self {
            core: Arc::new(RwLock::new(core)),
        }
    }

    /// Build storage pre-seeded with `entries` (indices must start at 1 and be
    /// contiguous) for tests that want a non-empty starting log.
    pub fn with_entries(entries: Vec<Entry>) -> Self {
        let storage = Self::new();
        if !entries.is_empty() {
            storage.core.write().entries.extend(entries);
        }
        storage
    }

    /// Append entries that are now considered durable. `entries[0].index` must be
    /// exactly `last_index() + 1` (this stub does not truncate or overwrite).
    pub fn append(&self, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut core = self.core.write();
        let expect = core.last_index() + 1;
        if entries[0].index != expect {
            return Err(Error::Unavailable);
        }
        core.entries.extend(entries.iter().cloned());
        Ok(())
    }

    /// Set the hard state a host has persisted.
    pub fn set_hard_state(&self, hard_state: HardState) {
        self.core.write().hard_state = hard_state;
    }

    /// Install `snapshot` as the current snapshot and discard any entries it
    /// covers, replacing the compacted prefix with a fresh dummy entry.
    pub fn apply_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        let mut core = self.core.write();
        let existing_index = core.snapshot.metadata.index;
        let incoming_index = snapshot.metadata.index;
        if incoming_index <= existing_index {
            return Err(Error::SnapOutOfDate);
        }

        core.entries = vec![Entry::new(
            snapshot.metadata.index,
            snapshot.metadata.term,
            EntryType::Normal,
            Vec::new(),
        )];
        core.conf_state = snapshot.metadata.conf_state.clone();
        core.snapshot = snapshot;
        Ok(())
    }

    /// Discard entries up to and including `compact_index`, folding them into
    /// the dummy entry. `compact_index` must be within `[first_index, last_index]`.
    pub fn compact(&self, compact_index: u64) -> Result<()> {
        let mut core = self.core.write();
        let first_index = core.first_index();
        if compact_index < first_index {
            return Err(Error::Compacted);
        }
        if compact_index > core.last_index() {
            return Err(Error::Unavailable);
        }
        let offset = (compact_index - core.entries[0].index) as usize;
        core.entries.drain(..offset);
        Ok(())
    }
}

impl Storage for MemStorage {
    fn initial_state(&self) -> Result<(HardState, ConfState)> {
        let core = self.core.read();
        Ok((core.hard_state.clone(), core.conf_state.clone()))
    }

    fn first_index(&self) -> Result<u64> {
        Ok(self.core.read().first_index())
    }

    fn last_index(&self) -> Result<u64> {
        Ok(self.core.read().last_index())
    }

    fn term(&self, index: u64) -> Result<u64> {
        let core = self.core.read();
        let dummy_index = core.entries[0].index;
        if index < dummy_index {
            return Err(Error::Compacted);
        }
        let offset = (index - dummy_index) as usize;
        core.entries
            .get(offset)
            .map(|e| e.term)
            .ok_or(Error::Unavailable)
    }

    fn entries(&self, lo: u64, hi: u64, max_size: u64) -> Result<Vec<Entry>> {
        let core = self.core.read();
        let first_index = core.first_index();
        if lo < first_index {
            return Err(Error::Compacted);
        }
        if hi > core.last_index() + 1 {
            return Err(Error::Unavailable);
        }

        let dummy_index = core.entries[0].index;
        let lo_offset = (lo - dummy_index) as usize;
        let hi_offset = (hi - dummy_index) as usize;
        let slice = &core.entries[lo_offset..hi_offset];

        Ok(crate::raft_log::limit_size(slice, max_size))
    }

    fn snapshot(&self) -> Result<Snapshot> {
        Ok(self.core.read().snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_storage_reports_dummy_bounds() {
        let storage = MemStorage::new();
        assert_eq!(storage.first_index().unwrap(), 1);
        assert_eq!(storage.last_index().unwrap(), 0);
        assert_eq!(storage.term(0).unwrap(), 0);
    }

    #[test]
    fn append_rejects_non_contiguous_entries() {
        let storage = MemStorage::new();
        let bad = Entry::new(5, 1, EntryType::Normal, vec![]);
        assert!(storage.append(&[bad]).is_err());
    }

    #[test]
    fn term_reports_compacted_below_dummy() {
        let storage = MemStorage::new();
        storage
            .append(&[Entry::new(1, 1, EntryType::Normal, vec![])])
            .unwrap();
        storage.compact(1).unwrap();
        assert_eq!(storage.term(0), Err(Error::Compacted));
        assert_eq!(storage.term(1).unwrap(), 1);
    }

    #[test]
    fn entries_honors_max_size_but_returns_at_least_one() {
        let storage = MemStorage::new();
        storage
            .append(&[
                Entry::new(1, 1, EntryType::Normal, vec![0; 100]),
                Entry::new(2, 1, EntryType::Normal, vec![0; 100]),
            ])
            .unwrap();
        let got = storage.entries(1, 3, 1).unwrap();
        assert_eq!(got.len(), 1);
    }
}
