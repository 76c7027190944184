//! The Log coordinator (§4.3): the public surface spanning [`crate::storage::Storage`]
//! and [`crate::unstable::Unstable`].

use std::sync::Arc;

use crate::entry::Entry;
use crate::error::{Error, Result};
use crate::logger::{Logger, TracingLogger};
use crate::storage::{Storage, NO_LIMIT};
use crate::unstable::Unstable;

/// Owns a [`Storage`] reference and an [`Unstable`] tail, and tracks the
/// `committed`/`applied` cursors. Every log query routes through here.
///
/// Invariants maintained across the lifetime of a `RaftLog`:
/// - `first_index() <= committed + 1`
/// - `first_index() - 1 <= applied <= committed <= last_index()`
/// - every index in `[first_index(), last_index()]` has exactly one defined term
pub struct RaftLog<S: Storage> {
    storage: S,
    unstable: Unstable,
    committed: u64,
    applied: u64,
    logger: Arc<dyn Logger>,
}

impl<S: Storage> RaftLog<S> {
    /// Construct a coordinator over `storage`, which must already report consistent
    /// first/last indices. `committed` and `applied` both initialize to
    /// `first_index - 1`; the unstable tail starts empty with `offset = last_index + 1`.
    pub fn new(storage: S) -> Self {
        Self::with_logger(storage, Arc::new(TracingLogger))
    }

    pub fn with_logger(storage: S, logger: Arc<dyn Logger>) -> Self {
        let first_index = storage
            .first_index()
            .unwrap_or_else(|e| logger.fatal(&format!("get first index failed: {e}")));
        let last_index = storage
            .last_index()
            .unwrap_or_else(|e| logger.fatal(&format!("get last index failed: {e}")));

        Self {
            storage,
            unstable: Unstable::new(last_index + 1, logger.clone()),
            committed: first_index - 1,
            applied: first_index - 1,
            logger,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    // ---- queries ------------------------------------------------------

    pub fn first_index(&self) -> u64 {
        if let Some(i) = self.unstable.maybe_first_index() {
            return i;
        }
        self.storage
            .first_index()
            .unwrap_or_else(|e| self.logger.fatal(&format!("first index error: {e}")))
    }

    pub fn last_index(&self) -> u64 {
        if let Some(i) = self.unstable.maybe_last_index() {
            return i;
        }
        self.storage
            .last_index()
            .unwrap_or_else(|e| self.logger.fatal(&format!("last index error: {e}")))
    }

    /// Term at `index`. Returns `Ok(0)` silently when `index` lies outside
    /// `[first_index - 1, last_index]` — there is no "not found" error for this query,
    /// by design (see §4.3).
    pub fn term(&self, index: u64) -> Result<u64> {
        let dummy_index = self.first_index().saturating_sub(1);
        if index < dummy_index || index > self.last_index() {
            return Ok(0);
        }

        if let Some(t) = self.unstable.maybe_term(index) {
            return Ok(t);
        }

        match self.storage.term(index) {
            Ok(t) => Ok(t),
            Err(e @ (Error::Compacted | Error::Unavailable)) => Err(e),
            Err(e) => self.logger.fatal(&format!("term error: {e}")),
        }
    }

    /// `term(last_index())`. Fatal on failure: `last_index` must always be addressable.
    pub fn last_term(&self) -> u64 {
        self.term(self.last_index())
            .unwrap_or_else(|e| self.logger.fatal(&format!("unexpected error getting last term: {e}")))
    }

    pub fn match_term(&self, index: u64, term: u64) -> bool {
        self.term(index) == Ok(term)
    }

    /// Raft §5.4 election-safety comparison: is a candidate with `(last_index, last_term)`
    /// at least as up to date as this log?
    pub fn is_up_to_date(&self, last_index: u64, last_term: u64) -> bool {
        let our_last_term = self.last_term();
        last_term > our_last_term || (last_term == our_last_term && last_index >= self.last_index())
    }

    // ---- append path ----------------------------------------------------

    /// Append `entries` to the unstable tail. Fatal if the first entry's index is
    /// `<= committed` (would rewrite committed history). Returns the new `last_index()`.
    pub fn append(&mut self, entries: &[Entry]) -> u64 {
        if entries.is_empty() {
            return self.last_index();
        }

        let after = entries[0].index - 1;
        if after < self.committed {
            self.logger.fatal(&format!(
                "after({after}) is out of range [committed({})]",
                self.committed
            ));
        }

        self.unstable.truncate_and_append(entries);
        self.last_index()
    }

    /// Walk `entries`, returning the index of the first one whose `(index, term)`
    /// does not match the current log. `0` if every entry matches, or if every entry
    /// matches and some extend past `last_index()` the index of the first new one
    /// — see §4.3 for the full case breakdown, which is identical to the `0` case
    /// textually but distinguished by whether `index <= last_index()`.
    pub fn find_conflict(&self, entries: &[Entry]) -> u64 {
        for entry in entries {
            if !self.match_term(entry.index, entry.term) {
                if entry.index <= self.last_index() {
                    let existing = zero_term_on_err_compacted(self.term(entry.index), &self.logger);
                    self.logger.info(&format!(
                        "found conflict at index {} [existing term: {existing}, conflicting term: {}]",
                        entry.index, entry.term
                    ));
                }
                return entry.index;
            }
        }
        0
    }

    /// Raft AppendEntries consistency check. Returns `0` if `prev_index`/`prev_term`
    /// do not match this log (reject); otherwise appends any genuinely new entries,
    /// advances `committed` to `min(leader_commit, last_new_index)`, and returns
    /// `last_new_index`.
    pub fn maybe_append(
        &mut self,
        prev_index: u64,
        prev_term: u64,
        leader_commit: u64,
        entries: &[Entry],
    ) -> u64 {
        if !self.match_term(prev_index, prev_term) {
            return 0;
        }

        let last_new_index = prev_index + entries.len() as u64;
        let conflict_index = self.find_conflict(entries);

        if conflict_index != 0 {
            if conflict_index <= self.committed {
                self.logger.fatal(&format!(
                    "entry {conflict_index} conflicts with committed entry [committed({})]",
                    self.committed
                ));
            }
            let offset = prev_index + 1;
            self.append(&entries[(conflict_index - offset) as usize..]);
        }

        self.commit_to(leader_commit.min(last_new_index));
        last_new_index
    }

    // ---- commit / apply cursors ----------------------------------------

    /// No-op if `index <= committed`; fatal if `index > last_index()`.
    pub fn commit_to(&mut self, index: u64) {
        if index <= self.committed {
            return;
        }
        if self.last_index() < index {
            self.logger.fatal(&format!(
                "to_commit({index}) is out of range [last_index({})]. Was the log corrupted, truncated, or lost?",
                self.last_index()
            ));
        }
        self.committed = index;
    }

    /// If `max_index > committed` and the term at `max_index` (treating a compacted
    /// term as `0`) equals `term`, advance `committed` to `max_index` and return `true`.
    pub fn maybe_commit(&mut self, max_index: u64, term: u64) -> bool {
        let observed = zero_term_on_err_compacted(self.term(max_index), &self.logger);
        if max_index > self.committed && observed == term {
            self.commit_to(max_index);
            true
        } else {
            false
        }
    }

    /// `index == 0` is a no-op; fatal if `index > committed` or `index < applied`.
    pub fn applied_to(&mut self, index: u64) {
        if index == 0 {
            return;
        }
        if index > self.committed || index < self.applied {
            self.logger.fatal(&format!(
                "applied({index}) is out of range [prev applied({}), committed({})]",
                self.applied, self.committed
            ));
        }
        self.applied = index;
    }

    pub fn stable_to(&mut self, index: u64, term: u64) {
        self.unstable.stable_to(index, term);
    }

    pub fn stable_snap_to(&mut self, index: u64) {
        self.unstable.stable_snap_to(index);
    }

    // ---- read paths -------------------------------------------------------

    /// Entries from `from` to `last_index()`, inclusive, bounded by `max_size`.
    /// Empty when `from > last_index()`.
    pub fn entries(&self, from: u64, max_size: u64) -> Result<Vec<Entry>> {
        let last = self.last_index();
        if from > last {
            return Ok(Vec::new());
        }
        self.slice(from, last + 1, max_size)
    }

    /// All entries currently in the log. Retries once the compaction that raced
    /// with us has settled, bounded by `first_index()` having strictly advanced;
    /// any other failure, or a `first_index()` that does not advance, is fatal.
    pub fn all_entries(&self) -> Vec<Entry> {
        let mut floor = self.first_index();
        loop {
            match self.entries(floor, NO_LIMIT) {
                Ok(entries) => return entries,
                Err(Error::Compacted) => {
                    let new_floor = self.first_index();
                    if new_floor <= floor {
                        self.logger.fatal(
                            "all_entries: compaction reported but first_index did not advance",
                        );
                    }
                    floor = new_floor;
                }
                Err(e) => self.logger.fatal(&format!("all_entries fatal: {e}")),
            }
        }
    }

    /// Committed-but-not-yet-applied entries.
    pub fn next_entries(&self) -> Vec<Entry> {
        let offset = (self.applied + 1).max(self.first_index());
        if self.committed + 1 <= offset {
            return Vec::new();
        }
        self.slice(offset, self.committed + 1, NO_LIMIT)
            .unwrap_or_else(|e| {
                self.logger
                    .fatal(&format!("unexpected error getting unapplied entries: {e}"))
            })
    }

    /// Fast-path predicate mirroring [`RaftLog::next_entries`]'s emptiness check,
    /// without slicing.
    pub fn has_next_entries(&self) -> bool {
        self.committed + 1 > (self.applied + 1).max(self.first_index())
    }

    /// The raw buffered (not-yet-stable) tail, for the unstable half of a `Ready` batch.
    pub fn unstable_entries(&self) -> &[Entry] {
        self.unstable.entries()
    }

    pub fn snapshot(&self) -> Result<crate::entry::Snapshot> {
        if let Some(snapshot) = self.unstable.snapshot() {
            return Ok(snapshot.clone());
        }
        self.storage.snapshot()
    }

    // ---- the core slice algorithm -----------------------------------------

    /// The only read that spans the stable/unstable boundary. See §4.3 for the
    /// full five-step algorithm this implements.
    pub fn slice(&self, lo: u64, hi: u64, max_size: u64) -> Result<Vec<Entry>> {
        self.must_check_out_of_bounds(lo, hi)?;

        if lo == hi {
            return Ok(Vec::new());
        }

        let unstable_offset = self.unstable.offset();
        let mut entries = Vec::new();

        if lo < unstable_offset {
            match self.storage.entries(lo, hi.min(unstable_offset), max_size) {
                Ok(stable) => {
                    let requested = hi.min(unstable_offset) - lo;
                    let got_fewer = (stable.len() as u64) < requested;
                    entries = stable;
                    if got_fewer {
                        // storage truncated the range for us (max_size); do not
                        // splice in unstable entries on top of a short read.
                        return Ok(entries);
                    }
                }
                Err(Error::Compacted) => return Err(Error::Compacted),
                Err(Error::Unavailable) => self.logger.fatal(&format!(
                    "entries[{lo}:{}) is unavailable from storage",
                    hi.min(unstable_offset)
                )),
                Err(e) => self.logger.fatal(&format!("storage entries error: {e}")),
            }
        }

        if hi > unstable_offset {
            let unstable_slice = self.unstable.slice(lo.max(unstable_offset), hi);
            if entries.is_empty() {
                entries = unstable_slice;
            } else {
                entries.extend(unstable_slice);
            }
        }

        Ok(limit_size(&entries, max_size))
    }

    fn must_check_out_of_bounds(&self, lo: u64, hi: u64) -> Result<()> {
        if lo > hi {
            self.logger.fatal(&format!("invalid slice {lo} > {hi}"));
        }

        let first_index = self.first_index();
        if lo < first_index {
            return Err(Error::Compacted);
        }

        let last_index = self.last_index();
        if hi > last_index + 1 {
            self.logger.fatal(&format!(
                "slice[{lo},{hi}) out of bound [{first_index},{last_index}]"
            ));
        }

        Ok(())
    }

    // ---- snapshot restore ---------------------------------------------

    /// Update `committed = snapshot.metadata.index` and delegate to
    /// `Unstable::restore`. Existing stable entries are logically shadowed by the
    /// new `first_index`; the host is expected to compact `Storage` accordingly
    /// once the snapshot is persisted.
    pub fn restore(&mut self, snapshot: crate::entry::Snapshot) {
        self.logger.info(&format!(
            "log starts to restore snapshot [index: {}, term: {}]",
            snapshot.metadata.index, snapshot.metadata.term
        ));
        self.committed = snapshot.metadata.index;
        self.unstable.restore(snapshot);
    }
}

/// Maps `(term, error)` to: `term` on success, `0` on [`Error::Compacted`], fatal
/// otherwise. A missing term on a compacted prefix is semantically "no such term"
/// for comparison purposes (log matching, conflict reporting).
pub fn zero_term_on_err_compacted(result: Result<u64>, logger: &Arc<dyn Logger>) -> u64 {
    match result {
        Ok(t) => t,
        Err(Error::Compacted) => 0,
        Err(e) => logger.fatal(&format!("unexpected error: {e}")),
    }
}

/// Keep at least the first entry of `entries`, then keep successive entries as
/// long as their cumulative encoded size does not exceed `max_size`.
pub fn limit_size(entries: &[Entry], max_size: u64) -> Vec<Entry> {
    if entries.is_empty() || max_size == NO_LIMIT {
        return entries.to_vec();
    }

    let mut size = entries[0].encoded_len();
    let mut count = 1;
    for entry in &entries[1..] {
        size += entry.encoded_len();
        if size > max_size {
            break;
        }
        count += 1;
    }
    entries[..count].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryType, Snapshot, SnapshotMetadata};
    use crate::storage::MemStorage;
    use std::panic::{self, AssertUnwindSafe};

    fn entry(index: u64, term: u64) -> Entry {
        Entry::new(index, term, EntryType::Normal, vec![])
    }

    fn new_log() -> RaftLog<MemStorage> {
        RaftLog::new(MemStorage::new())
    }

    #[test]
    fn fresh_append_then_commit() {
        let mut log = new_log();
        assert_eq!(log.append(&[entry(1, 1), entry(2, 1), entry(3, 1)]), 3);
        assert!(log.maybe_commit(3, 1));
        assert_eq!(log.committed(), 3);
        assert_eq!(log.next_entries(), vec![entry(1, 1), entry(2, 1), entry(3, 1)]);
        log.applied_to(3);
        assert!(!log.has_next_entries());
    }

    #[test]
    fn conflict_on_append_overwrites_tail() {
        let mut log = new_log();
        log.append(&[entry(1, 1), entry(2, 1), entry(3, 1)]);
        log.maybe_commit(3, 1);

        let last_new = log.maybe_append(1, 1, 3, &[entry(2, 2), entry(3, 2), entry(4, 2)]);
        assert_eq!(last_new, 4);
        assert_eq!(log.term(2).unwrap(), 2);
        assert_eq!(log.term(3).unwrap(), 2);
        assert_eq!(log.term(4).unwrap(), 2);
        assert_eq!(log.committed(), 3);
    }

    #[test]
    fn reject_stale_prev_term() {
        let mut log = new_log();
        log.append(&[entry(1, 1), entry(2, 1), entry(3, 1)]);
        log.maybe_commit(3, 1);
        log.maybe_append(1, 1, 3, &[entry(2, 2), entry(3, 2), entry(4, 2)]);

        assert_eq!(log.maybe_append(2, 1, 4, &[entry(3, 1)]), 0);
    }

    #[test]
    fn commit_safety_checks_term_at_index() {
        let mut log = new_log();
        log.append(&[entry(1, 1), entry(2, 2)]);
        assert!(!log.maybe_commit(2, 1));
        assert_eq!(log.committed(), 0);
        assert!(log.maybe_commit(2, 2));
        assert_eq!(log.committed(), 2);
    }

    #[test]
    fn snapshot_restore_moves_floor_and_commit() {
        let mut log = new_log();
        let entries: Vec<Entry> = (1..=10).map(|i| entry(i, 1)).collect();
        log.append(&entries);
        log.maybe_commit(5, 1);

        log.restore(Snapshot {
            metadata: SnapshotMetadata {
                index: 8,
                term: 3,
                conf_state: Default::default(),
            },
            data: vec![],
        });

        assert_eq!(log.first_index(), 9);
        assert_eq!(log.last_index(), 8);
        assert_eq!(log.committed(), 8);
        assert_eq!(log.term(8).unwrap(), 3);
        assert_eq!(log.term(7).unwrap(), 0);
        assert_eq!(log.entries(1, NO_LIMIT), Err(Error::Compacted));
    }

    #[test]
    fn stable_to_with_stale_term_is_noop() {
        let mut log = new_log();
        log.append(&[entry(5, 2), entry(6, 2)]);
        log.stable_to(6, 1);
        assert_eq!(log.unstable_entries().len(), 2);
    }

    #[test]
    fn maybe_append_idempotent() {
        let mut log = new_log();
        log.append(&[entry(1, 1)]);
        let entries = [entry(2, 1), entry(3, 1)];
        let first = log.maybe_append(1, 1, 3, &entries);
        let second = log.maybe_append(1, 1, 3, &entries);
        assert_eq!(first, second);
        assert_eq!(log.last_index(), 3);
    }

    #[test]
    fn entries_past_last_index_is_empty() {
        let log = new_log();
        assert_eq!(log.entries(1, NO_LIMIT).unwrap(), Vec::new());
    }

    #[test]
    fn slice_below_first_index_is_compacted() {
        let mut log = new_log();
        log.append(&(1..=5).map(|i| entry(i, 1)).collect::<Vec<_>>());
        log.maybe_commit(5, 1);
        log.applied_to(5);
        log.restore(Snapshot {
            metadata: SnapshotMetadata {
                index: 3,
                term: 1,
                conf_state: Default::default(),
            },
            data: vec![],
        });
        assert_eq!(log.slice(1, 2, NO_LIMIT), Err(Error::Compacted));
    }

    #[test]
    fn limit_size_zero_keeps_first_entry_only() {
        let entries = vec![entry(1, 1), entry(2, 1), entry(3, 1)];
        let limited = limit_size(&entries, 0);
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].index, 1);
    }

    #[test]
    fn append_below_committed_is_fatal() {
        let mut log = new_log();
        log.append(&[entry(1, 1), entry(2, 1)]);
        log.maybe_commit(2, 1);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            log.append(&[entry(1, 2)]);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn applied_to_out_of_range_is_fatal() {
        let mut log = new_log();
        log.append(&[entry(1, 1)]);
        log.maybe_commit(1, 1);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            log.applied_to(2);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn is_up_to_date_compares_term_then_index() {
        let mut log = new_log();
        log.append(&[entry(1, 1), entry(2, 2)]);
        assert!(log.is_up_to_date(10, 3));
        assert!(log.is_up_to_date(2, 2));
        assert!(!log.is_up_to_date(1, 2));
        assert!(!log.is_up_to_date(2, 1));
    }
}
