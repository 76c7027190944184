//! The in-memory tail of entries appended since the last stable point (§4.2).

use std::sync::Arc;

use crate::entry::{Entry, Snapshot};
use crate::logger::Logger;

/// Buffer of entries not yet persisted, plus an optional pending snapshot.
///
/// `offset` is the index of `entries[0]`, or `last_stable_index + 1` when `entries`
/// is empty. The two are never both set in a way that breaks contiguity: if
/// `snapshot` is present and `entries` is non-empty, `entries[0].index == offset ==
/// snapshot.metadata.index + 1`.
pub struct Unstable {
    offset: u64,
    entries: Vec<Entry>,
    snapshot: Option<Snapshot>,
    logger: Arc<dyn Logger>,
}

impl Unstable {
    /// `offset` is normally `last_index + 1` of whatever storage the owning
    /// [`crate::raft_log::RaftLog`] was constructed from.
    pub fn new(offset: u64, logger: Arc<dyn Logger>) -> Self {
        Self {
            offset,
            entries: Vec::new(),
            snapshot: None,
            logger,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    /// `snapshot.index + 1` if a snapshot is pending; `None` otherwise.
    pub fn maybe_first_index(&self) -> Option<u64> {
        self.snapshot.as_ref().map(|s| s.metadata.index + 1)
    }

    /// Last buffered entry's index, else the pending snapshot's index, else `None`.
    pub fn maybe_last_index(&self) -> Option<u64> {
        if let Some(last) = self.entries.last() {
            Some(last.index)
        } else {
            self.snapshot.as_ref().map(|s| s.metadata.index)
        }
    }

    /// Term at `index`, looking first in the buffered entries, then at the pending
    /// snapshot's metadata. `None` if `index` is outside both.
    pub fn maybe_term(&self, index: u64) -> Option<u64> {
        if index < self.offset {
            if let Some(snapshot) = &self.snapshot {
                if snapshot.metadata.index == index {
                    return Some(snapshot.metadata.term);
                }
            }
            return None;
        }

        let last = self.maybe_last_index()?;
        if index > last {
            return None;
        }
        self.entries
            .get((index - self.offset) as usize)
            .map(|e| e.term)
    }

    /// Drop the prefix through `index` inclusive, but only if the entry at `index`
    /// still carries term `term` — a stale stability callback must not truncate a
    /// tail that a later leader has since overwritten.
    pub fn stable_to(&mut self, index: u64, term: u64) {
        let Some(got_term) = self.maybe_term(index) else {
            return;
        };
        if got_term != term || index < self.offset {
            return;
        }
        let keep_from = (index + 1 - self.offset) as usize;
        self.entries.drain(..keep_from);
        self.offset = index + 1;
    }

    /// Clear the pending snapshot if it is the one at `index`.
    pub fn stable_snap_to(&mut self, index: u64) {
        if let Some(snapshot) = &self.snapshot {
            if snapshot.metadata.index == index {
                self.snapshot = None;
            }
        }
    }

    /// Replace all state with `snapshot`: `offset = snapshot.index + 1`, no
    /// buffered entries, `snapshot` pending.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.offset = snapshot.metadata.index + 1;
        self.entries.clear();
        self.snapshot = Some(snapshot);
    }

    /// Append `new_entries`, truncating any buffered entries that conflict.
    pub fn truncate_and_append(&mut self, new_entries: &[Entry]) {
        if new_entries.is_empty() {
            return;
        }
        let after = new_entries[0].index;

        if after == self.offset + self.entries.len() as u64 {
            self.entries.extend(new_entries.iter().cloned());
        } else if after <= self.offset {
            self.logger
                .info(&format!("replacing unstable entries from index {after}"));
            self.offset = after;
            self.entries = new_entries.to_vec();
        } else {
            self.logger.info(&format!(
                "truncating unstable entries before index {after}"
            ));
            let keep = (after - self.offset) as usize;
            self.entries.truncate(keep);
            self.entries.extend(new_entries.iter().cloned());
        }
    }

    /// Entries in `[lo, hi)`. Caller must ensure the range lies entirely within
    /// `[offset, offset + entries.len())`.
    pub fn slice(&self, lo: u64, hi: u64) -> Vec<Entry> {
        let start = (lo - self.offset) as usize;
        let end = (hi - self.offset) as usize;
        self.entries[start..end].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;
    use crate::logger::TracingLogger;

    fn logger() -> Arc<dyn Logger> {
        Arc::new(TracingLogger)
    }

    fn entry(index: u64, term: u64) -> Entry {
        Entry::new(index, term, EntryType::Normal, vec![])
    }

    #[test]
    fn empty_tail_reports_no_maybe_indices() {
        let u = Unstable::new(5, logger());
        assert_eq!(u.maybe_first_index(), None);
        assert_eq!(u.maybe_last_index(), None);
        assert_eq!(u.maybe_term(5), None);
    }

    #[test]
    fn contiguous_append_grows_tail() {
        let mut u = Unstable::new(1, logger());
        u.truncate_and_append(&[entry(1, 1), entry(2, 1)]);
        assert_eq!(u.maybe_last_index(), Some(2));
        assert_eq!(u.entries().len(), 2);
    }

    #[test]
    fn overlapping_append_truncates_conflicting_suffix() {
        let mut u = Unstable::new(1, logger());
        u.truncate_and_append(&[entry(1, 1), entry(2, 1), entry(3, 1)]);
        u.truncate_and_append(&[entry(2, 2), entry(3, 2)]);
        assert_eq!(u.entries().len(), 3);
        assert_eq!(u.maybe_term(2), Some(2));
        assert_eq!(u.maybe_term(3), Some(2));
    }

    #[test]
    fn append_before_offset_resets_tail() {
        let mut u = Unstable::new(5, logger());
        u.truncate_and_append(&[entry(5, 1), entry(6, 1)]);
        u.truncate_and_append(&[entry(3, 2), entry(4, 2)]);
        assert_eq!(u.offset(), 3);
        assert_eq!(u.entries().len(), 2);
    }

    #[test]
    fn stable_to_with_stale_term_is_noop() {
        let mut u = Unstable::new(5, logger());
        u.truncate_and_append(&[entry(5, 2), entry(6, 2)]);
        u.stable_to(6, 1);
        assert_eq!(u.entries().len(), 2);
        assert_eq!(u.offset(), 5);
    }

    #[test]
    fn stable_to_advances_offset_on_match() {
        let mut u = Unstable::new(5, logger());
        u.truncate_and_append(&[entry(5, 2), entry(6, 2)]);
        u.stable_to(5, 2);
        assert_eq!(u.offset(), 6);
        assert_eq!(u.entries().len(), 1);
    }

    #[test]
    fn restore_replaces_state_with_snapshot() {
        let mut u = Unstable::new(1, logger());
        u.truncate_and_append(&[entry(1, 1)]);
        let snap = Snapshot {
            metadata: crate::entry::SnapshotMetadata {
                index: 8,
                term: 3,
                conf_state: Default::default(),
            },
            data: vec![],
        };
        u.restore(snap);
        assert_eq!(u.offset(), 9);
        assert!(u.entries().is_empty());
        assert_eq!(u.maybe_first_index(), Some(9));
    }
}
