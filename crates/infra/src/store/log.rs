//! Statement log used to count datastore round trips.
//!
//! Counts are kept per [`StatementKind`]; only the most recent statements are
//! retained in full, so a long-lived datastore does not accumulate history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::Serialize;

const KINDS: usize = 7;

/// Shape of a statement sent to the datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementKind {
    /// Primary-key lookup.
    FindById,
    /// Filtered select over one table (joined for filtering only).
    Select,
    /// `key IN (...)` batch lookup.
    SelectIn,
    /// Select that also materializes joined to-one rows.
    JoinFetch,
    /// Select that explodes a joined collection.
    JoinFetchCollection,
    /// Column projection into a flat row.
    Projection,
    /// Rows written at commit.
    Write,
}

impl StatementKind {
    pub const ALL: [StatementKind; KINDS] = [
        StatementKind::FindById,
        StatementKind::Select,
        StatementKind::SelectIn,
        StatementKind::JoinFetch,
        StatementKind::JoinFetchCollection,
        StatementKind::Projection,
        StatementKind::Write,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn is_read(self) -> bool {
        !matches!(self, StatementKind::Write)
    }
}

/// One round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub kind: StatementKind,
    pub table: &'static str,
    pub rows: usize,
}

/// Statements retained by [`QueryLog::recent`] unless configured otherwise.
pub const DEFAULT_RECENT_CAPACITY: usize = 256;

/// Per-kind statement counters plus a bounded window of recent statements.
#[derive(Debug)]
pub struct QueryLog {
    counts: [AtomicUsize; KINDS],
    recent: Mutex<VecDeque<Statement>>,
    capacity: usize,
}

impl Default for QueryLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECENT_CAPACITY)
    }
}

impl QueryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `capacity` statements in full; zero keeps counters only.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counts: Default::default(),
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub(crate) fn record(&self, kind: StatementKind, table: &'static str, rows: usize) {
        tracing::debug!(kind = ?kind, table, rows, "statement");
        self.counts[kind.index()].fetch_add(1, Ordering::Relaxed);
        if self.capacity == 0 {
            return;
        }
        if let Ok(mut recent) = self.recent.lock() {
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(Statement { kind, table, rows });
        }
    }

    /// Statements of `kind` since the last [`QueryLog::clear`].
    pub fn count(&self, kind: StatementKind) -> usize {
        self.counts[kind.index()].load(Ordering::Relaxed)
    }

    /// Number of read statements since the last [`QueryLog::clear`].
    pub fn round_trips(&self) -> usize {
        StatementKind::ALL
            .into_iter()
            .filter(|kind| kind.is_read())
            .map(|kind| self.count(kind))
            .sum()
    }

    /// The most recent statements, oldest first.
    pub fn recent(&self) -> Vec<Statement> {
        self.recent
            .lock()
            .map(|recent| recent.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        for count in &self.counts {
            count.store(0, Ordering::Relaxed);
        }
        if let Ok(mut recent) = self.recent.lock() {
            recent.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_are_not_round_trips() {
        let log = QueryLog::new();
        log.record(StatementKind::Select, "orders", 2);
        log.record(StatementKind::Write, "orders", 1);
        log.record(StatementKind::SelectIn, "items", 4);
        assert_eq!(log.round_trips(), 2);
        assert_eq!(log.count(StatementKind::Write), 1);
        assert_eq!(log.recent().len(), 3);
        log.clear();
        assert_eq!(log.round_trips(), 0);
        assert!(log.recent().is_empty());
    }

    #[test]
    fn retained_statements_stay_bounded_while_counts_keep_growing() {
        let log = QueryLog::with_capacity(4);
        for rows in 0..10_000 {
            log.record(StatementKind::FindById, "members", rows);
        }
        assert_eq!(log.round_trips(), 10_000);
        let recent = log.recent();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].rows, 9_996);
        assert_eq!(recent[3].rows, 9_999);
    }

    #[test]
    fn zero_capacity_keeps_counters_only() {
        let log = QueryLog::with_capacity(0);
        log.record(StatementKind::Projection, "orders", 2);
        assert_eq!(log.round_trips(), 1);
        assert!(log.recent().is_empty());
    }
}
