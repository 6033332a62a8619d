//! Statement Metrics
//!
//! Counts the statements the repository issues, grouped by category. The
//! counters make the batching guarantees observable: a batch retrieval issues
//! one `base` statement and at most one `property` statement regardless of how
//! many entities it returns.
//!
//! ```rust
//! use mediastore_core::db::metrics::{QueryMetrics, StatementKind};
//!
//! let metrics = QueryMetrics::new();
//! metrics.record(StatementKind::Base);
//! metrics.record(StatementKind::Property);
//! assert_eq!(metrics.count(StatementKind::Property), 1);
//! assert_eq!(metrics.total(), 2);
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Category of an issued statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementKind {
    /// Joined node/content/version row selection
    Base,
    /// Batched property value selection
    Property,
    /// Row counts for paging and existence checks
    Count,
    /// Parent and sibling lookups on the write path
    Lookup,
    /// Inserts, updates and deletes
    Write,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatementKind::Base => "base",
            StatementKind::Property => "property",
            StatementKind::Count => "count",
            StatementKind::Lookup => "lookup",
            StatementKind::Write => "write",
        };
        f.write_str(label)
    }
}

/// Thread-safe statement counters
#[derive(Debug, Default)]
pub struct QueryMetrics {
    counts: Mutex<HashMap<StatementKind, usize>>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub counts: HashMap<StatementKind, usize>,
}

impl MetricsSnapshot {
    /// Statements of `kind` issued since `earlier` was taken
    pub fn delta(&self, earlier: &MetricsSnapshot, kind: StatementKind) -> usize {
        let now = self.counts.get(&kind).copied().unwrap_or(0);
        let then = earlier.counts.get(&kind).copied().unwrap_or(0);
        now.saturating_sub(then)
    }
}

impl QueryMetrics {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one issued statement
    pub fn record(&self, kind: StatementKind) {
        if let Ok(mut counts) = self.counts.lock() {
            *counts.entry(kind).or_insert(0) += 1;
        }
    }

    /// Number of statements of one kind
    pub fn count(&self, kind: StatementKind) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of statements of all kinds
    pub fn total(&self) -> usize {
        self.counts
            .lock()
            .map(|counts| counts.values().sum())
            .unwrap_or(0)
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counts: self
                .counts
                .lock()
                .map(|counts| counts.clone())
                .unwrap_or_default(),
        }
    }

    /// Reset every counter to zero
    pub fn reset(&self) {
        if let Ok(mut counts) = self.counts.lock() {
            counts.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_delta() {
        let metrics = QueryMetrics::new();
        metrics.record(StatementKind::Base);
        let before = metrics.snapshot();

        metrics.record(StatementKind::Base);
        metrics.record(StatementKind::Property);

        let after = metrics.snapshot();
        assert_eq!(after.delta(&before, StatementKind::Base), 1);
        assert_eq!(after.delta(&before, StatementKind::Property), 1);
        assert_eq!(after.delta(&before, StatementKind::Write), 0);
    }

    #[test]
    fn test_reset() {
        let metrics = QueryMetrics::new();
        metrics.record(StatementKind::Write);
        metrics.reset();
        assert_eq!(metrics.total(), 0);
        assert_eq!(StatementKind::Write.to_string(), "write");
    }
}
