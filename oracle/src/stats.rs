// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Per-purpose query counters and cumulative solver time.

use std::collections::BTreeMap;
use std::ops::Sub;
use std::sync::Mutex;
use std::time::Duration;

use crate::query::QueryType;

/// A record of query counts and durations, grouped by purpose.
///
/// Uses a `Mutex` so learning tasks running on worker threads can record
/// into a shared instance.
#[derive(Debug, Default)]
pub struct QueryStats(Mutex<StatsSnapshot>);

/// An immutable copy of the counters at some point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    totals: BTreeMap<QueryType, (usize, Duration)>,
}

impl QueryStats {
    /// A fresh, zeroed record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one query of the given purpose and duration.
    pub fn record(&self, query_type: QueryType, duration: Duration) {
        let mut inner = self.0.lock().unwrap();
        let entry = inner.totals.entry(query_type).or_default();
        entry.0 += 1;
        entry.1 += duration;
    }

    /// A copy of the current counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        self.0.lock().unwrap().clone()
    }
}

impl StatsSnapshot {
    /// The count and cumulative time for one purpose.
    pub fn for_type(&self, query_type: QueryType) -> (usize, Duration) {
        self.totals.get(&query_type).copied().unwrap_or_default()
    }

    /// The total query count across purposes.
    pub fn total_count(&self) -> usize {
        self.totals.values().map(|(n, _)| n).sum()
    }

    /// Log one line per purpose, prefixed with a description of what the
    /// counters cover.
    pub fn report(&self, what: &str) {
        for query_type in QueryType::ALL {
            let (count, time) = self.for_type(query_type);
            log::info!(
                "{what}: {count} {} queries ({:.1}s)",
                query_type.name(),
                time.as_secs_f64()
            );
        }
    }
}

impl Sub<&StatsSnapshot> for &StatsSnapshot {
    type Output = StatsSnapshot;

    /// The counters accumulated since an earlier snapshot.
    fn sub(self, earlier: &StatsSnapshot) -> StatsSnapshot {
        let mut totals = BTreeMap::new();
        for query_type in QueryType::ALL {
            let (count, time) = self.for_type(query_type);
            let (prior_count, prior_time) = earlier.for_type(query_type);
            totals.insert(
                query_type,
                (
                    count.saturating_sub(prior_count),
                    time.saturating_sub(prior_time),
                ),
            );
        }
        StatsSnapshot { totals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_delta() {
        let stats = QueryStats::new();
        stats.record(QueryType::Regular, Duration::from_secs(1));
        stats.record(QueryType::Regular, Duration::from_secs(2));
        stats.record(QueryType::Heuristic, Duration::from_secs(3));
        let first = stats.snapshot();
        assert_eq!(first.for_type(QueryType::Regular).0, 2);
        stats.record(QueryType::Regular, Duration::from_secs(1));
        let delta = &stats.snapshot() - &first;
        assert_eq!(delta.for_type(QueryType::Regular), (1, Duration::from_secs(1)));
        assert_eq!(delta.for_type(QueryType::Heuristic), (0, Duration::ZERO));
    }
}
