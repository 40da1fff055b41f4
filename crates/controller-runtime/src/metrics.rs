//! In-process counters handed to managers.
//!
//! Exporting them anywhere is up to the embedding controller; the runtime
//! only records.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub calls: u64,
    pub errors: u64,
}

/// Shared, internally synchronized call counters keyed by operation name.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    counts: Arc<Mutex<BTreeMap<String, CallCounts>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one remote call for `operation`.
    pub fn record(&self, operation: &str, succeeded: bool) {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = counts.entry(operation.to_string()).or_default();
        entry.calls += 1;
        if !succeeded {
            entry.errors += 1;
        }
    }

    pub fn get(&self, operation: &str) -> CallCounts {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied()
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, CallCounts> {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
