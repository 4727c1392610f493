//! Per-row status ledger, interrupt flag and job scheduler
//!
//! Every pull/push call carries a [`Status`]: one ledger row per input query
//! row, an interrupt flag checked at page boundaries, and the error-handling
//! policy. The scheduler's completion handler is the only place that decides
//! between re-raising a row failure and writing it into the ledger.

mod jobs;

pub use jobs::Jobs;

use crate::error::{Error, Result};
use crate::types::ErrorHandling;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One ledger row, keyed by the original query row index
#[derive(Debug, Clone)]
pub struct LedgerRow {
    /// Terminal value: "Success", a skip reason, or an error message
    pub result: String,
    /// Samples or capsules transferred for this row
    pub count: u64,
    /// Pages fetched or flushed for this row
    pub pages: u64,
    /// Wall time spent on this row
    pub time: Duration,
    /// Response/request bytes accounted to this row
    pub data_processed: u64,
}

impl Default for LedgerRow {
    fn default() -> Self {
        Self {
            result: "Queued".to_string(),
            count: 0,
            pages: 0,
            time: Duration::ZERO,
            data_processed: 0,
        }
    }
}

/// Call-scoped status: ledger + interrupt flag + error policy
#[derive(Debug, Default)]
pub struct Status {
    ledger: Mutex<BTreeMap<usize, LedgerRow>>,
    interrupted: Arc<AtomicBool>,
    errors: ErrorHandling,
}

impl Status {
    pub fn new(errors: ErrorHandling) -> Self {
        Self {
            ledger: Mutex::new(BTreeMap::new()),
            interrupted: Arc::new(AtomicBool::new(false)),
            errors,
        }
    }

    pub fn error_handling(&self) -> ErrorHandling {
        self.errors
    }

    /// Request cancellation; honored at the next page boundary
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Handle to the interrupt flag, shareable with callers
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Error out if cancellation was requested
    pub fn check_interrupt(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Mutate one ledger row atomically, creating it if needed
    pub fn update_row(&self, index: usize, f: impl FnOnce(&mut LedgerRow)) {
        let mut ledger = self.ledger.lock().expect("ledger mutex poisoned");
        f(ledger.entry(index).or_default());
    }

    /// Set one row's terminal result string
    pub fn set_result(&self, index: usize, result: impl Into<String>) {
        let result = result.into();
        self.update_row(index, |row| row.result = result);
    }

    /// Read one row
    pub fn row(&self, index: usize) -> Option<LedgerRow> {
        self.ledger
            .lock()
            .expect("ledger mutex poisoned")
            .get(&index)
            .cloned()
    }

    /// Snapshot of the full ledger, keyed by query row index
    pub fn rows(&self) -> BTreeMap<usize, LedgerRow> {
        self.ledger.lock().expect("ledger mutex poisoned").clone()
    }

    /// Resolve a row failure per the error policy.
    ///
    /// Interrupted and configuration errors always propagate. Pagination
    /// integrity errors are fatal for their row but never stop the other
    /// rows, so they are catalogued regardless of policy. Everything else
    /// propagates under `Raise` and is catalogued under `Catalog`.
    pub fn raise_or_catalog(&self, index: usize, err: Error) -> Result<()> {
        if matches!(err, Error::Interrupted) || err.is_config() {
            return Err(err);
        }
        if err.is_pagination_integrity() || self.errors == ErrorHandling::Catalog {
            self.set_result(index, format!("[Error] {err}"));
            return Ok(());
        }
        Err(err)
    }
}
