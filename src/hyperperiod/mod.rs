//! Hyperperiod calculation and management.
//!
//! The hyperperiod of a set of periodic tasks is the Least Common Multiple
//! (LCM) of all their periods.  It represents the smallest time window after
//! which the entire task set repeats; node agents use it as the major frame
//! when launching a workload.
//!
//! The per-workload cache inside [`HyperperiodManager`] is the only state in
//! the scheduling core that survives across calls.  It has no interior
//! locking of its own — the owner is expected to serialise access (the
//! `GlobalScheduler` keeps it behind a `Mutex` locked once per operation).

pub mod math;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::task::Task;
use math::lcm_many;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Warn ceiling on the hyperperiod (1 hour in microseconds).
///
/// A hyperperiod above this is almost always a sign of mismatched periods
/// (e.g. 999 µs next to 1 000 µs).  The value is still returned; the ceiling
/// only controls the warning.
pub const DEFAULT_HYPERPERIOD_WARN_CEILING_US: u64 = 3_600_000_000; // 1 h

// ── Error type ────────────────────────────────────────────────────────────────

/// Errors that can occur during hyperperiod calculation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HyperperiodError {
    /// No task in the slice belonged to the requested workload.
    #[error("no tasks found for the requested workload")]
    NoTasks,

    /// The workload's tasks all had `period_us == 0`.
    #[error("no tasks with a valid (non-zero) period")]
    NoValidPeriods,
}

// ── HyperperiodInfo ───────────────────────────────────────────────────────────

/// Calculated hyperperiod result for one workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperperiodInfo {
    /// Workload identifier this hyperperiod belongs to.
    pub workload_id: String,

    /// Hyperperiod in microseconds (LCM of all unique task periods).
    pub hyperperiod_us: u64,

    /// Unique periods present in the workload (sorted, deduplicated).
    pub unique_periods: Vec<u64>,

    /// Number of tasks in the workload that contributed to this hyperperiod.
    pub task_count: usize,
}

// ── HyperperiodManager ────────────────────────────────────────────────────────

/// Calculates and stores hyperperiod information per workload.
///
/// # Example
/// ```rust
/// use cadence_gs::hyperperiod::HyperperiodManager;
/// use cadence_gs::task::Task;
///
/// let mut mgr = HyperperiodManager::new();
///
/// let tasks = vec![
///     Task { workload_id: "w1".into(), period_us: 1_000, ..Default::default() },
///     Task { workload_id: "w1".into(), period_us: 2_000, ..Default::default() },
/// ];
///
/// let info = mgr.calculate("w1", &tasks).unwrap();
/// assert_eq!(info.hyperperiod_us, 2_000);
/// ```
#[derive(Debug)]
pub struct HyperperiodManager {
    /// Per-workload hyperperiod results, ordered by workload id.
    map: BTreeMap<String, HyperperiodInfo>,

    /// Warn ceiling; a calculated value above this is logged loudly but
    /// still stored and returned.
    warn_ceiling_us: u64,
}

impl HyperperiodManager {
    /// Create a manager with the default 1-hour warn ceiling.
    pub fn new() -> Self {
        Self::with_warn_ceiling(DEFAULT_HYPERPERIOD_WARN_CEILING_US)
    }

    /// Create a manager with a custom warn ceiling (in microseconds).
    pub fn with_warn_ceiling(warn_ceiling_us: u64) -> Self {
        Self {
            map: BTreeMap::new(),
            warn_ceiling_us,
        }
    }

    /// Calculate and store the hyperperiod for `workload_id`.
    ///
    /// # Arguments
    /// * `workload_id` – identifier for the workload being processed.
    /// * `tasks` – slice of **all** tasks available to the caller; only those
    ///   whose `workload_id` field matches the `workload_id` argument are
    ///   used, so callers can pass a larger pool without pre-filtering.
    ///
    /// # Errors
    /// * [`HyperperiodError::NoTasks`] – no task matched the workload.
    /// * [`HyperperiodError::NoValidPeriods`] – tasks matched but every
    ///   period was zero.
    pub fn calculate(
        &mut self,
        workload_id: &str,
        tasks: &[Task],
    ) -> Result<&HyperperiodInfo, HyperperiodError> {
        let matching: Vec<&Task> = tasks
            .iter()
            .filter(|t| t.workload_id == workload_id)
            .collect();

        if matching.is_empty() {
            warn!("No tasks found for workload '{workload_id}'");
            return Err(HyperperiodError::NoTasks);
        }

        // Collect unique non-zero periods (sorted for deterministic output)
        let unique_periods: Vec<u64> = {
            let mut v: Vec<u64> = matching
                .iter()
                .map(|t| t.period_us)
                .filter(|&p| p > 0)
                .collect();
            v.sort_unstable();
            v.dedup();
            v
        };

        if unique_periods.is_empty() {
            warn!("No tasks with valid periods found for workload '{workload_id}'");
            return Err(HyperperiodError::NoValidPeriods);
        }

        let hyperperiod_us = lcm_many(&unique_periods);

        if hyperperiod_us > self.warn_ceiling_us {
            warn!(
                hyperperiod_us,
                warn_ceiling_us = self.warn_ceiling_us,
                workload_id,
                "Hyperperiod exceeds warn ceiling — check for mismatched periods"
            );
        }

        info!(
            workload_id,
            task_count = matching.len(),
            unique_count = unique_periods.len(),
            hyperperiod_ms = hyperperiod_us / 1_000,
            "Calculated hyperperiod"
        );
        for p in &unique_periods {
            debug!(period_us = p, "  unique period");
        }

        let info = HyperperiodInfo {
            workload_id: workload_id.to_string(),
            hyperperiod_us,
            unique_periods,
            task_count: matching.len(),
        };

        self.map.insert(workload_id.to_string(), info);

        // The entry was just inserted; re-borrow it for the caller
        Ok(&self.map[workload_id])
    }

    /// Look up the stored hyperperiod for `workload_id`.
    ///
    /// Returns `None` if [`calculate`](Self::calculate) has not been called
    /// for this workload, or if it was cleared.
    pub fn get(&self, workload_id: &str) -> Option<&HyperperiodInfo> {
        self.map.get(workload_id)
    }

    /// Returns `true` if a hyperperiod has been stored for `workload_id`.
    pub fn has(&self, workload_id: &str) -> bool {
        self.map.contains_key(workload_id)
    }

    /// Remove the hyperperiod entry for `workload_id`.
    pub fn clear(&mut self, workload_id: &str) {
        if self.map.remove(workload_id).is_some() {
            info!("Cleared hyperperiod for workload '{workload_id}'");
        }
    }

    /// Remove all stored hyperperiod entries.
    pub fn clear_all(&mut self) {
        if !self.map.is_empty() {
            info!(
                "Cleared hyperperiod data for {} workload(s)",
                self.map.len()
            );
            self.map.clear();
        }
    }

    /// Read-only access to all stored hyperperiod entries, ordered by
    /// workload id.
    pub fn all(&self) -> &BTreeMap<String, HyperperiodInfo> {
        &self.map
    }
}

impl Default for HyperperiodManager {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
