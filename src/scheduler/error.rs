/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the Cadence global scheduler.
//!
//! Two error enums model the two failure layers:
//!
//! * [`AdmissionReason`] — why a single (task, node, CPU) candidate was
//!   rejected (low-level, carries exact resource values).
//! * [`SchedulerError`] — top-level failure returned from
//!   [`GlobalScheduler::schedule()`](super::GlobalScheduler::schedule).
//!
//! Every variant carries enough structured data to reconstruct the failing
//! decision in a post-mortem (task name, node, CPU, numeric values) and to
//! be matched by the gRPC handler when mapping to a `tonic::Status` code.
//!
//! **Do not** replace these with `anyhow::Error` in production paths — the
//! structured variants are intentional.

use thiserror::Error;

use crate::hyperperiod::HyperperiodError;

// ── Admission control ─────────────────────────────────────────────────────────

/// Detailed reason why a (task, node, CPU) candidate was rejected during
/// admission control.
///
/// Carried inside [`SchedulerError::AdmissionRejected`] so the caller always
/// knows both *which* task/node pair failed and *why*.
#[derive(Debug, Clone, PartialEq)]
pub enum AdmissionReason {
    /// Placing the task would push the node's cumulative task memory past
    /// its budget.  Never produced when `task.memory_mb == 0` — a zero
    /// request is waived, not an error.
    MemoryExceeded {
        required: u64,
        capacity: u64,
        already_used: u64,
    },

    /// Assigning the task to this CPU would push its utilisation above the
    /// node's `max_utilisation` ceiling.
    CpuUtilisationExceeded {
        cpu: u32,
        current: f64,
        added: f64,
        threshold: f64,
    },

    /// The task is pinned to a CPU mask that does not include this CPU.
    AffinityMismatch { cpu: u32, mask: u64 },

    /// The candidate CPU is not part of the node's configured CPU set.
    /// Defensive — the placement loops only enumerate configured CPUs.
    NotInNode { cpu: u32, node: String },
}

impl std::fmt::Display for AdmissionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdmissionReason::MemoryExceeded {
                required,
                capacity,
                already_used,
            } => write!(
                f,
                "task requires {}MB but node capacity is {}MB with {}MB already committed",
                required, capacity, already_used
            ),

            AdmissionReason::CpuUtilisationExceeded {
                cpu,
                current,
                added,
                threshold,
            } => write!(
                f,
                "CPU {} utilisation would be {:.1}% + {:.1}% = {:.1}% (ceiling {:.0}%)",
                cpu,
                current * 100.0,
                added * 100.0,
                (current + added) * 100.0,
                threshold * 100.0,
            ),

            AdmissionReason::AffinityMismatch { cpu, mask } => write!(
                f,
                "CPU {} is not allowed by the task's affinity mask {:#x}",
                cpu, mask
            ),

            AdmissionReason::NotInNode { cpu, node } => {
                write!(f, "CPU {} is not part of node '{}'", cpu, node)
            }
        }
    }
}

// ── Top-level scheduler errors ────────────────────────────────────────────────

/// Top-level error type returned by
/// [`GlobalScheduler::schedule()`](super::GlobalScheduler::schedule).
///
/// Every variant is named to clearly indicate *what* went wrong so the gRPC
/// handler can map them to appropriate `tonic::Status` codes:
///
/// | Variant | Suggested gRPC status |
/// |---|---|
/// | `NoTasks` | `InvalidArgument` |
/// | `ConfigNotLoaded` | `FailedPrecondition` |
/// | `UnknownAlgorithm` | `InvalidArgument` |
/// | `MissingWorkloadId` / `MissingTargetNode` | `InvalidArgument` |
/// | `Hyperperiod` | `InvalidArgument` |
/// | `AdmissionRejected` | `ResourceExhausted` |
/// | `NoSchedulableNode` | `ResourceExhausted` |
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `schedule()` was called with an empty task list.
    #[error("no tasks provided — task list is empty")]
    NoTasks,

    /// [`NodeConfigManager`] has not been loaded (no YAML file parsed yet).
    ///
    /// [`NodeConfigManager`]: crate::config::NodeConfigManager
    #[error("node configuration is not loaded")]
    ConfigNotLoaded,

    /// The `algorithm` string passed to `schedule()` is not recognised.
    #[error("unknown scheduling algorithm: '{0}' (valid: best_fit_decreasing, least_loaded, target_node_priority)")]
    UnknownAlgorithm(String),

    /// A placed task arrived without a `workload_id`, so no hyperperiod can
    /// be attached to its node's schedule descriptor.
    #[error("task '{task}' has no workload_id — all tasks must carry a workload identifier")]
    MissingWorkloadId { task: String },

    /// A task's `target_node` resolves to no configured node, neither as a
    /// node id nor as a tag.
    #[error("task '{task}' names target '{target}' which matches no configured node")]
    MissingTargetNode { task: String, target: String },

    /// Hyperperiod calculation failed for one of the workloads in the call.
    #[error("hyperperiod calculation failed for workload '{workload_id}'")]
    Hyperperiod {
        workload_id: String,
        #[source]
        source: HyperperiodError,
    },

    /// Admission control rejected a task on its only candidate node, with a
    /// detailed reason.
    ///
    /// The `reason` field carries exact resource values (memory MB, CPU
    /// utilisation fractions) so the caller can log or forward them without
    /// further parsing.
    #[error("task '{task}' rejected by node '{node}': {reason}")]
    AdmissionRejected {
        task: String,
        node: String,
        reason: AdmissionReason,
    },

    /// No node in the configuration could accept the task (every candidate
    /// failed admission on every CPU).
    #[error("no schedulable node found for task '{task}'")]
    NoSchedulableNode { task: String },
}
