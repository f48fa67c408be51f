/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core task data structures for the Cadence global scheduler.
//!
//! Three types model the scheduling pipeline:
//!
//! ```text
//! orchestrator ──(wire TaskInfo)──► Task ──(scheduler)──► SchedInfo { SchedTask… } ──► node agent
//!                                    ↑ input, µs units         ↑ output, ns units
//! ```
//!
//! `Task` is an immutable value for the duration of one scheduling run; the
//! scheduler never mutates it and records assignments separately.  The
//! microsecond→nanosecond conversion happens exactly once, when a placed
//! task is turned into a [`SchedTask`] for the outbound descriptor.

use std::collections::BTreeMap;

use serde::Serialize;

// ── Scheduling policy ─────────────────────────────────────────────────────────

/// Scheduling policy for a task.
///
/// Carrying a closed enum through the whole pipeline (instead of a raw `int`)
/// makes it impossible to hold an invalid policy value inside the scheduler.
/// The conversion back to an integer only happens at the node-agent wire
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedPolicy {
    /// `SCHED_NORMAL` – standard time-sharing scheduling.
    #[default]
    Normal,
    /// `SCHED_FIFO` – real-time FIFO.
    Fifo,
    /// `SCHED_RR` – real-time round-robin.
    RoundRobin,
}

impl SchedPolicy {
    /// Convert to the integer value expected on the node-agent wire.
    pub fn to_wire(self) -> i32 {
        match self {
            SchedPolicy::Normal => 0,
            SchedPolicy::Fifo => 1,
            SchedPolicy::RoundRobin => 2,
        }
    }

    /// Parse from the integer value sent by the upstream orchestrator.
    ///
    /// Unknown values are silently mapped to `Normal`.
    pub fn from_wire(v: i32) -> Self {
        match v {
            1 => SchedPolicy::Fifo,
            2 => SchedPolicy::RoundRobin,
            _ => SchedPolicy::Normal,
        }
    }

    /// Parse from a policy name as it appears in workload files.
    ///
    /// Matching is case-insensitive; unknown names map to `Normal`, the same
    /// tolerance the wire parser applies.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "fifo" => SchedPolicy::Fifo,
            "rr" | "round_robin" => SchedPolicy::RoundRobin,
            _ => SchedPolicy::Normal,
        }
    }
}

// ── CPU affinity ──────────────────────────────────────────────────────────────

/// CPU affinity constraint for a task.
///
/// The wire field `cpu_affinity` is a `uint64` bitmask (e.g. `0x0C` = CPUs 2
/// and 3).  Bit N being set means CPU N is allowed.  The zero mask and the
/// all-ones sentinel both mean "no constraint" and normalise to [`Any`],
/// which keeps an all-zero `Pinned` mask unrepresentable through the
/// constructor.
///
/// [`Any`]: CpuAffinity::Any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No constraint – the scheduler may assign any available CPU.
    #[default]
    Any,

    /// Pinned to a specific set of CPUs expressed as a bitmask.
    Pinned(u64),
}

impl CpuAffinity {
    /// Normalise a wire bitmask into an affinity value.
    pub fn from_mask(v: u64) -> Self {
        if v == 0 || v == u64::MAX {
            CpuAffinity::Any
        } else {
            CpuAffinity::Pinned(v)
        }
    }

    /// Returns `true` if a specific CPU id is allowed by this affinity.
    pub fn allows_cpu(&self, cpu_id: u32) -> bool {
        match self {
            CpuAffinity::Any => true,
            CpuAffinity::Pinned(mask) => cpu_id < 64 && (mask >> cpu_id) & 1 == 1,
        }
    }

    /// The lowest CPU id allowed by a pinned mask; `None` for `Any`.
    pub fn lowest_cpu(&self) -> Option<u32> {
        match self {
            CpuAffinity::Any => None,
            CpuAffinity::Pinned(mask) => {
                if *mask == 0 {
                    None
                } else {
                    Some(mask.trailing_zeros())
                }
            }
        }
    }
}

// ── Task (input) ──────────────────────────────────────────────────────────────

/// One periodic task as handed to the scheduler.
///
/// All timing fields are microseconds; invariants (`period_us > 0`,
/// `0 < runtime_us ≤ period_us`, `deadline_us ≤ period_us`, priority in
/// `0..=99`) are enforced by whichever boundary created the value — the
/// workload-file loader or the gRPC handler.  The scheduler treats the value
/// as immutable.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Task {
    /// Unique task name within a workload.
    pub name: String,

    /// Workload this task belongs to.  Every task in one scheduling call
    /// normally shares the same value; the hyperperiod cache is keyed by it.
    pub workload_id: String,

    /// Node (or node tag) the task should be scheduled on.  Empty means
    /// auto-assign.
    pub target_node: String,

    /// Scheduling policy.
    pub policy: SchedPolicy,

    /// Priority in `0..=99`, higher is more urgent.
    pub priority: i32,

    /// CPU affinity constraint.
    pub affinity: CpuAffinity,

    /// Memory request in megabytes, checked against the node budget during
    /// admission.  Zero means the request is waived.
    pub memory_mb: u64,

    /// Task period in µs.
    pub period_us: u64,

    /// Worst-case execution time (runtime) in µs.
    pub runtime_us: u64,

    /// Relative deadline in µs (typically equals `period_us`).
    pub deadline_us: u64,

    /// Release offset from the start of the hyperperiod, in µs.
    pub release_time_us: u64,
}

impl Task {
    /// CPU utilisation fraction: `runtime_us / period_us`.
    ///
    /// Returns `0.0` when `period_us` is zero to avoid division by zero.
    pub fn utilization(&self) -> f64 {
        if self.period_us == 0 {
            0.0
        } else {
            self.runtime_us as f64 / self.period_us as f64
        }
    }

    /// Exact utilisation ordering via cross-multiplication in `u128`, so
    /// sort results never depend on floating-point rounding.
    pub fn cmp_utilization(&self, other: &Task) -> std::cmp::Ordering {
        let lhs = self.runtime_us as u128 * other.period_us as u128;
        let rhs = other.runtime_us as u128 * self.period_us as u128;
        lhs.cmp(&rhs)
    }
}

// ── SchedTask (output / wire-ready) ──────────────────────────────────────────

/// Per-task scheduling result, as consumed by a node agent.
///
/// All times are nanoseconds, converted from the task's microsecond fields
/// with saturating multiplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedTask {
    /// Task name.
    pub name: String,

    /// Process id of the launched task.  Always zero in the scheduler's
    /// output; the node agent fills it in once the task exists.
    pub pid: i32,

    /// CPU this task is pinned to on its node.
    pub assigned_cpu: u32,

    /// Priority, passed through unchanged.
    pub priority: i32,

    /// Scheduling policy; converted to its wire integer at the node-agent
    /// boundary, not here.
    pub policy: SchedPolicy,

    /// Period in nanoseconds.
    pub period_ns: u64,

    /// Runtime (WCET) in nanoseconds.
    pub runtime_ns: u64,

    /// Deadline in nanoseconds.
    pub deadline_ns: u64,

    /// Release offset in nanoseconds.
    pub release_time_ns: u64,
}

impl SchedTask {
    /// Convert a placed [`Task`] into a wire-ready `SchedTask`.
    pub fn from_task(task: &Task, assigned_cpu: u32) -> Self {
        SchedTask {
            name: task.name.clone(),
            pid: 0,
            assigned_cpu,
            priority: task.priority,
            policy: task.policy,
            period_ns: task.period_us.saturating_mul(1_000),
            runtime_ns: task.runtime_us.saturating_mul(1_000),
            deadline_ns: task.deadline_us.saturating_mul(1_000),
            release_time_ns: task.release_time_us.saturating_mul(1_000),
        }
    }

    /// Utilisation fraction recomputed from the nanosecond fields.
    pub fn utilization(&self) -> f64 {
        if self.period_ns == 0 {
            0.0
        } else {
            self.runtime_ns as f64 / self.period_ns as f64
        }
    }
}

// ── SchedInfo / ScheduleMap ───────────────────────────────────────────────────

/// Per-node schedule descriptor: everything a node agent needs to launch its
/// share of a workload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedInfo {
    /// Node this descriptor belongs to.
    pub node_id: String,

    /// Tasks placed on this node, sorted by (priority descending, name
    /// ascending).
    pub tasks: Vec<SchedTask>,

    /// Hyperperiod of the workload(s) on this node, in µs.
    pub hyperperiod_us: u64,
}

/// Final scheduling result: node id → per-node descriptor.
///
/// `BTreeMap` (not `HashMap`) so iteration order is always sorted by node
/// id — determinism is a functional requirement of the scheduler, not an
/// optimisation.
pub type ScheduleMap = BTreeMap<String, SchedInfo>;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── SchedPolicy ───────────────────────────────────────────────────────────

    #[test]
    fn sched_policy_round_trips_known_values() {
        assert_eq!(SchedPolicy::from_wire(0), SchedPolicy::Normal);
        assert_eq!(SchedPolicy::from_wire(1), SchedPolicy::Fifo);
        assert_eq!(SchedPolicy::from_wire(2), SchedPolicy::RoundRobin);
        for p in [SchedPolicy::Normal, SchedPolicy::Fifo, SchedPolicy::RoundRobin] {
            assert_eq!(SchedPolicy::from_wire(p.to_wire()), p);
        }
    }

    #[test]
    fn sched_policy_unknown_wire_value_maps_to_normal() {
        assert_eq!(SchedPolicy::from_wire(99), SchedPolicy::Normal);
        assert_eq!(SchedPolicy::from_wire(-1), SchedPolicy::Normal);
    }

    #[test]
    fn sched_policy_from_name_is_case_insensitive() {
        assert_eq!(SchedPolicy::from_name("fifo"), SchedPolicy::Fifo);
        assert_eq!(SchedPolicy::from_name("FIFO"), SchedPolicy::Fifo);
        assert_eq!(SchedPolicy::from_name("rr"), SchedPolicy::RoundRobin);
        assert_eq!(SchedPolicy::from_name("round_robin"), SchedPolicy::RoundRobin);
        assert_eq!(SchedPolicy::from_name("normal"), SchedPolicy::Normal);
    }

    #[test]
    fn sched_policy_unknown_name_maps_to_normal() {
        assert_eq!(SchedPolicy::from_name("deadline"), SchedPolicy::Normal);
        assert_eq!(SchedPolicy::from_name(""), SchedPolicy::Normal);
    }

    // ── CpuAffinity ───────────────────────────────────────────────────────────

    #[test]
    fn cpu_affinity_zero_mask_is_any() {
        assert_eq!(CpuAffinity::from_mask(0), CpuAffinity::Any);
    }

    #[test]
    fn cpu_affinity_all_ones_is_any() {
        assert_eq!(CpuAffinity::from_mask(u64::MAX), CpuAffinity::Any);
    }

    #[test]
    fn cpu_affinity_bitmask_allows_correct_cpus() {
        let aff = CpuAffinity::from_mask(0b0000_1100); // CPUs 2 and 3
        assert!(!aff.allows_cpu(0));
        assert!(!aff.allows_cpu(1));
        assert!(aff.allows_cpu(2));
        assert!(aff.allows_cpu(3));
        assert!(!aff.allows_cpu(4));
    }

    #[test]
    fn cpu_affinity_any_allows_all_cpus() {
        for cpu in 0..64u32 {
            assert!(CpuAffinity::Any.allows_cpu(cpu));
        }
    }

    #[test]
    fn cpu_affinity_out_of_range_cpu_is_rejected_by_pinned_mask() {
        let aff = CpuAffinity::Pinned(1);
        assert!(!aff.allows_cpu(64));
        assert!(!aff.allows_cpu(200));
    }

    #[test]
    fn cpu_affinity_lowest_cpu_extracts_first_set_bit() {
        assert_eq!(CpuAffinity::from_mask(0x0C).lowest_cpu(), Some(2));
        assert_eq!(CpuAffinity::from_mask(1 << 5).lowest_cpu(), Some(5));
        assert_eq!(CpuAffinity::Any.lowest_cpu(), None);
    }

    // ── Task ──────────────────────────────────────────────────────────────────

    #[test]
    fn task_utilization_is_runtime_over_period() {
        let task = Task {
            period_us: 1_000_000,
            runtime_us: 100_000,
            ..Default::default()
        };
        assert!((task.utilization() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn task_utilization_zero_period_returns_zero() {
        let task = Task {
            period_us: 0,
            runtime_us: 100,
            ..Default::default()
        };
        assert_eq!(task.utilization(), 0.0);
    }

    #[test]
    fn cmp_utilization_orders_by_exact_fraction() {
        use std::cmp::Ordering;

        let fifth = Task {
            period_us: 10_000,
            runtime_us: 2_000,
            ..Default::default()
        };
        let half = Task {
            period_us: 20_000,
            runtime_us: 10_000,
            ..Default::default()
        };
        assert_eq!(fifth.cmp_utilization(&half), Ordering::Less);
        assert_eq!(half.cmp_utilization(&fifth), Ordering::Greater);

        // 2000/10000 == 4000/20000 — equal despite different operands
        let fifth_2 = Task {
            period_us: 20_000,
            runtime_us: 4_000,
            ..Default::default()
        };
        assert_eq!(fifth.cmp_utilization(&fifth_2), Ordering::Equal);
    }

    // ── SchedTask ─────────────────────────────────────────────────────────────

    #[test]
    fn sched_task_from_task_converts_units_to_nanoseconds() {
        let task = Task {
            name: "t1".into(),
            policy: SchedPolicy::Fifo,
            priority: 50,
            period_us: 1_000, // 1 ms
            runtime_us: 100,  // 0.1 ms
            deadline_us: 1_000,
            release_time_us: 250,
            ..Default::default()
        };
        let st = SchedTask::from_task(&task, 3);

        assert_eq!(st.name, "t1");
        assert_eq!(st.pid, 0);
        assert_eq!(st.assigned_cpu, 3);
        assert_eq!(st.period_ns, 1_000_000); // µs → ns
        assert_eq!(st.runtime_ns, 100_000);
        assert_eq!(st.deadline_ns, 1_000_000);
        assert_eq!(st.release_time_ns, 250_000);
        assert_eq!(st.policy, SchedPolicy::Fifo);
        assert_eq!(st.priority, 50);
    }

    #[test]
    fn sched_task_conversion_is_exact_inside_the_safe_band() {
        // Any period up to 2^54 µs multiplies into ns without loss
        let task = Task {
            name: "band".into(),
            period_us: 1 << 54,
            ..Default::default()
        };
        let st = SchedTask::from_task(&task, 0);
        assert_eq!(st.period_ns, (1u64 << 54) * 1_000);
    }

    #[test]
    fn sched_task_period_ns_saturates_on_overflow() {
        let task = Task {
            name: "big".into(),
            period_us: u64::MAX / 1_000 + 1, // would overflow without saturation
            ..Default::default()
        };
        let st = SchedTask::from_task(&task, 0);
        assert_eq!(st.period_ns, u64::MAX); // saturated
    }

    #[test]
    fn sched_task_utilization_matches_task_utilization() {
        let task = Task {
            name: "u".into(),
            period_us: 10_000,
            runtime_us: 2_500,
            ..Default::default()
        };
        let st = SchedTask::from_task(&task, 1);
        assert!((st.utilization() - task.utilization()).abs() < 1e-12);
    }
}
