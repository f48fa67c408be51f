/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time scheduling feasibility analysis.
//!
//! The Liu & Layland bound is **computed and logged** after every scheduling
//! run.  It is a **warning only** — the schedule is returned even if the
//! bound is exceeded.  The practical hard gate is each node's
//! `max_utilisation` ceiling applied per-CPU during admission.
//!
//! # Theory
//! **Liu & Layland (1973)**: Under Rate Monotonic scheduling (shorter period →
//! higher priority), a task set of `n` independent periodic tasks is
//! **guaranteed** schedulable on one CPU if:
//!
//! $$U = \sum_{i=1}^{n} \frac{C_i}{T_i} \leq n \left(2^{1/n} - 1\right)$$
//!
//! The bound tightens as `n` grows, converging to `ln(2) ≈ 0.693`.
//!
//! | n | Bound |
//! |---|---|
//! | 1 | 1.000 |
//! | 2 | 0.828 |
//! | 3 | 0.780 |
//! | 5 | 0.743 |
//! | ∞ | ln(2) ≈ 0.693 |
//!
//! If `U` is between the L&L bound and 1.0, the task set **may or may not** be
//! schedulable — deeper Response Time Analysis (RTA) is required.  The check
//! runs per (node, CPU), since each CPU executes its pinned task set
//! independently.

use std::collections::BTreeMap;

use crate::task::{SchedTask, ScheduleMap};

// ── Public API ────────────────────────────────────────────────────────────────

/// One per-CPU bound violation found in a finished schedule.
///
/// Informational: the schedule that produced it is still valid output, but
/// the named CPU's task set is not *provably* schedulable under
/// rate-monotonic priorities.
#[derive(Debug, Clone, PartialEq)]
pub struct FeasibilityWarning {
    pub node_id: String,
    pub cpu: u32,
    /// Sum of `runtime / period` over the CPU's tasks.
    pub total_utilisation: f64,
    /// The Liu & Layland bound for this task count.
    pub bound: f64,
    /// Names of the tasks on this CPU, in descriptor order.
    pub tasks: Vec<String>,
}

/// Compute the Liu & Layland utilisation upper bound for `n` tasks.
///
/// `U_bound(n) = n × (2^(1/n) − 1)`
///
/// Returns `1.0` for `n = 1` (a single task always fits if `U ≤ 1`),
/// and `0.0` for `n = 0`.
pub fn liu_layland_bound(n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    nf * (2.0_f64.powf(1.0 / nf) - 1.0)
}

/// Evaluate every (node, CPU) task set of a finished schedule against the
/// Liu & Layland bound.
///
/// Returns one [`FeasibilityWarning`] per CPU whose total utilisation
/// exceeds the bound for its task count; an empty vector means every CPU is
/// provably schedulable.  Tasks with `period_ns == 0` contribute zero
/// utilisation and are excluded from the count.
pub fn check_schedule(schedule: &ScheduleMap) -> Vec<FeasibilityWarning> {
    let mut warnings = Vec::new();

    for (node_id, info) in schedule {
        // Group this node's tasks by assigned CPU, keeping descriptor order
        let mut by_cpu: BTreeMap<u32, Vec<&SchedTask>> = BTreeMap::new();
        for task in &info.tasks {
            if task.period_ns > 0 {
                by_cpu.entry(task.assigned_cpu).or_default().push(task);
            }
        }

        for (cpu, tasks) in &by_cpu {
            let total_utilisation: f64 = tasks.iter().map(|t| t.utilization()).sum();
            let bound = liu_layland_bound(tasks.len());

            if total_utilisation > bound {
                warnings.push(FeasibilityWarning {
                    node_id: node_id.clone(),
                    cpu: *cpu,
                    total_utilisation,
                    bound,
                    tasks: tasks.iter().map(|t| t.name.clone()).collect(),
                });
            }
        }
    }

    warnings
}

// ── Tests ─────────────────────────────────────────────────────────────────────
