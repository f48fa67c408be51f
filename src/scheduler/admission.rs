/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Admission control: may this task run on this (node, CPU)?
//!
//! The gate is pure — it reads the per-call utilisation and memory trackers
//! but never updates them.  On `Ok(())` the placement loop commits the
//! candidate, bumping the CPU's utilisation and the node's memory tally.
//! CPUs are never taken out of circulation; any number of tasks may share a
//! CPU as long as its total utilisation stays under the node's ceiling.

use crate::config::NodeConfig;
use crate::task::{CpuAffinity, Task};

use super::error::AdmissionReason;
use super::{CpuUtil, NodeMemory};

/// Check whether `task` may be placed on `cfg`'s CPU `cpu`.
///
/// Checks (in order):
/// 1. Memory budget — `Σ memory already committed to the node + request`
///    must stay within `max_memory_mb`.  A zero request is waived and never
///    rejected.
/// 2. Per-CPU utilisation — the CPU's running total plus the task's
///    `runtime/period` fraction must stay within the node's
///    `max_utilisation`.
/// 3. Pinned affinity — a `Pinned` mask must have this CPU's bit set.
/// 4. CPU membership — the CPU must belong to the node's configured set
///    (defensive; the placement loops only enumerate configured CPUs).
pub(super) fn check_admission(
    task: &Task,
    cfg: &NodeConfig,
    cpu: u32,
    util: &CpuUtil,
    memory: &NodeMemory,
) -> Result<(), AdmissionReason> {
    // 1. Memory budget (waived while task.memory_mb == 0)
    if task.memory_mb > 0 {
        let already_used = memory.get(&cfg.node_id).copied().unwrap_or(0);
        if already_used.saturating_add(task.memory_mb) > cfg.max_memory_mb {
            return Err(AdmissionReason::MemoryExceeded {
                required: task.memory_mb,
                capacity: cfg.max_memory_mb,
                already_used,
            });
        }
    }

    // 2. Per-CPU utilisation ceiling
    let current = util
        .get(&cfg.node_id)
        .and_then(|m| m.get(&cpu))
        .copied()
        .unwrap_or(0.0);
    let added = task.utilization();
    if current + added > cfg.max_utilisation {
        return Err(AdmissionReason::CpuUtilisationExceeded {
            cpu,
            current,
            added,
            threshold: cfg.max_utilisation,
        });
    }

    // 3. Pinned affinity must allow this CPU
    if let CpuAffinity::Pinned(mask) = task.affinity {
        if !task.affinity.allows_cpu(cpu) {
            return Err(AdmissionReason::AffinityMismatch { cpu, mask });
        }
    }

    // 4. The CPU must belong to the node
    if !cfg.cpus.contains(&cpu) {
        return Err(AdmissionReason::NotInNode {
            cpu,
            node: cfg.node_id.clone(),
        });
    }

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
