//! Workload descriptions loaded from YAML files.
//!
//! The `plan` subcommand feeds the scheduler from a file instead of the RPC
//! surface.  The expected structure is:
//!
//! ```yaml
//! workload_id: wl_perception
//! tasks:
//!   - name: camera_fusion
//!     period_us: 10000
//!     runtime_us: 2000
//!     priority: 70
//!     policy: fifo
//!     cpu_affinity: 0x8
//!     memory_mb: 256
//!     target_node: node01
//! ```
//!
//! Loading validates the task invariants the scheduling core assumes
//! (`period_us > 0`, `0 < runtime_us ≤ period_us`, `deadline_us ≤ period_us`,
//! priority in `0..=99`).  Policy names are tolerant like the wire parser:
//! unknown names mean `Normal`.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::task::{CpuAffinity, SchedPolicy, Task};

// ── YAML types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WorkloadFile {
    workload_id: String,
    tasks: Vec<TaskEntry>,
}

/// One task as it appears in the YAML file.  Only `name`, `period_us` and
/// `runtime_us` are required.
#[derive(Debug, Deserialize)]
struct TaskEntry {
    name: String,
    #[serde(default)]
    target_node: String,
    period_us: u64,
    runtime_us: u64,
    /// Defaults to `period_us` (implicit deadline).
    deadline_us: Option<u64>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    policy: String,
    /// Affinity bitmask; absent or zero means any CPU.
    #[serde(default)]
    cpu_affinity: u64,
    #[serde(default)]
    memory_mb: u64,
    #[serde(default)]
    release_time_us: u64,
}

impl TaskEntry {
    fn into_task(self, workload_id: &str) -> Result<Task> {
        if self.name.is_empty() {
            bail!("task with empty name in workload '{workload_id}'");
        }
        if self.period_us == 0 {
            bail!("task '{}': period_us must be > 0", self.name);
        }
        if self.runtime_us == 0 || self.runtime_us > self.period_us {
            bail!(
                "task '{}': runtime_us ({}) must be in 1..=period_us ({})",
                self.name,
                self.runtime_us,
                self.period_us
            );
        }
        let deadline_us = self.deadline_us.unwrap_or(self.period_us);
        if deadline_us > self.period_us {
            bail!(
                "task '{}': deadline_us ({}) must not exceed period_us ({})",
                self.name,
                deadline_us,
                self.period_us
            );
        }
        if !(0..=99).contains(&self.priority) {
            bail!(
                "task '{}': priority ({}) must be in 0..=99",
                self.name,
                self.priority
            );
        }

        Ok(Task {
            name: self.name,
            workload_id: workload_id.to_string(),
            target_node: self.target_node,
            policy: SchedPolicy::from_name(&self.policy),
            priority: self.priority,
            affinity: CpuAffinity::from_mask(self.cpu_affinity),
            memory_mb: self.memory_mb,
            period_us: self.period_us,
            runtime_us: self.runtime_us,
            deadline_us,
            release_time_us: self.release_time_us,
        })
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Load a workload description from `path`.
///
/// Returns the workload id and the validated task list.
///
/// # Errors
/// Fails when the file cannot be read, the YAML is malformed, duplicate task
/// names appear, or any task violates the timing/priority invariants.
pub fn load_workload(path: &Path) -> Result<(String, Vec<Task>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open workload file: {}", path.display()))?;

    let file: WorkloadFile = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse workload file: {}", path.display()))?;

    if file.workload_id.is_empty() {
        bail!("workload file {} has an empty workload_id", path.display());
    }
    if file.tasks.is_empty() {
        bail!("workload '{}' contains no tasks", file.workload_id);
    }

    let workload_id = file.workload_id;
    let mut tasks = Vec::with_capacity(file.tasks.len());
    for entry in file.tasks {
        tasks.push(entry.into_task(&workload_id)?);
    }

    // Task names must be unique within a workload
    for i in 1..tasks.len() {
        if tasks[..i].iter().any(|t| t.name == tasks[i].name) {
            bail!(
                "workload '{}' contains duplicate task name '{}'",
                workload_id,
                tasks[i].name
            );
        }
    }

    info!(
        workload_id = %workload_id,
        task_count = tasks.len(),
        "Loaded workload description"
    );

    Ok((workload_id, tasks))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
