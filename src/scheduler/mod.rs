//! Global task scheduler for Cadence.
//!
//! [`GlobalScheduler`] implements three placement algorithms that distribute
//! a set of real-time [`Task`]s across compute nodes, assigning each task a
//! node and a CPU.  The result is a [`ScheduleMap`] — one [`SchedInfo`]
//! descriptor per node, ready to be forwarded to the node agents.
//!
//! # Algorithms
//! * `best_fit_decreasing` — sort tasks by utilisation descending and pack
//!   each onto the busiest feasible CPU, walking nodes in id order.
//! * `least_loaded` — keep input order and spread: emptiest node first,
//!   emptiest CPU first.
//! * `target_node_priority` — honour explicit task→node pins first, then
//!   place the rest best-fit-decreasing.
//!
//! # Determinism
//! Every map on the placement path is a `BTreeMap` and every sort carries a
//! total tie-break (task name, node id, CPU index), so identical inputs
//! always produce bit-identical schedules.  This is a functional requirement
//! for repeatability and audit, not an optimisation.
//!
//! # State
//! All per-run state (available CPUs, utilisation and memory tracking) is
//! allocated inside `schedule()` and dropped at the end of the call.  The
//! only state that survives is the hyperperiod cache, guarded by a `Mutex`
//! that is locked once per operation and never held across a suspension
//! point — `schedule()` itself is synchronous and CPU-bound, so callers on
//! an event loop should off-load it to a blocking worker.

mod admission;
pub mod error;
pub mod feasibility;

pub use error::{AdmissionReason, SchedulerError};
pub use feasibility::FeasibilityWarning;

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::config::{NodeConfig, NodeConfigManager};
use crate::hyperperiod::math::lcm;
use crate::hyperperiod::HyperperiodManager;
use crate::task::{SchedInfo, SchedTask, ScheduleMap, Task};

use admission::check_admission;

// ── Algorithm selection ───────────────────────────────────────────────────────

/// The three placement strategies, resolved from the wire-level name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    BestFitDecreasing,
    LeastLoaded,
    TargetNodePriority,
}

impl Algorithm {
    /// Resolve an algorithm name; `None` for anything unrecognised.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "best_fit_decreasing" => Some(Algorithm::BestFitDecreasing),
            "least_loaded" => Some(Algorithm::LeastLoaded),
            "target_node_priority" => Some(Algorithm::TargetNodePriority),
            _ => None,
        }
    }

    /// The wire-level name of this algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::BestFitDecreasing => "best_fit_decreasing",
            Algorithm::LeastLoaded => "least_loaded",
            Algorithm::TargetNodePriority => "target_node_priority",
        }
    }
}

// ── Internal state types ──────────────────────────────────────────────────────

/// Per-call CPU pool: node id → sorted list of available CPU ids.
///
/// CPUs are never removed — multiple tasks share a CPU up to the node's
/// utilisation ceiling.  `BTreeMap` (not `HashMap`) so iteration order is
/// always sorted by node id.
type AvailCpus = BTreeMap<String, Vec<u32>>;

/// Per-call utilisation tracker: node id → (cpu id → utilisation fraction).
///
/// Both levels use `BTreeMap` for deterministic iteration.
type CpuUtil = BTreeMap<String, BTreeMap<u32, f64>>;

/// Per-call memory tracker: node id → MB committed so far.
type NodeMemory = BTreeMap<String, u64>;

/// All per-run trackers, born and dropped within one `schedule()` call.
struct PlacementState {
    avail: AvailCpus,
    util: CpuUtil,
    memory: NodeMemory,
}

impl PlacementState {
    fn new(mgr: &NodeConfigManager) -> Self {
        let mut avail = AvailCpus::new();
        let mut util = CpuUtil::new();
        for (node_id, cfg) in mgr.get_all_nodes() {
            avail.insert(node_id.clone(), cfg.cpus.clone());
            util.insert(node_id.clone(), cfg.cpus.iter().map(|&c| (c, 0.0)).collect());
            debug!(
                node = %node_id,
                cpu_count = cfg.cpus.len(),
                cpus = ?cfg.cpus,
                "node initialised"
            );
        }
        Self {
            avail,
            util,
            memory: NodeMemory::new(),
        }
    }

    /// Per-CPU utilisation for `(node_id, cpu)`.  Returns `0.0` if not
    /// tracked.
    fn cpu_utilisation(&self, node_id: &str, cpu: u32) -> f64 {
        self.util
            .get(node_id)
            .and_then(|m| m.get(&cpu))
            .copied()
            .unwrap_or(0.0)
    }

    /// Average utilisation across the node's CPUs.
    fn node_utilisation(&self, node_id: &str) -> f64 {
        match self.util.get(node_id) {
            Some(m) if !m.is_empty() => m.values().sum::<f64>() / m.len() as f64,
            _ => 0.0,
        }
    }

    /// The node's CPUs ordered for candidate enumeration.
    ///
    /// Base order is utilisation ascending with CPU index as tie-break.
    /// `prefer_high_util = true` reverses it, which packs tasks onto the
    /// busiest feasible CPU first (bin-packing / DVFS power-gating
    /// friendly); `false` keeps the spreading order (thermal gradient
    /// reduction).
    fn sorted_cpus(&self, node_id: &str, prefer_high_util: bool) -> Vec<u32> {
        let Some(cpus) = self.avail.get(node_id) else {
            return Vec::new();
        };
        let mut sorted = cpus.clone();
        sorted.sort_by(|&a, &b| {
            let ua = self.cpu_utilisation(node_id, a);
            let ub = self.cpu_utilisation(node_id, b);
            ua.partial_cmp(&ub)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cmp(&b))
        });
        if prefer_high_util {
            sorted.reverse();
        }
        sorted
    }

    /// Record a committed placement: bump the CPU's utilisation and the
    /// node's memory tally.
    fn commit(&mut self, task: &Task, node_id: &str, cpu: u32) {
        let added = task.utilization();
        let before = self.cpu_utilisation(node_id, cpu);
        if let Some(entry) = self.util.get_mut(node_id).and_then(|m| m.get_mut(&cpu)) {
            *entry = before + added;
        }
        if task.memory_mb > 0 {
            *self.memory.entry(node_id.to_string()).or_insert(0) += task.memory_mb;
        }
        debug!(
            task = %task.name,
            node = %node_id,
            cpu = cpu,
            before_pct = before * 100.0,
            after_pct = (before + added) * 100.0,
            "CPU assigned"
        );
    }
}

/// One placed task, pending output assembly.
struct Placement<'a> {
    task: &'a Task,
    node_id: String,
    cpu: u32,
}

// ── GlobalScheduler ───────────────────────────────────────────────────────────

/// The Cadence global scheduler.
///
/// Holds a shared reference to the node configuration and the per-workload
/// hyperperiod cache.  The configuration is immutable; the cache is the only
/// mutable cross-call state and is locked once per operation, so the struct
/// is `Send + Sync` and one instance serves all callers.
pub struct GlobalScheduler {
    node_config_manager: Arc<NodeConfigManager>,
    hyperperiods: Mutex<HyperperiodManager>,
}

impl GlobalScheduler {
    /// Create a scheduler backed by the given node configuration.
    pub fn new(node_config_manager: Arc<NodeConfigManager>) -> Self {
        Self {
            node_config_manager,
            hyperperiods: Mutex::new(HyperperiodManager::new()),
        }
    }

    /// Create a scheduler with a custom hyperperiod warn ceiling (µs).
    pub fn with_hyperperiod_ceiling(
        node_config_manager: Arc<NodeConfigManager>,
        warn_ceiling_us: u64,
    ) -> Self {
        Self {
            node_config_manager,
            hyperperiods: Mutex::new(HyperperiodManager::with_warn_ceiling(warn_ceiling_us)),
        }
    }

    /// The per-workload hyperperiod cache.
    ///
    /// The guard must not be held across an await point; take it, read, and
    /// drop it within one expression or block.
    pub fn hyperperiod_manager(&self) -> MutexGuard<'_, HyperperiodManager> {
        self.hyperperiods.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Public entry point ────────────────────────────────────────────────────

    /// Schedule `tasks` using the named `algorithm` and return one wire-ready
    /// [`SchedInfo`] per node.
    ///
    /// # Errors
    /// Returns a [`SchedulerError`] variant that describes exactly what went
    /// wrong so the gRPC handler can map it to an appropriate `tonic::Status`.
    pub fn schedule(
        &self,
        algorithm: &str,
        tasks: &[Task],
    ) -> Result<ScheduleMap, SchedulerError> {
        // ── Preconditions ─────────────────────────────────────────────────────
        if tasks.is_empty() {
            return Err(SchedulerError::NoTasks);
        }
        if !self.node_config_manager.is_loaded() {
            return Err(SchedulerError::ConfigNotLoaded);
        }
        let algorithm = Algorithm::from_name(algorithm)
            .ok_or_else(|| SchedulerError::UnknownAlgorithm(algorithm.to_string()))?;

        info!(
            algorithm = algorithm.name(),
            task_count = tasks.len(),
            node_count = self.node_config_manager.get_all_nodes().len(),
            "=== GlobalScheduler::schedule() ==="
        );

        // ── Hyperperiods (the one lock in the call) ───────────────────────────
        let hyperperiods = self.calculate_hyperperiods(tasks)?;

        // ── Per-call state ────────────────────────────────────────────────────
        let mut state = PlacementState::new(&self.node_config_manager);

        // ── Algorithm dispatch ────────────────────────────────────────────────
        let placements = match algorithm {
            Algorithm::BestFitDecreasing => {
                self.place_best_fit_decreasing(tasks.iter().collect(), &mut state)?
            }
            Algorithm::LeastLoaded => self.place_least_loaded(tasks, &mut state)?,
            Algorithm::TargetNodePriority => {
                self.place_target_node_priority(tasks, &mut state)?
            }
        };

        // ── Collect results ───────────────────────────────────────────────────
        let map = Self::assemble(placements, &hyperperiods)?;

        // ── Post-schedule: Liu & Layland feasibility warning ──────────────────
        for w in feasibility::check_schedule(&map) {
            warn!(
                node = %w.node_id,
                cpu = w.cpu,
                utilisation = w.total_utilisation,
                bound = w.bound,
                task_count = w.tasks.len(),
                "task set may not be RM-schedulable (utilisation exceeds Liu & Layland bound) \
                 — manual Response Time Analysis required"
            );
        }

        info!(
            node_count = map.len(),
            total_tasks = map.values().map(|i| i.tasks.len()).sum::<usize>(),
            "=== Scheduling complete ==="
        );

        Ok(map)
    }

    /// Evaluate a finished schedule against the Liu & Layland bound without
    /// re-running placement.
    pub fn feasibility_report(&self, schedule: &ScheduleMap) -> Vec<FeasibilityWarning> {
        feasibility::check_schedule(schedule)
    }

    // ── Hyperperiods ──────────────────────────────────────────────────────────

    /// Compute (and cache) the hyperperiod of every workload present in the
    /// call, returning a local snapshot so the lock is not held during
    /// placement.
    fn calculate_hyperperiods(
        &self,
        tasks: &[Task],
    ) -> Result<BTreeMap<String, u64>, SchedulerError> {
        let workload_ids: BTreeSet<&str> = tasks
            .iter()
            .filter(|t| !t.workload_id.is_empty())
            .map(|t| t.workload_id.as_str())
            .collect();

        let mut cache = self.hyperperiod_manager();
        let mut snapshot = BTreeMap::new();
        for workload_id in workload_ids {
            let info = cache.calculate(workload_id, tasks).map_err(|source| {
                SchedulerError::Hyperperiod {
                    workload_id: workload_id.to_string(),
                    source,
                }
            })?;
            snapshot.insert(workload_id.to_string(), info.hyperperiod_us);
        }
        Ok(snapshot)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Algorithm 1: best_fit_decreasing
    // ─────────────────────────────────────────────────────────────────────────

    /// Sort `tasks` by utilisation descending (name ascending as tie-break)
    /// and pack each onto the busiest feasible CPU, walking candidate nodes
    /// in id order.  Also used by `target_node_priority` for its unpinned
    /// remainder.
    fn place_best_fit_decreasing<'a>(
        &self,
        mut tasks: Vec<&'a Task>,
        state: &mut PlacementState,
    ) -> Result<Vec<Placement<'a>>, SchedulerError> {
        info!(task_count = tasks.len(), "Executing best_fit_decreasing");

        tasks.sort_by(|a, b| b.cmp_utilization(a).then_with(|| a.name.cmp(&b.name)));

        let mut placements = Vec::with_capacity(tasks.len());
        for task in tasks {
            placements.push(self.place_packed(task, state)?);
        }
        Ok(placements)
    }

    /// Place one task with the bin-packing CPU order.  Candidate nodes are
    /// the resolved target when one is named, otherwise all nodes in id
    /// order.
    fn place_packed<'a>(
        &self,
        task: &'a Task,
        state: &mut PlacementState,
    ) -> Result<Placement<'a>, SchedulerError> {
        let mgr = &self.node_config_manager;
        let (candidates, explicit_target): (Vec<&NodeConfig>, bool) =
            if task.target_node.is_empty() {
                (mgr.get_all_nodes().values().collect(), false)
            } else {
                let resolved = mgr.resolve_target(&task.target_node);
                if resolved.is_empty() {
                    return Err(SchedulerError::MissingTargetNode {
                        task: task.name.clone(),
                        target: task.target_node.clone(),
                    });
                }
                (resolved, true)
            };

        self.try_place(task, &candidates, true, state)
            .map_err(|last| Self::placement_failure(task, explicit_target, candidates.len(), last))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Algorithm 2: least_loaded
    // ─────────────────────────────────────────────────────────────────────────

    /// Keep input order; for each task try nodes by average utilisation
    /// ascending (node id as tie-break) and CPUs by utilisation ascending.
    fn place_least_loaded<'a>(
        &self,
        tasks: &'a [Task],
        state: &mut PlacementState,
    ) -> Result<Vec<Placement<'a>>, SchedulerError> {
        info!(task_count = tasks.len(), "Executing least_loaded");

        let mut placements = Vec::with_capacity(tasks.len());
        for task in tasks {
            let mut candidates: Vec<&NodeConfig> =
                self.node_config_manager.get_all_nodes().values().collect();
            candidates.sort_by(|a, b| {
                let ua = state.node_utilisation(&a.node_id);
                let ub = state.node_utilisation(&b.node_id);
                ua.partial_cmp(&ub)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.node_id.cmp(&b.node_id))
            });

            let placement = self
                .try_place(task, &candidates, false, state)
                .map_err(|last| {
                    Self::placement_failure(task, false, candidates.len(), last)
                })?;
            placements.push(placement);
        }
        Ok(placements)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Algorithm 3: target_node_priority
    // ─────────────────────────────────────────────────────────────────────────

    /// Place explicitly targeted tasks first (their target is the only
    /// candidate set; a refusal is final), then hand the rest to
    /// best-fit-decreasing over all nodes.
    ///
    /// Operators use this to pin safety-critical tasks while letting the
    /// scheduler spread the remainder.
    fn place_target_node_priority<'a>(
        &self,
        tasks: &'a [Task],
        state: &mut PlacementState,
    ) -> Result<Vec<Placement<'a>>, SchedulerError> {
        let (pinned, free): (Vec<&Task>, Vec<&Task>) =
            tasks.iter().partition(|t| !t.target_node.is_empty());

        info!(
            pinned = pinned.len(),
            free = free.len(),
            "Executing target_node_priority"
        );

        let mut placements = Vec::with_capacity(tasks.len());
        for task in pinned {
            let resolved = self.node_config_manager.resolve_target(&task.target_node);
            if resolved.is_empty() {
                return Err(SchedulerError::MissingTargetNode {
                    task: task.name.clone(),
                    target: task.target_node.clone(),
                });
            }
            let placement = self
                .try_place(task, &resolved, true, state)
                .map_err(|last| Self::placement_failure(task, true, resolved.len(), last))?;
            placements.push(placement);
        }

        placements.extend(self.place_best_fit_decreasing(free, state)?);
        Ok(placements)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Shared helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Walk `candidates` in order, enumerating each node's CPUs with the
    /// requested packing preference; the first (node, CPU) that passes
    /// admission wins and is committed.
    ///
    /// On failure returns the last rejection seen, which for a sole
    /// candidate is the reason that decided the task's fate.
    fn try_place<'a>(
        &self,
        task: &'a Task,
        candidates: &[&NodeConfig],
        prefer_high_util: bool,
        state: &mut PlacementState,
    ) -> Result<Placement<'a>, Option<(String, AdmissionReason)>> {
        let mut last_rejection: Option<(String, AdmissionReason)> = None;

        for cfg in candidates {
            for cpu in state.sorted_cpus(&cfg.node_id, prefer_high_util) {
                match check_admission(task, cfg, cpu, &state.util, &state.memory) {
                    Ok(()) => {
                        state.commit(task, &cfg.node_id, cpu);
                        info!(
                            task = %task.name,
                            node = %cfg.node_id,
                            cpu = cpu,
                            "✓ scheduled"
                        );
                        return Ok(Placement {
                            task,
                            node_id: cfg.node_id.clone(),
                            cpu,
                        });
                    }
                    Err(reason) => {
                        debug!(
                            task = %task.name,
                            node = %cfg.node_id,
                            cpu = cpu,
                            %reason,
                            "candidate rejected"
                        );
                        last_rejection = Some((cfg.node_id.clone(), reason));
                    }
                }
            }
        }

        Err(last_rejection)
    }

    /// Shape a failed placement into the right error: a refused sole
    /// candidate keeps its exact reason; a multi-node miss collapses to
    /// `NoSchedulableNode` (per-candidate reasons were logged at debug).
    fn placement_failure(
        task: &Task,
        explicit_target: bool,
        candidate_count: usize,
        last_rejection: Option<(String, AdmissionReason)>,
    ) -> SchedulerError {
        match last_rejection {
            Some((node, reason)) if explicit_target || candidate_count == 1 => {
                SchedulerError::AdmissionRejected {
                    task: task.name.clone(),
                    node,
                    reason,
                }
            }
            _ => SchedulerError::NoSchedulableNode {
                task: task.name.clone(),
            },
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Output assembly
    // ─────────────────────────────────────────────────────────────────────────

    /// Group placements by node, sort each node's tasks by (priority
    /// descending, name ascending), and attach the workload hyperperiod.
    ///
    /// A node hosting several workloads gets the LCM of their hyperperiods.
    fn assemble(
        placements: Vec<Placement<'_>>,
        hyperperiods: &BTreeMap<String, u64>,
    ) -> Result<ScheduleMap, SchedulerError> {
        let mut map = ScheduleMap::new();

        for p in &placements {
            if p.task.workload_id.is_empty() {
                return Err(SchedulerError::MissingWorkloadId {
                    task: p.task.name.clone(),
                });
            }
            let hyperperiod_us = hyperperiods
                .get(&p.task.workload_id)
                .copied()
                .unwrap_or(0);

            let info = map.entry(p.node_id.clone()).or_insert_with(|| SchedInfo {
                node_id: p.node_id.clone(),
                tasks: Vec::new(),
                hyperperiod_us: 0,
            });
            info.hyperperiod_us = if info.hyperperiod_us == 0 {
                hyperperiod_us
            } else {
                lcm(info.hyperperiod_us, hyperperiod_us)
            };
            info.tasks.push(SchedTask::from_task(p.task, p.cpu));
        }

        for info in map.values_mut() {
            info.tasks
                .sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        }

        Ok(map)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
