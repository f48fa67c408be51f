/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! gRPC wiring for the `ScheduleService`.
//!
//! The handler is a thin translation layer: proto `TaskInfo` values become
//! [`Task`]s on the way in (wire integers → closed enums, zero deadline →
//! implicit deadline), and the finished [`ScheduleMap`] becomes a
//! `ScheduleReply` on the way out.  A scheduling call is synchronous and
//! CPU-bound — O(tasks · nodes · cpus) — so the handler off-loads it to a
//! blocking worker instead of stalling the tonic executor.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::info;

use crate::proto::cadence_v1 as pb;
use crate::scheduler::{GlobalScheduler, SchedulerError};
use crate::task::{CpuAffinity, SchedPolicy, ScheduleMap, Task};

use pb::schedule_service_server::{ScheduleService, ScheduleServiceServer};

// ── Conversions ───────────────────────────────────────────────────────────────

/// Translate one wire task into the scheduler's model.
///
/// * unknown policy integers become `Normal`;
/// * a zero affinity mask (and the all-ones sentinel) become `Any`;
/// * a zero deadline means implicit deadline (`deadline == period`);
/// * priority is clamped into `0..=99`.
pub fn task_from_wire(info: &pb::TaskInfo, workload_id: &str) -> Task {
    let deadline_us = if info.deadline_us == 0 {
        info.period_us
    } else {
        info.deadline_us
    };

    Task {
        name: info.name.clone(),
        workload_id: workload_id.to_string(),
        target_node: info.target_node.clone(),
        policy: SchedPolicy::from_wire(info.policy),
        priority: info.priority.clamp(0, 99),
        affinity: CpuAffinity::from_mask(info.cpu_affinity),
        memory_mb: info.memory_mb,
        period_us: info.period_us,
        runtime_us: info.runtime_us,
        deadline_us,
        release_time_us: info.release_time_us,
    }
}

/// Translate a finished schedule into the wire reply, re-materialising the
/// policy integer at this boundary.
pub fn reply_from_schedule(schedule: &ScheduleMap) -> pb::ScheduleReply {
    pb::ScheduleReply {
        nodes: schedule
            .values()
            .map(|info| pb::NodeSchedule {
                node_id: info.node_id.clone(),
                hyperperiod_us: info.hyperperiod_us,
                tasks: info
                    .tasks
                    .iter()
                    .map(|t| pb::SchedTaskEntry {
                        name: t.name.clone(),
                        pid: t.pid,
                        assigned_cpu: t.assigned_cpu,
                        priority: t.priority,
                        policy: t.policy.to_wire(),
                        period_ns: t.period_ns,
                        runtime_ns: t.runtime_ns,
                        deadline_ns: t.deadline_ns,
                        release_time_ns: t.release_time_ns,
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Map a scheduler failure onto the gRPC status taxonomy documented in
/// [`SchedulerError`].
pub fn status_from_error(err: SchedulerError) -> Status {
    let message = err.to_string();
    match err {
        SchedulerError::NoTasks
        | SchedulerError::UnknownAlgorithm(_)
        | SchedulerError::MissingWorkloadId { .. }
        | SchedulerError::MissingTargetNode { .. }
        | SchedulerError::Hyperperiod { .. } => Status::invalid_argument(message),
        SchedulerError::ConfigNotLoaded => Status::failed_precondition(message),
        SchedulerError::AdmissionRejected { .. } | SchedulerError::NoSchedulableNode { .. } => {
            Status::resource_exhausted(message)
        }
    }
}

// ── Service implementation ────────────────────────────────────────────────────

/// `ScheduleService` backed by a shared [`GlobalScheduler`].
pub struct ScheduleHandler {
    scheduler: Arc<GlobalScheduler>,
}

impl ScheduleHandler {
    pub fn new(scheduler: Arc<GlobalScheduler>) -> Self {
        Self { scheduler }
    }
}

#[tonic::async_trait]
impl ScheduleService for ScheduleHandler {
    async fn schedule(
        &self,
        request: Request<pb::ScheduleRequest>,
    ) -> Result<Response<pb::ScheduleReply>, Status> {
        let req = request.into_inner();

        info!(
            workload_id = %req.workload_id,
            algorithm = %req.algorithm,
            task_count = req.tasks.len(),
            "Schedule RPC received"
        );

        let tasks: Vec<Task> = req
            .tasks
            .iter()
            .map(|t| task_from_wire(t, &req.workload_id))
            .collect();

        let scheduler = Arc::clone(&self.scheduler);
        let algorithm = req.algorithm;
        let schedule = tokio::task::spawn_blocking(move || scheduler.schedule(&algorithm, &tasks))
            .await
            .map_err(|e| Status::internal(format!("scheduling worker failed: {e}")))?
            .map_err(status_from_error)?;

        Ok(Response::new(reply_from_schedule(&schedule)))
    }
}

/// Run the `ScheduleService` until the process is stopped.
pub async fn serve(addr: SocketAddr, scheduler: Arc<GlobalScheduler>) -> anyhow::Result<()> {
    info!(%addr, "ScheduleService listening");

    Server::builder()
        .add_service(ScheduleServiceServer::new(ScheduleHandler::new(scheduler)))
        .serve(addr)
        .await
        .context("gRPC server terminated")?;

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfigManager;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tonic::Code;

    fn wire_task(name: &str, period_us: u64, runtime_us: u64) -> pb::TaskInfo {
        pb::TaskInfo {
            name: name.into(),
            target_node: String::new(),
            period_us,
            runtime_us,
            deadline_us: 0,
            priority: 10,
            policy: 1,
            cpu_affinity: 0,
            memory_mb: 0,
            release_time_us: 0,
        }
    }

    fn handler_with_one_node() -> ScheduleHandler {
        let yaml = "nodes:\n  node01:\n    cpus: [0, 1]\n";
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        let mut mgr = NodeConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();
        ScheduleHandler::new(Arc::new(GlobalScheduler::new(Arc::new(mgr))))
    }

    // ── task_from_wire ────────────────────────────────────────────────────────

    #[test]
    fn wire_task_translates_into_the_model() {
        let mut info = wire_task("t", 10_000, 1_000);
        info.cpu_affinity = 0x8;
        info.memory_mb = 64;

        let task = task_from_wire(&info, "wl1");
        assert_eq!(task.workload_id, "wl1");
        assert_eq!(task.policy, SchedPolicy::Fifo);
        assert_eq!(task.affinity, CpuAffinity::Pinned(0x8));
        assert_eq!(task.memory_mb, 64);
        assert_eq!(task.deadline_us, 10_000); // zero deadline → period
    }

    #[test]
    fn wire_task_unknown_policy_becomes_normal() {
        let mut info = wire_task("t", 10_000, 1_000);
        info.policy = 42;
        assert_eq!(task_from_wire(&info, "w").policy, SchedPolicy::Normal);
    }

    #[test]
    fn wire_task_priority_is_clamped() {
        let mut info = wire_task("t", 10_000, 1_000);
        info.priority = 250;
        assert_eq!(task_from_wire(&info, "w").priority, 99);
        info.priority = -5;
        assert_eq!(task_from_wire(&info, "w").priority, 0);
    }

    #[test]
    fn wire_task_explicit_deadline_is_kept() {
        let mut info = wire_task("t", 10_000, 1_000);
        info.deadline_us = 8_000;
        assert_eq!(task_from_wire(&info, "w").deadline_us, 8_000);
    }

    // ── status mapping ────────────────────────────────────────────────────────

    #[test]
    fn scheduler_errors_map_to_expected_status_codes() {
        assert_eq!(
            status_from_error(SchedulerError::NoTasks).code(),
            Code::InvalidArgument
        );
        assert_eq!(
            status_from_error(SchedulerError::ConfigNotLoaded).code(),
            Code::FailedPrecondition
        );
        assert_eq!(
            status_from_error(SchedulerError::UnknownAlgorithm("x".into())).code(),
            Code::InvalidArgument
        );
        assert_eq!(
            status_from_error(SchedulerError::NoSchedulableNode { task: "t".into() }).code(),
            Code::ResourceExhausted
        );
    }

    // ── end-to-end through the handler ────────────────────────────────────────

    #[tokio::test]
    async fn schedule_rpc_returns_per_node_descriptors() {
        let handler = handler_with_one_node();
        let req = pb::ScheduleRequest {
            workload_id: "wl1".into(),
            algorithm: "least_loaded".into(),
            tasks: vec![wire_task("a", 10_000, 1_000), wire_task("b", 20_000, 1_000)],
        };

        let reply = handler
            .schedule(Request::new(req))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(reply.nodes.len(), 1);
        let node = &reply.nodes[0];
        assert_eq!(node.node_id, "node01");
        assert_eq!(node.hyperperiod_us, 20_000);
        assert_eq!(node.tasks.len(), 2);
        for t in &node.tasks {
            assert_eq!(t.pid, 0);
            assert_eq!(t.policy, 1); // FIFO re-materialised as its wire integer
            assert_eq!(t.period_ns % 1_000, 0);
        }
    }

    #[tokio::test]
    async fn schedule_rpc_rejects_unknown_algorithm() {
        let handler = handler_with_one_node();
        let req = pb::ScheduleRequest {
            workload_id: "wl1".into(),
            algorithm: "fair_share".into(),
            tasks: vec![wire_task("a", 10_000, 1_000)],
        };

        let status = handler.schedule(Request::new(req)).await.unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn schedule_rpc_maps_admission_failure_to_resource_exhausted() {
        let handler = handler_with_one_node();
        // 0.95 utilisation exceeds the 0.9 ceiling on both CPUs
        let req = pb::ScheduleRequest {
            workload_id: "wl1".into(),
            algorithm: "least_loaded".into(),
            tasks: vec![wire_task("hog", 10_000, 9_500)],
        };

        let status = handler.schedule(Request::new(req)).await.unwrap_err();
        assert_eq!(status.code(), Code::ResourceExhausted);
    }
}
