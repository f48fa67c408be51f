/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cadence – global scheduler for distributed real-time workloads.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── proto/          – generated gRPC/protobuf types & stubs
//! ├── config/         – YAML node configuration
//! ├── task/           – task, affinity, policy, schedule descriptors
//! ├── hyperperiod/    – per-workload LCM cache + GCD/LCM helpers
//! ├── scheduler/      – admission control + three placement algorithms
//! ├── workload/       – YAML workload descriptions (CLI input)
//! └── grpc/           – ScheduleService server wiring
//! ```

pub mod config;
pub mod grpc;
pub mod hyperperiod;
pub mod proto;
pub mod scheduler;
pub mod task;
pub mod workload;
