/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Cadence global scheduler binary.
//!
//! Two modes share the same loaded node configuration:
//!
//! * `plan`  – one-shot: load a workload YAML, schedule it, print the
//!   per-node descriptors as YAML on stdout.
//! * `serve` – run the gRPC `ScheduleService` for the upstream orchestrator.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use cadence_gs::config::{NodeConfigManager, DEFAULT_MAX_UTILISATION};
use cadence_gs::grpc;
use cadence_gs::hyperperiod::DEFAULT_HYPERPERIOD_WARN_CEILING_US;
use cadence_gs::scheduler::GlobalScheduler;
use cadence_gs::workload;

#[derive(Parser)]
#[command(name = "cadence-gs", version, about = "Cadence global scheduler")]
struct Cli {
    /// Node configuration YAML file.
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Per-CPU utilisation ceiling for nodes without an explicit
    /// max_utilisation entry.
    #[arg(long, default_value_t = DEFAULT_MAX_UTILISATION)]
    cpu_utilisation_threshold: f64,

    /// Hyperperiod warn ceiling in microseconds.
    #[arg(long, default_value_t = DEFAULT_HYPERPERIOD_WARN_CEILING_US)]
    hyperperiod_warn_ceiling_us: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Schedule a workload file once and print the result.
    Plan {
        /// Workload description YAML file.
        #[arg(long, short = 'w')]
        workload: PathBuf,

        /// Placement algorithm: best_fit_decreasing, least_loaded or
        /// target_node_priority.
        #[arg(long, short = 'a', default_value = "best_fit_decreasing")]
        algorithm: String,
    },
    /// Run the gRPC ScheduleService.
    Serve {
        /// Listen address.
        #[arg(long, default_value = "0.0.0.0:50061")]
        listen: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut manager = NodeConfigManager::with_default_threshold(cli.cpu_utilisation_threshold);
    manager.load_from_file(&cli.config)?;

    let scheduler = Arc::new(GlobalScheduler::with_hyperperiod_ceiling(
        Arc::new(manager),
        cli.hyperperiod_warn_ceiling_us,
    ));

    match cli.command {
        Command::Plan {
            workload: path,
            algorithm,
        } => {
            let (workload_id, tasks) = workload::load_workload(&path)?;
            let schedule = scheduler
                .schedule(&algorithm, &tasks)
                .with_context(|| format!("scheduling workload '{workload_id}' failed"))?;

            let warnings = scheduler.feasibility_report(&schedule);
            if !warnings.is_empty() {
                warn!(
                    count = warnings.len(),
                    "schedule accepted with feasibility warnings"
                );
            }

            print!("{}", serde_yaml::to_string(&schedule)?);
        }
        Command::Serve { listen } => {
            grpc::serve(listen, scheduler).await?;
        }
    }

    Ok(())
}
