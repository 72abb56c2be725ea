//! Distributed run implementation
//!
//! # Architecture
//!
//! A run is a fixed set of processes identified by world rank:
//!
//! - **Coordinator** (rank 0): loads the input, scatters blocks, reduces totals
//! - **Error sink** (rank 1): logs rejected records from every participant
//! - **Workers** (rank 2+): validate and aggregate one block each
//!
//! Two independent contracts connect them. The collective group (coordinator and
//! workers) carries metadata, blocks and partial totals; the error channel (every
//! participant to the sink) carries rejected records and stop votes.
//!
//! # Modules
//!
//! - `protocol`: Message definitions and framing
//! - `role`: Rank to role mapping
//! - `group`: Broadcast / scatter / reduce over the collective group
//! - `error_channel`: Participant side of the error channel
//! - `coordinator`, `worker`, `error_sink`: The three roles
//! - `local`: Every role inside one process

pub mod coordinator;
pub mod error_channel;
pub mod error_sink;
pub mod group;
pub mod local;
pub mod protocol;
pub mod role;
pub mod worker;

// Re-export key types
pub use coordinator::Coordinator;
pub use error_sink::{ErrorSink, SinkSummary};
pub use local::{run_in_process, ClusterOutcome};
pub use protocol::{Message, PROTOCOL_VERSION};
pub use role::Role;
pub use worker::{process_block, BlockOutcome, Worker};

use crate::config::Config;
use crate::error::FatalError;
use crate::output::Report;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;

/// What a single participant process produced
#[derive(Debug)]
pub enum ParticipantOutcome {
    Coordinator(Report),
    Sink(SinkSummary),
    Worker(BlockOutcome),
}

/// Run the single role selected by `rank`
///
/// The coordinator and the error sink bind their listeners on the given addresses;
/// workers connect to both.
pub async fn run_participant(
    rank: usize,
    config: Arc<Config>,
    coordinator_addr: Option<SocketAddr>,
    sink_addr: SocketAddr,
) -> Result<ParticipantOutcome> {
    let cluster = &config.cluster;
    if rank >= cluster.world_size {
        return Err(FatalError::InvalidConfig(format!(
            "rank {} is outside a world of {}",
            rank, cluster.world_size
        ))
        .into());
    }

    let role = Role::from_rank(rank);
    tracing::info!(rank, %role, "Starting participant");

    match role {
        Role::ErrorSink => {
            let listener = tokio::net::TcpListener::bind(sink_addr).await
                .with_context(|| format!("Failed to bind error sink on {}", sink_addr))?;
            let summary = ErrorSink::new(listener, cluster.world_size).run().await?;
            Ok(ParticipantOutcome::Sink(summary))
        }
        Role::Worker => {
            let coordinator_addr = coordinator_addr
                .ok_or_else(|| FatalError::InvalidConfig("workers need the coordinator address".to_string()))?;
            let mut worker = Worker::new(
                rank,
                cluster.world_size,
                coordinator_addr,
                sink_addr,
                cluster.connect_timeout(),
            );
            Ok(ParticipantOutcome::Worker(worker.run().await?))
        }
        Role::Coordinator => {
            let coordinator_addr = coordinator_addr
                .ok_or_else(|| FatalError::InvalidConfig("the coordinator needs its listen address".to_string()))?;
            let listener = tokio::net::TcpListener::bind(coordinator_addr).await
                .with_context(|| format!("Failed to bind coordinator on {}", coordinator_addr))?;
            let report = Coordinator::new(config.clone(), listener, sink_addr).run().await?;
            Ok(ParticipantOutcome::Coordinator(report))
        }
    }
}
