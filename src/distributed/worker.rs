//! Worker role
//!
//! A worker (rank 2 and up) joins the collective group, receives the run metadata
//! and its block, validates and aggregates the block, reports rejected records to
//! the error sink and contributes its local totals to the reduction.
//!
//! The same [`process_block`] routine runs on the coordinator for its own block.

use crate::aggregate::{AggregationState, Aggregator};
use crate::distributed::error_channel::{ErrorReporter, RejectionSink};
use crate::distributed::group::GroupMember;
use crate::distributed::protocol::RunMetadata;
use crate::error::FatalError;
use crate::partition;
use crate::record::Record;
use crate::validate::{self, ValidationResult};
use anyhow::{Context, Result};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

/// Result of validating and aggregating one block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutcome {
    /// Local per-category totals
    pub totals: AggregationState,
    /// Records that passed validation
    pub accepted: usize,
    /// Records reported to the error sink
    pub rejected: usize,
}

/// Validate and aggregate a block
///
/// Valid records go into the local totals; every invalid record is handed to
/// `rejections` with its first failing error code, in block order.
pub fn process_block<S: RejectionSink>(
    block: &[Record],
    meta: &RunMetadata,
    rejections: &mut S,
) -> Result<BlockOutcome> {
    let mut aggregator = Aggregator::new(meta.category_count, meta.targets);
    let mut rejected = 0;

    for record in block {
        match validate::classify(record, &meta.rules) {
            ValidationResult::Valid(year) => aggregator.ingest(record, year),
            ValidationResult::Invalid(code) => {
                rejections.reject(record, code)?;
                rejected += 1;
            }
        }
    }

    let accepted = aggregator.ingested();
    Ok(BlockOutcome {
        totals: aggregator.snapshot(),
        accepted,
        rejected,
    })
}

/// Where a worker is in the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    AwaitMetadata,
    AwaitBlock,
    Processing,
    AwaitReduction,
    Done,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerPhase::AwaitMetadata => "awaiting metadata",
            WorkerPhase::AwaitBlock => "awaiting block",
            WorkerPhase::Processing => "processing",
            WorkerPhase::AwaitReduction => "contributing to reduction",
            WorkerPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Worker role
pub struct Worker {
    /// World rank (2 and up)
    rank: usize,
    world_size: usize,
    coordinator_addr: SocketAddr,
    sink_addr: SocketAddr,
    connect_timeout: Duration,
    phase: WorkerPhase,
}

impl Worker {
    pub fn new(
        rank: usize,
        world_size: usize,
        coordinator_addr: SocketAddr,
        sink_addr: SocketAddr,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            rank,
            world_size,
            coordinator_addr,
            sink_addr,
            connect_timeout,
            phase: WorkerPhase::AwaitMetadata,
        }
    }

    /// Current phase
    pub fn phase(&self) -> WorkerPhase {
        self.phase
    }

    /// Run this worker's part of the job
    ///
    /// Returns the outcome of the local block. An abort from the coordinator comes
    /// back as [`FatalError::Aborted`].
    pub async fn run(&mut self) -> Result<BlockOutcome> {
        if self.rank < 2 || self.rank >= self.world_size {
            return Err(FatalError::InvalidConfig(format!(
                "worker rank {} is outside 2..{}",
                self.rank, self.world_size
            ))
            .into());
        }

        // The error channel comes first: once every member has joined, the
        // coordinator may abort and the sink stop accepting
        let mut reporter = ErrorReporter::connect(self.sink_addr, self.rank, self.connect_timeout)
            .await
            .with_context(|| format!("Rank {} failed to open the error channel", self.rank))?;
        let mut member = match GroupMember::join(self.coordinator_addr, self.rank, self.connect_timeout).await {
            Ok(member) => member,
            Err(e) => {
                reporter.close().await.ok();
                return Err(e.context(format!("Rank {} failed to join the group", self.rank)));
            }
        };

        tracing::debug!(rank = self.rank, "Worker connected");

        let meta = match member.recv_metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                // The coordinator already told the sink; leave without voting
                reporter.close().await.ok();
                return Err(e.context(format!("Rank {} while {}", self.rank, self.phase)));
            }
        };

        self.phase = WorkerPhase::AwaitBlock;
        let group_size = self.world_size - 1;
        let expected = partition::block_len(meta.record_count, group_size, member.group_rank());

        let block = match member.recv_block(expected).await {
            Ok(block) => block,
            Err(e) => {
                reporter.close().await.ok();
                return Err(e.context(format!("Rank {} while {}", self.rank, self.phase)));
            }
        };

        self.phase = WorkerPhase::Processing;
        let outcome = process_block(&block, &meta, &mut reporter)?;
        tracing::info!(
            rank = self.rank,
            records = block.len(),
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "Block processed"
        );

        reporter.finish().await?;

        self.phase = WorkerPhase::AwaitReduction;
        member
            .contribute(outcome.totals.clone())
            .await
            .with_context(|| format!("Rank {} while {}", self.rank, self.phase))?;

        self.phase = WorkerPhase::Done;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ReportTargets;
    use crate::validate::{ErrorCode, ValidationRules};

    fn metadata(categories: usize) -> RunMetadata {
        RunMetadata {
            record_count: 0,
            category_count: categories,
            rules: ValidationRules {
                categories,
                min_year: 1997,
                max_year: 2020,
                customer_types: vec!['I', 'R', 'G'],
            },
            targets: ReportTargets { year: 2020, customer_type: 'I' },
        }
    }

    #[test]
    fn test_process_block_splits_valid_and_invalid() {
        let block = vec![
            Record::new(0, 202001, 'I', 10.0),
            Record::new(1, 201912, 'R', 5.0),
            Record::new(2, 202001, 'I', 1.0),  // model out of range
            Record::new(1, 20201, 'I', 1.0),   // five digit date
            Record::new(1, 202013, 'I', 1.0),  // month 13
            Record::new(1, 199601, 'I', 1.0),  // year too early
            Record::new(1, 202001, 'X', 1.0),  // unknown type
            Record::new(1, 202001, 'I', 0.0),  // zero amount
        ];

        let mut rejections: Vec<(Record, ErrorCode)> = Vec::new();
        let outcome = process_block(&block, &metadata(2), &mut rejections).unwrap();

        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.rejected, 6);
        assert_eq!(outcome.totals.total_all, vec![10.0, 5.0]);
        assert_eq!(outcome.totals.total_for_year, vec![10.0, 0.0]);
        assert_eq!(outcome.totals.total_for_type, vec![10.0, 0.0]);

        let codes: Vec<ErrorCode> = rejections.iter().map(|(_, c)| *c).collect();
        assert_eq!(codes, ErrorCode::ALL.to_vec());
        assert_eq!(rejections[0].0, block[2]);
    }

    #[test]
    fn test_empty_block() {
        let mut rejections: Vec<(Record, ErrorCode)> = Vec::new();
        let outcome = process_block(&[], &metadata(3), &mut rejections).unwrap();

        assert_eq!(outcome.totals, AggregationState::zeroed(3));
        assert_eq!(outcome.accepted, 0);
        assert!(rejections.is_empty());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(WorkerPhase::AwaitBlock.to_string(), "awaiting block");
        assert_eq!(WorkerPhase::Done.to_string(), "done");
    }

    #[tokio::test]
    async fn test_rank_outside_world_is_rejected() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let mut worker = Worker::new(5, 4, addr, addr, Duration::from_secs(1));

        let err = worker.run().await.unwrap_err();
        assert!(matches!(FatalError::find_in(&err), Some(FatalError::InvalidConfig(_))));
        assert_eq!(worker.phase(), WorkerPhase::AwaitMetadata);
    }
}
