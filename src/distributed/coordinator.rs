//! Coordinator role
//!
//! The coordinator (rank 0):
//! - Waits for every worker to join the collective group
//! - Loads the input and checks the run-level parameters
//! - Broadcasts the run metadata and scatters the record blocks
//! - Processes its own block exactly like a worker
//! - Receives the reduced totals and builds the report
//!
//! A fatal condition found while preparing the run is sent as an abort to every
//! worker and to the error sink before it is returned.

use crate::aggregate::ReportTargets;
use crate::config::validator;
use crate::config::Config;
use crate::distributed::error_channel::ErrorReporter;
use crate::distributed::group::GroupRoot;
use crate::distributed::protocol::*;
use crate::distributed::role::COORDINATOR_RANK;
use crate::distributed::worker::process_block;
use crate::error::FatalError;
use crate::output::Report;
use crate::partition;
use crate::record::{self, Dataset};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Coordinator role
pub struct Coordinator {
    /// Run configuration
    config: Arc<Config>,

    /// Listener the workers connect to
    listener: TcpListener,

    /// Error sink address
    sink_addr: SocketAddr,
}

/// Everything loaded and checked before the first collective
#[derive(Debug)]
struct PreparedRun {
    dataset: Dataset,
    targets: ReportTargets,
}

impl Coordinator {
    pub fn new(config: Arc<Config>, listener: TcpListener, sink_addr: SocketAddr) -> Self {
        Self {
            config,
            listener,
            sink_addr,
        }
    }

    /// Run the coordinator and return the final report
    pub async fn run(self) -> Result<Report> {
        let timeout = self.config.cluster.connect_timeout();
        let group_size = self.config.cluster.group_size();

        let mut reporter = ErrorReporter::connect(self.sink_addr, COORDINATOR_RANK, timeout)
            .await
            .context("Coordinator failed to open the error channel")?;

        tracing::info!(group_size, "Waiting for workers to join");
        let mut group = match GroupRoot::accept(&self.listener, group_size, timeout).await {
            Ok(group) => group,
            Err(e) => {
                reporter.abort("coordinator failed to assemble the group").await.ok();
                return Err(e);
            }
        };
        tracing::info!(group_size = group.size(), "All workers joined");

        let prepared = match self.prepare() {
            Ok(prepared) => prepared,
            Err(fatal) => {
                let reason = fatal.to_string();
                tracing::info!(%reason, exit_code = fatal.exit_code(), "Aborting run");
                group.abort(&reason).await;
                if let Err(e) = reporter.abort(&reason).await {
                    tracing::warn!(error = %e, "Failed to deliver abort to error sink");
                }
                return Err(fatal.into());
            }
        };

        let PreparedRun { dataset, targets } = prepared;
        let meta = RunMetadata {
            record_count: dataset.len(),
            category_count: dataset.categories,
            rules: self.config.rules.to_validation_rules(dataset.categories),
            targets,
        };

        tracing::info!(
            records = meta.record_count,
            categories = meta.category_count,
            year = targets.year,
            customer_type = %targets.customer_type,
            "Starting run"
        );

        group.broadcast(&Message::Metadata(meta.clone())).await
            .context("Metadata broadcast failed")?;

        let plan = partition::plan(dataset.len(), group.size())?;
        tracing::debug!(counts = ?plan.counts(), displacements = ?plan.displacements(), "Partition plan");

        let own_block = group.scatter(&plan, &dataset.records).await
            .context("Block scatter failed")?;
        drop(dataset);

        let outcome = process_block(&own_block, &meta, &mut reporter)?;
        tracing::info!(
            rank = COORDINATOR_RANK,
            records = own_block.len(),
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "Block processed"
        );

        reporter.finish().await?;

        let totals = group.reduce(outcome.totals).await
            .context("Reduction failed")?;

        Ok(Report::from_totals(targets, &totals))
    }

    /// Load the input and check the run-level parameters
    ///
    /// Order: accepted domains, input file, customer type, report year.
    fn prepare(&self) -> Result<PreparedRun, FatalError> {
        validator::validate_rules(&self.config.rules)?;

        let path = self.config.input.path.as_ref().ok_or_else(|| {
            FatalError::InvalidConfig("input file path is required".to_string())
        })?;
        let dataset = record::load_dataset(path)?;
        tracing::debug!(path = %path.display(), records = dataset.len(), "Input loaded");

        let targets = validator::validate_report(&self.config.report, &self.config.rules)?;

        Ok(PreparedRun { dataset, targets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributed::error_sink::ErrorSink;
    use std::io::Write;

    async fn run_alone(config: Config) -> (Result<Report>, crate::distributed::error_sink::SinkSummary) {
        let sink_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let sink_addr = sink_listener.local_addr().unwrap();
        let sink = tokio::spawn(ErrorSink::new(sink_listener, 2).run());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let result = Coordinator::new(Arc::new(config), listener, sink_addr).run().await;
        let summary = sink.await.unwrap().unwrap();
        (result, summary)
    }

    fn config_for(path: &std::path::Path, year: i32, customer_type: char) -> Config {
        let mut config = Config::default();
        config.cluster.world_size = 2;
        config.rules.max_year = 2020;
        config.input.path = Some(path.to_path_buf());
        config.report.year = Some(year);
        config.report.customer_type = Some(customer_type);
        config
    }

    #[tokio::test]
    async fn test_coordinator_alone() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "3 2\n0 202001 I 10.0\n1 202001 R 5.0\n7 202001 R 5.0").unwrap();

        let (result, summary) = run_alone(config_for(file.path(), 2020, 'I')).await;
        let report = result.unwrap();

        assert_eq!(report.rows[0].total, 10.0);
        assert_eq!(report.rows[1].total_for_type, 0.0);
        assert_eq!(summary.votes, 1);
        assert_eq!(summary.total(), 1);
    }

    #[tokio::test]
    async fn test_missing_input_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (result, summary) = run_alone(config_for(&dir.path().join("absent.txt"), 2020, 'I')).await;

        let err = result.unwrap_err();
        assert!(matches!(FatalError::find_in(&err), Some(FatalError::InvalidInputPath { .. })));
        assert!(summary.aborted.is_some());
    }

    #[tokio::test]
    async fn test_customer_type_checked_before_year() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 1").unwrap();

        let (result, _) = run_alone(config_for(file.path(), 1800, 'Q')).await;
        let err = result.unwrap_err();
        assert_eq!(FatalError::find_in(&err).map(FatalError::exit_code), Some(4));
    }
}
