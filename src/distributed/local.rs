//! In-process cluster
//!
//! Runs every role of a run as a tokio task inside one process: the coordinator on
//! the current task, the error sink and each worker on their own task. Roles still
//! talk over loopback TCP, so this exercises exactly the same protocol as a
//! multi-process launch.

use crate::config::Config;
use crate::distributed::coordinator::Coordinator;
use crate::distributed::error_sink::{ErrorSink, SinkSummary};
use crate::distributed::worker::Worker;
use crate::output::Report;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Everything a finished in-process run produced
#[derive(Debug, Clone)]
pub struct ClusterOutcome {
    pub report: Report,
    pub sink: SinkSummary,
}

/// Run a complete job with every role inside this process
///
/// If the coordinator fails, the other roles are still joined so no task outlives
/// the run, and the coordinator's error is returned.
pub async fn run_in_process(config: Config) -> Result<ClusterOutcome> {
    let config = Arc::new(config);
    let cluster = &config.cluster;
    let host = cluster.bind_host.as_str();

    let coordinator_listener = TcpListener::bind((host, 0)).await
        .with_context(|| format!("Failed to bind coordinator listener on {}", host))?;
    let sink_listener = TcpListener::bind((host, 0)).await
        .with_context(|| format!("Failed to bind error sink listener on {}", host))?;

    let coordinator_addr = coordinator_listener.local_addr()?;
    let sink_addr = sink_listener.local_addr()?;

    tracing::info!(
        world_size = cluster.world_size,
        %coordinator_addr,
        %sink_addr,
        "Starting in-process cluster"
    );

    let sink = tokio::spawn(ErrorSink::new(sink_listener, cluster.world_size).run());

    let mut workers = Vec::new();
    for rank in 2..cluster.world_size {
        let mut worker = Worker::new(
            rank,
            cluster.world_size,
            coordinator_addr,
            sink_addr,
            cluster.connect_timeout(),
        );
        workers.push(tokio::spawn(async move { worker.run().await }));
    }

    let coordinator = Coordinator::new(config.clone(), coordinator_listener, sink_addr);
    let report = coordinator.run().await;

    for (i, handle) in workers.into_iter().enumerate() {
        let rank = i + 2;
        match handle.await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::debug!(rank, error = %format!("{:#}", e), "Worker ended with error"),
            Err(e) => tracing::warn!(rank, error = %e, "Worker task panicked"),
        }
    }

    let sink = sink.await
        .map_err(|e| anyhow::anyhow!("Error sink task panicked: {}", e))?;

    let report = report?;
    let sink = sink.context("Error sink failed")?;

    Ok(ClusterOutcome { report, sink })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FatalError;
    use crate::validate::ErrorCode;
    use rand::Rng;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_input(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn config_for(file: &NamedTempFile, world_size: usize, year: i32, customer_type: char) -> Config {
        let mut config = Config::default();
        config.input.path = Some(file.path().to_path_buf());
        config.report.year = Some(year);
        config.report.customer_type = Some(customer_type);
        config.rules.max_year = 2020;
        config.cluster.world_size = world_size;
        config
    }

    #[tokio::test]
    async fn test_two_record_scenario() {
        let file = write_input("2 2\n0 202001 I 10.0\n1 202001 R 5.0\n");

        let outcome = run_in_process(config_for(&file, 4, 2020, 'I')).await.unwrap();
        let rows = &outcome.report.rows;

        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].total, rows[0].total_for_year, rows[0].total_for_type), (10.0, 10.0, 10.0));
        assert_eq!((rows[1].total, rows[1].total_for_year, rows[1].total_for_type), (5.0, 5.0, 0.0));
        assert_eq!(outcome.sink.total(), 0);
        assert_eq!(outcome.sink.votes, 3);
    }

    #[tokio::test]
    async fn test_invalid_records_reach_sink() {
        let file = write_input(
            "6 2\n\
             0 202001 I 10.0\n\
             2 202001 I 1.0\n\
             1 20201 I 1.0\n\
             1 202013 I 1.0\n\
             1 199601 I 1.0\n\
             1 202001 I -3.0\n",
        );

        let outcome = run_in_process(config_for(&file, 5, 2020, 'I')).await.unwrap();

        assert_eq!(outcome.report.rows[0].total, 10.0);
        assert_eq!(outcome.report.rows[1].total, 0.0);
        assert_eq!(outcome.sink.count(ErrorCode::BadModelNumber), 1);
        assert_eq!(outcome.sink.count(ErrorCode::BadPurchaseDate), 1);
        assert_eq!(outcome.sink.count(ErrorCode::BadPurchaseMonth), 1);
        assert_eq!(outcome.sink.count(ErrorCode::BadPurchaseYear), 1);
        assert_eq!(outcome.sink.count(ErrorCode::BadCustomerType), 0);
        assert_eq!(outcome.sink.count(ErrorCode::BadPurchaseAmount), 1);
        assert_eq!(outcome.sink.votes, 4);
    }

    #[tokio::test]
    async fn test_empty_dataset() {
        let file = write_input("0 3\n");

        let outcome = run_in_process(config_for(&file, 4, 2010, 'G')).await.unwrap();

        assert_eq!(outcome.report.rows.len(), 3);
        assert!(outcome.report.rows.iter().all(|r| r.total == 0.0 && r.total_for_year == 0.0 && r.total_for_type == 0.0));
    }

    #[tokio::test]
    async fn test_sink_only_world() {
        let file = write_input("2 2\n0 202001 I 10.0\n1 202001 R 5.0\n");

        let outcome = run_in_process(config_for(&file, 2, 2020, 'R')).await.unwrap();
        assert_eq!(outcome.report.rows[1].total_for_type, 5.0);
        assert_eq!(outcome.sink.votes, 1);
    }

    #[tokio::test]
    async fn test_totals_independent_of_world_size() {
        let mut rng = rand::thread_rng();
        let categories = 5;
        let types = ['I', 'R', 'G'];

        let mut contents = String::new();
        let count = 97;
        let mut valid_sum = 0.0;
        contents.push_str(&format!("{} {}\n", count, categories));
        for _ in 0..count {
            let model = rng.gen_range(-1..=categories as i64);
            let date = rng.gen_range(1996..=2021) * 100 + rng.gen_range(0..=13);
            let customer_type = types[rng.gen_range(0..types.len())];
            // Quarter-unit amounts keep floating point sums exact
            let amount = rng.gen_range(-4..=400) as f64 * 0.25;

            let month = date % 100;
            let year = date / 100;
            if (0..categories as i64).contains(&model)
                && (1..=12).contains(&month)
                && (1997..=2020).contains(&year)
                && amount > 0.0
            {
                valid_sum += amount;
            }
            contents.push_str(&format!("{} {} {} {}\n", model, date, customer_type, amount));
        }
        let file = write_input(&contents);

        let baseline = run_in_process(config_for(&file, 2, 2015, 'R')).await.unwrap();
        assert_eq!(baseline.report.grand_total(), valid_sum);

        for world_size in [3, 4, 7] {
            let outcome = run_in_process(config_for(&file, world_size, 2015, 'R')).await.unwrap();
            assert_eq!(outcome.report, baseline.report, "world_size {}", world_size);
            assert_eq!(outcome.sink.total(), baseline.sink.total());
        }
    }

    #[tokio::test]
    async fn test_invalid_customer_type_aborts() {
        let file = write_input("1 1\n0 202001 I 1.0\n");

        let err = run_in_process(config_for(&file, 4, 2020, 'X')).await.unwrap_err();
        let fatal = FatalError::find_in(&err).expect("fatal error");
        assert!(matches!(fatal, FatalError::InvalidCustomerType { customer_type, .. } if customer_type == "X"));
        assert_eq!(fatal.exit_code(), 4);
    }

    #[tokio::test]
    async fn test_invalid_year_aborts() {
        let file = write_input("1 1\n0 202001 I 1.0\n");

        let err = run_in_process(config_for(&file, 3, 2021, 'I')).await.unwrap_err();
        let fatal = FatalError::find_in(&err).expect("fatal error");
        assert!(matches!(fatal, FatalError::InvalidReportYear { year, .. } if year == "2021"));
    }

    #[tokio::test]
    async fn test_oversized_category_count_aborts() {
        let file = write_input("1 18446744073709551615\n0 202001 I 1.0\n");

        let err = run_in_process(config_for(&file, 4, 2020, 'I')).await.unwrap_err();
        assert_eq!(FatalError::find_in(&err).map(FatalError::exit_code), Some(3));
    }

    #[tokio::test]
    async fn test_missing_file_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.input.path = Some(dir.path().join("nope.txt"));
        config.report.year = Some(2000);
        config.report.customer_type = Some('I');

        let err = run_in_process(config).await.unwrap_err();
        assert_eq!(FatalError::find_in(&err).map(FatalError::exit_code), Some(2));
    }
}
