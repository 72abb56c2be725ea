//! Error sink role
//!
//! The error sink (rank 1) accepts one connection per participant and logs every
//! rejected record it receives. Arrivals from different participants are merged in
//! whatever order they come; within one participant they arrive in send order.
//!
//! The sink stops once every participant rank has cast its stop vote (or closed
//! its connection without one), or immediately when the coordinator sends the
//! abort sentinel. A rank is counted at most once, and connections that never send
//! a HELLO are not counted at all.

use crate::distributed::protocol::*;
use crate::distributed::role::Role;
use crate::record::Record;
use crate::validate::ErrorCode;
use anyhow::{Context, Result};
use std::collections::HashSet;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// Event forwarded from a connection reader to the sink loop
#[derive(Debug)]
enum SinkEvent {
    Report {
        source: usize,
        host: String,
        code: u8,
        record: Record,
    },
    Vote {
        source: usize,
    },
    Abort {
        source: usize,
        reason: String,
    },
    /// Connection ended without a stop vote
    Departed {
        source: Option<usize>,
        error: Option<String>,
    },
}

/// What the sink saw during the run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkSummary {
    /// Reports per error code, indexed by `code - 1`
    counts: [usize; 6],
    /// Reports whose tag was not a known error code
    pub unknown: usize,
    /// Stop votes received
    pub votes: usize,
    /// Participants that left without voting
    pub departed: usize,
    /// Abort reason, if the run was aborted
    pub aborted: Option<String>,
}

impl SinkSummary {
    /// Reports received for one error code
    pub fn count(&self, code: ErrorCode) -> usize {
        self.counts[code.code() as usize - 1]
    }

    /// All reports received
    pub fn total(&self) -> usize {
        self.counts.iter().sum::<usize>() + self.unknown
    }
}

/// Error sink role
pub struct ErrorSink {
    listener: TcpListener,
    world_size: usize,
}

impl ErrorSink {
    /// Create the sink for a world of `world_size` ranks
    ///
    /// It waits for one stop vote from every collective-group participant.
    pub fn new(listener: TcpListener, world_size: usize) -> Self {
        Self {
            listener,
            world_size,
        }
    }

    /// World ranks the sink waits for
    fn participants(&self) -> HashSet<usize> {
        (0..self.world_size)
            .filter(|&rank| Role::from_rank(rank).in_group())
            .collect()
    }

    /// Receive and log reports until every participant is done
    pub async fn run(self) -> Result<SinkSummary> {
        let addr = self.listener.local_addr()
            .context("Error sink listener has no address")?;
        let participants = self.participants();
        tracing::info!(%addr, expected_votes = participants.len(), "Error sink listening");

        let (tx, mut rx) = mpsc::unbounded_channel::<SinkEvent>();

        let listener = self.listener;
        let accept_tx = tx.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        stream.set_nodelay(true).ok();
                        tracing::debug!(%peer, "Participant connected to error sink");
                        tokio::spawn(read_connection(stream, accept_tx.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Error sink failed to accept connection");
                    }
                }
            }
        });
        drop(tx);

        let mut summary = SinkSummary::default();
        // Ranks that voted or departed; each counts once
        let mut finished: HashSet<usize> = HashSet::new();

        while finished.len() < participants.len() {
            let event = match rx.recv().await {
                Some(event) => event,
                None => break,
            };

            match event {
                SinkEvent::Report { source, host, code, record } => {
                    log_report(source, &host, code, &record);
                    match ErrorCode::from_code(code) {
                        Some(c) => summary.counts[c.code() as usize - 1] += 1,
                        None => summary.unknown += 1,
                    }
                }
                SinkEvent::Vote { source } => {
                    if !participants.contains(&source) {
                        tracing::warn!(source, "Ignoring stop vote from a rank outside the group");
                    } else if finished.insert(source) {
                        tracing::debug!(source, "Stop vote received");
                        summary.votes += 1;
                    } else {
                        tracing::warn!(source, "Ignoring repeated stop vote");
                    }
                }
                SinkEvent::Abort { source, reason } => {
                    tracing::info!(source, %reason, "Error sink received abort");
                    summary.aborted = Some(reason);
                    break;
                }
                SinkEvent::Departed { source: None, error } => {
                    tracing::warn!(error = error.as_deref().unwrap_or("connection closed"),
                        "Ignoring error channel connection that never identified itself");
                }
                SinkEvent::Departed { source: Some(source), error } => {
                    let error = error.as_deref().unwrap_or("connection closed");
                    if participants.contains(&source) && finished.insert(source) {
                        tracing::warn!(source, error, "Participant left the error channel without a stop vote");
                        summary.departed += 1;
                    } else {
                        tracing::debug!(source, error, "Ignoring departure of a finished or unknown rank");
                    }
                }
            }
        }

        accept_task.abort();

        tracing::info!(
            reports = summary.total(),
            bad_model_number = summary.count(ErrorCode::BadModelNumber),
            bad_purchase_date = summary.count(ErrorCode::BadPurchaseDate),
            bad_purchase_month = summary.count(ErrorCode::BadPurchaseMonth),
            bad_purchase_year = summary.count(ErrorCode::BadPurchaseYear),
            bad_customer_type = summary.count(ErrorCode::BadCustomerType),
            bad_purchase_amount = summary.count(ErrorCode::BadPurchaseAmount),
            unknown = summary.unknown,
            votes = summary.votes,
            departed = summary.departed,
            "Error sink finished"
        );

        Ok(summary)
    }
}

/// Forward every message on one participant connection to the sink loop
async fn read_connection(mut stream: TcpStream, tx: mpsc::UnboundedSender<SinkEvent>) {
    let hello = match read_hello(&mut stream).await {
        Ok(hello) => hello,
        Err(e) => {
            tx.send(SinkEvent::Departed { source: None, error: Some(format!("{:#}", e)) }).ok();
            return;
        }
    };
    let source = hello.rank;

    loop {
        let event = match try_read_message(&mut stream).await {
            Ok(Some(Message::RecordError(err))) => SinkEvent::Report {
                source,
                host: hello.host.clone(),
                code: err.code,
                record: err.record,
            },
            Ok(Some(Message::StopVote)) => {
                tx.send(SinkEvent::Vote { source }).ok();
                return;
            }
            Ok(Some(Message::Abort(abort))) => {
                tx.send(SinkEvent::Abort { source, reason: abort.reason }).ok();
                return;
            }
            Ok(Some(other)) => SinkEvent::Departed {
                source: Some(source),
                error: Some(format!("unexpected {} on error channel", other.kind())),
            },
            Ok(None) => SinkEvent::Departed { source: Some(source), error: None },
            Err(e) => SinkEvent::Departed { source: Some(source), error: Some(format!("{:#}", e)) },
        };

        let done = matches!(event, SinkEvent::Departed { .. });
        if tx.send(event).is_err() || done {
            return;
        }
    }
}

fn log_report(source: usize, host: &str, code: u8, record: &Record) {
    let reason = ErrorCode::from_code(code)
        .map(ErrorCode::message)
        .unwrap_or("Unknown error code");

    tracing::warn!(
        source,
        host,
        code,
        model_number = record.model_number,
        purchase_date = record.purchase_date,
        customer_type = %record.customer_type,
        purchase_amount = record.purchase_amount,
        "Rank {} reported \"{}\": {}",
        source,
        reason,
        record
    );
}
