//! Error channel (participant side)
//!
//! Every participant opens its own connection to the error sink. Rejected records
//! are queued on an unbounded channel and written by a single background task, so
//! block processing never waits on the sink and reports from one sender arrive in
//! the order they were made. The stop vote travels on the same connection after the
//! last report.

use crate::distributed::protocol::*;
use crate::record::Record;
use crate::validate::ErrorCode;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Destination for rejected records during block processing
pub trait RejectionSink {
    /// Report one rejected record
    fn reject(&mut self, record: &Record, code: ErrorCode) -> Result<()>;
}

/// In-memory collection (used by tests and single-process tooling)
impl RejectionSink for Vec<(Record, ErrorCode)> {
    fn reject(&mut self, record: &Record, code: ErrorCode) -> Result<()> {
        self.push((*record, code));
        Ok(())
    }
}

/// Connection from one participant to the error sink
#[derive(Debug)]
pub struct ErrorReporter {
    rank: usize,
    tx: mpsc::UnboundedSender<Message>,
    writer: JoinHandle<Result<()>>,
    reported: usize,
}

impl ErrorReporter {
    /// Connect to the sink and announce this rank
    pub async fn connect(sink_addr: SocketAddr, rank: usize, timeout: Duration) -> Result<Self> {
        let mut stream = connect_with_retry(sink_addr, timeout).await
            .context("Failed to reach error sink")?;

        write_message(&mut stream, &Message::Hello(HelloMessage::new(rank))).await
            .context("Failed to greet error sink")?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                write_message(&mut stream, &msg).await?;
            }
            stream.shutdown().await.ok();
            Ok::<(), anyhow::Error>(())
        });

        Ok(Self {
            rank,
            tx,
            writer,
            reported: 0,
        })
    }

    /// Number of records reported so far
    pub fn reported(&self) -> usize {
        self.reported
    }

    /// Send the stop vote and wait until everything queued has been written
    pub async fn finish(self) -> Result<()> {
        let rank = self.rank;
        self.send(Message::StopVote)?;
        self.close().await
            .with_context(|| format!("Error channel for rank {} failed", rank))
    }

    /// Send the abort sentinel to the sink and close
    pub async fn abort(self, reason: &str) -> Result<()> {
        self.send(Message::Abort(AbortMessage { reason: reason.to_string() }))?;
        self.close().await
    }

    /// Close the connection without voting
    pub async fn close(self) -> Result<()> {
        drop(self.tx);
        self.writer.await
            .map_err(|e| anyhow::anyhow!("Error channel writer panicked: {}", e))?
    }

    fn send(&self, msg: Message) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| anyhow::anyhow!("Error channel to sink is closed"))
    }
}

impl RejectionSink for ErrorReporter {
    fn reject(&mut self, record: &Record, code: ErrorCode) -> Result<()> {
        self.send(Message::RecordError(RecordErrorMessage {
            code: code.code(),
            record: *record,
        }))?;
        self.reported += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_vec_sink_collects() {
        let mut sink: Vec<(Record, ErrorCode)> = Vec::new();
        let record = Record::new(5, 201001, 'I', 1.0);
        sink.reject(&record, ErrorCode::BadModelNumber).unwrap();

        assert_eq!(sink, vec![(record, ErrorCode::BadModelNumber)]);
    }

    #[tokio::test]
    async fn test_reports_arrive_in_order_before_vote() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let reader = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let hello = read_hello(&mut stream).await.unwrap();
            let mut received = Vec::new();
            while let Some(msg) = try_read_message(&mut stream).await.unwrap() {
                received.push(msg);
            }
            (hello.rank, received)
        });

        let mut reporter = ErrorReporter::connect(addr, 4, Duration::from_secs(5)).await.unwrap();
        for i in 0..5 {
            let record = Record::new(i, 201001, 'I', -1.0);
            reporter.reject(&record, ErrorCode::BadPurchaseAmount).unwrap();
        }
        assert_eq!(reporter.reported(), 5);
        reporter.finish().await.unwrap();

        let (rank, received) = reader.await.unwrap();
        assert_eq!(rank, 4);
        assert_eq!(received.len(), 6);

        for (i, msg) in received[..5].iter().enumerate() {
            match msg {
                Message::RecordError(err) => {
                    assert_eq!(err.code, 6);
                    assert_eq!(err.record.model_number, i as i64);
                }
                other => panic!("Unexpected {}", other.kind()),
            }
        }
        assert!(matches!(received[5], Message::StopVote));
    }
}
