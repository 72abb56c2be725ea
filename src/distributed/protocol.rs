//! Participant protocol
//!
//! This module defines the messages exchanged between participants. Two independent
//! contracts share the same framing:
//!
//! - **Collective group** (coordinator + workers): rendezvous, metadata broadcast,
//!   block scatter, partial-sum reduction, abort.
//! - **Error channel** (every participant → error sink): rejected records, one stop
//!   vote per participant, abort.
//!
//! # Message Flow
//!
//! ```text
//! Coordinator (0)              Worker (2..)                 Error sink (1)
//!     |<-------- HELLO -----------|                              |
//!     |---------------------------+--------- HELLO ------------->|
//!     |-------- METADATA -------->|                              |
//!     |-------- BLOCK ----------->|                              |
//!     |                           |------ RECORD_ERROR(code) --->|
//!     |                           |------ STOP_VOTE ------------>|
//!     |<------- PARTIAL ----------|                              |
//! ```
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::aggregate::{AggregationState, ReportTargets};
use crate::record::Record;
use crate::validate::ValidationRules;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Protocol version
///
/// Every participant must run the same version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame (a scattered block can be large)
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024 * 1024;

/// Delay between connection attempts during rendezvous
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Protocol message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    /// First message on every connection (participant → coordinator / sink)
    Hello(HelloMessage),

    /// Run metadata broadcast (coordinator → workers)
    Metadata(RunMetadata),

    /// Record block scatter (coordinator → worker)
    Block(BlockMessage),

    /// Local totals for the reduction (worker → coordinator)
    Partial(PartialMessage),

    /// Rejected record (participant → error sink)
    ///
    /// `code` is the validator error code (1-6).
    RecordError(RecordErrorMessage),

    /// Sender has reported its last rejected record (participant → error sink)
    StopVote,

    /// Run is aborted (coordinator → workers and error sink)
    Abort(AbortMessage),
}

impl Message {
    /// Short name for logs and protocol errors
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::Metadata(_) => "METADATA",
            Message::Block(_) => "BLOCK",
            Message::Partial(_) => "PARTIAL",
            Message::RecordError(_) => "RECORD_ERROR",
            Message::StopVote => "STOP_VOTE",
            Message::Abort(_) => "ABORT",
        }
    }
}

/// Connection greeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,
    /// World rank of the sender
    pub rank: usize,
    /// Host the sender runs on
    pub host: String,
}

impl HelloMessage {
    pub fn new(rank: usize) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            rank,
            host: get_node_id(),
        }
    }
}

/// Everything a worker needs before it can process a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Total number of records (`N`)
    pub record_count: usize,
    /// Number of categories (`M`)
    pub category_count: usize,
    /// Accepted record domains
    pub rules: ValidationRules,
    /// Year and customer type for the filtered totals
    pub targets: ReportTargets,
}

/// One participant's block of records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockMessage {
    pub records: Vec<Record>,
}

/// One participant's local totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialMessage {
    /// World rank of the sender
    pub rank: usize,
    pub totals: AggregationState,
}

/// Rejected record report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordErrorMessage {
    pub code: u8,
    pub record: Record,
}

/// Abort sentinel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortMessage {
    pub reason: String,
}

/// Serialize a message to bytes
///
/// Prepends a 4-byte length field for framing.
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg)
        .context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_bytes.len(), MAX_MESSAGE_BYTES);
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read a complete message from a stream
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message> {
    try_read_message(reader)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Connection closed while waiting for a message"))
}

/// Read a message, returning `None` if the peer closed the connection cleanly
pub async fn try_read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Message>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }

    let msg_len = u32::from_le_bytes(len_buf) as usize;

    if msg_len > MAX_MESSAGE_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_len, MAX_MESSAGE_BYTES);
    }

    let mut msg_buf = vec![0u8; msg_len];
    reader.read_exact(&mut msg_buf).await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf)
        .context("Failed to deserialize message")?;

    Ok(Some(msg))
}

/// Write a message to a stream
pub async fn write_message<W: AsyncWrite + Unpin>(writer: &mut W, msg: &Message) -> Result<()> {
    let framed = serialize_message(msg)?;

    writer.write_all(&framed).await
        .context("Failed to write message")?;

    writer.flush().await
        .context("Failed to flush stream")?;

    Ok(())
}

/// Read the greeting that opens every connection
pub async fn read_hello<R: AsyncRead + Unpin>(reader: &mut R) -> Result<HelloMessage> {
    match read_message(reader).await? {
        Message::Hello(hello) => {
            if hello.protocol_version != PROTOCOL_VERSION {
                anyhow::bail!(
                    "Protocol version mismatch from rank {}: expected {}, got {}",
                    hello.rank,
                    PROTOCOL_VERSION,
                    hello.protocol_version
                );
            }
            Ok(hello)
        }
        other => anyhow::bail!("Expected HELLO, got {}", other.kind()),
    }
}

/// Connect to a peer, retrying until `timeout` elapses
///
/// Participants start in any order, so the listener may not be up yet.
pub async fn connect_with_retry(addr: SocketAddr, timeout: Duration) -> Result<TcpStream> {
    let deadline = Instant::now() + timeout;

    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                stream.set_nodelay(true).ok();
                return Ok(stream);
            }
            Err(e) if Instant::now() < deadline => {
                tracing::trace!(%addr, error = %e, "Connection attempt failed, retrying");
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to connect to {} within {}s", addr, timeout.as_secs())
                });
            }
        }
    }
}

/// Get node identifier (hostname)
pub fn get_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}
