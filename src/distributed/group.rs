//! Collective group
//!
//! The coordinator and the workers form a star-shaped group rooted at the
//! coordinator. Every collective (broadcast, scatter, reduce) must be called by
//! every member in the same order: the root drives it through [`GroupRoot`], each
//! worker answers through its [`GroupMember`].
//!
//! The error sink never joins this group.

use crate::aggregate::AggregationState;
use crate::distributed::protocol::*;
use crate::distributed::role::{self, Role};
use crate::error::FatalError;
use crate::partition::PartitionPlan;
use crate::record::Record;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// Connection from the root to one member
#[derive(Debug)]
struct MemberLink {
    world_rank: usize,
    host: String,
    stream: TcpStream,
}

/// Root side of the group (coordinator)
#[derive(Debug)]
pub struct GroupRoot {
    /// Links ordered by group rank, starting at group rank 1
    members: Vec<MemberLink>,
}

impl GroupRoot {
    /// Accept every other member of a group of `group_size`
    ///
    /// Members may connect in any order; they are re-ordered by rank.
    pub async fn accept(listener: &TcpListener, group_size: usize, timeout: Duration) -> Result<Self> {
        if group_size == 0 {
            anyhow::bail!("Group must contain at least the coordinator");
        }

        let expected = group_size - 1;
        let mut slots: Vec<Option<MemberLink>> = (0..expected).map(|_| None).collect();
        let mut joined = 0;

        while joined < expected {
            let (mut stream, addr) = tokio::time::timeout(timeout, listener.accept())
                .await
                .with_context(|| {
                    format!(
                        "Timed out waiting for workers ({} of {} joined)",
                        joined, expected
                    )
                })?
                .context("Failed to accept worker connection")?;
            stream.set_nodelay(true).ok();

            let hello = read_hello(&mut stream)
                .await
                .with_context(|| format!("Bad greeting from {}", addr))?;

            let slot = match role::group_rank(hello.rank) {
                Some(g) if g >= 1 && g < group_size => g - 1,
                _ => anyhow::bail!(
                    "Rank {} from {} is not a worker in a group of {}",
                    hello.rank,
                    addr,
                    group_size
                ),
            };

            if slots[slot].is_some() {
                anyhow::bail!("Rank {} joined the group twice", hello.rank);
            }

            tracing::debug!(rank = hello.rank, host = %hello.host, %addr, "Worker joined group");
            slots[slot] = Some(MemberLink {
                world_rank: hello.rank,
                host: hello.host,
                stream,
            });
            joined += 1;
        }

        let members = slots.into_iter().flatten().collect();
        Ok(Self { members })
    }

    /// Group size including the root
    pub fn size(&self) -> usize {
        self.members.len() + 1
    }

    /// Send the same message to every member
    pub async fn broadcast(&mut self, msg: &Message) -> Result<()> {
        let framed = serialize_message(msg)?;

        for link in &mut self.members {
            link.stream.write_all(&framed).await
                .with_context(|| format!("Failed to send {} to rank {}", msg.kind(), link.world_rank))?;
            link.stream.flush().await
                .with_context(|| format!("Failed to flush {} to rank {}", msg.kind(), link.world_rank))?;
        }

        Ok(())
    }

    /// Send each member its block and return the root's own block
    pub async fn scatter(&mut self, plan: &PartitionPlan, records: &[Record]) -> Result<Vec<Record>> {
        if plan.participants() != self.size() {
            anyhow::bail!(
                "Plan has {} blocks but the group has {} members",
                plan.participants(),
                self.size()
            );
        }

        let blocks = plan.split(records)?;

        for (link, block) in self.members.iter_mut().zip(blocks.iter().skip(1)) {
            let msg = Message::Block(BlockMessage { records: block.to_vec() });
            write_message(&mut link.stream, &msg)
                .await
                .with_context(|| format!("Failed to send block to rank {}", link.world_rank))?;

            tracing::debug!(rank = link.world_rank, records = block.len(), "Block sent");
        }

        Ok(blocks[0].to_vec())
    }

    /// Element-wise sum of every member's totals onto the root
    ///
    /// Partials are combined in group-rank order so the result does not depend on
    /// arrival timing.
    pub async fn reduce(&mut self, own: AggregationState) -> Result<AggregationState> {
        let mut combined = own;

        for link in &mut self.members {
            let msg = read_message(&mut link.stream)
                .await
                .with_context(|| format!("Failed to read partial totals from rank {}", link.world_rank))?;

            match msg {
                Message::Partial(partial) => {
                    if partial.rank != link.world_rank {
                        anyhow::bail!(
                            "Partial totals on rank {}'s connection claim rank {}",
                            link.world_rank,
                            partial.rank
                        );
                    }
                    combined.merge(&partial.totals)
                        .with_context(|| format!("Rank {} sent mismatched totals", link.world_rank))?;
                }
                other => anyhow::bail!(
                    "Expected PARTIAL from rank {} ({}), got {}",
                    link.world_rank,
                    link.host,
                    other.kind()
                ),
            }
        }

        Ok(combined)
    }

    /// Tell every member the run is aborted
    ///
    /// Best effort: a member that cannot be reached is logged and skipped.
    pub async fn abort(&mut self, reason: &str) {
        let msg = Message::Abort(AbortMessage { reason: reason.to_string() });

        for link in &mut self.members {
            if let Err(e) = write_message(&mut link.stream, &msg).await {
                tracing::warn!(rank = link.world_rank, error = %e, "Failed to deliver abort");
            }
        }
    }
}

/// Member side of the group (worker)
#[derive(Debug)]
pub struct GroupMember {
    world_rank: usize,
    stream: TcpStream,
}

impl GroupMember {
    /// Connect to the root and announce this rank
    pub async fn join(root_addr: SocketAddr, world_rank: usize, timeout: Duration) -> Result<Self> {
        if Role::from_rank(world_rank) != Role::Worker {
            anyhow::bail!("Only workers join the group as members, rank {} is not a worker", world_rank);
        }

        let mut stream = connect_with_retry(root_addr, timeout).await
            .context("Failed to reach coordinator")?;

        write_message(&mut stream, &Message::Hello(HelloMessage::new(world_rank))).await
            .context("Failed to greet coordinator")?;

        Ok(Self { world_rank, stream })
    }

    /// Group rank of this member
    pub fn group_rank(&self) -> usize {
        self.world_rank - 1
    }

    /// Wait for the metadata broadcast
    pub async fn recv_metadata(&mut self) -> Result<RunMetadata> {
        match self.recv().await? {
            Message::Metadata(meta) => Ok(meta),
            other => anyhow::bail!("Expected METADATA, got {}", other.kind()),
        }
    }

    /// Wait for this member's block
    ///
    /// `expected_len` is the size this member computed from the partition plan; a
    /// block of any other size means the two sides disagree on the plan.
    pub async fn recv_block(&mut self, expected_len: usize) -> Result<Vec<Record>> {
        match self.recv().await? {
            Message::Block(block) => {
                if block.records.len() != expected_len {
                    anyhow::bail!(
                        "Received block of {} records, expected {}",
                        block.records.len(),
                        expected_len
                    );
                }
                Ok(block.records)
            }
            other => anyhow::bail!("Expected BLOCK, got {}", other.kind()),
        }
    }

    /// Submit local totals to the reduction
    pub async fn contribute(&mut self, totals: AggregationState) -> Result<()> {
        let msg = Message::Partial(PartialMessage {
            rank: self.world_rank,
            totals,
        });
        write_message(&mut self.stream, &msg).await
            .context("Failed to send partial totals")
    }

    /// Read the next message, turning the abort sentinel into a fatal error
    async fn recv(&mut self) -> Result<Message> {
        match read_message(&mut self.stream).await? {
            Message::Abort(abort) => Err(FatalError::Aborted(abort.reason).into()),
            msg => Ok(msg),
        }
    }
}
