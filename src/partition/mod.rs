//! Block partitioning
//!
//! Splits `N` records across `P` participants into contiguous, non-overlapping
//! blocks. Every participant gets `N / P` records; the first `N % P` participants
//! (lowest rank first) get one more.
//!
//! The coordinator builds the whole plan with [`plan`]; a worker only needs its own
//! size and calls [`block_len`], which uses the same arithmetic.
//!
//! # Example
//!
//! ```
//! use widget_report::partition::{plan, block_len};
//!
//! let plan = plan(10, 3).unwrap();
//! assert_eq!(plan.counts(), &[4, 3, 3]);
//! assert_eq!(plan.displacements(), &[0, 4, 7]);
//! assert_eq!(block_len(10, 3, 2), 3);
//! ```

use anyhow::Result;
use std::ops::Range;

/// Block sizes and offsets for every participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    counts: Vec<usize>,
    displacements: Vec<usize>,
}

/// Compute the plan for `total` records over `participants` ranks
pub fn plan(total: usize, participants: usize) -> Result<PartitionPlan> {
    if participants == 0 {
        anyhow::bail!("Cannot partition {} records across zero participants", total);
    }

    let counts: Vec<usize> = (0..participants)
        .map(|rank| block_len(total, participants, rank))
        .collect();

    let mut displacements = Vec::with_capacity(participants);
    let mut offset = 0;
    for count in &counts {
        displacements.push(offset);
        offset += count;
    }

    Ok(PartitionPlan { counts, displacements })
}

/// Size of the block owned by `rank`
///
/// `participants` must be non-zero.
pub fn block_len(total: usize, participants: usize, rank: usize) -> usize {
    let partition = total / participants;
    let remainder = total % participants;

    if rank < remainder {
        partition + 1
    } else {
        partition
    }
}

impl PartitionPlan {
    /// Number of participants
    pub fn participants(&self) -> usize {
        self.counts.len()
    }

    /// Block size per rank
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Block start offset per rank
    pub fn displacements(&self) -> &[usize] {
        &self.displacements
    }

    /// Total number of records covered
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// Index range of the block owned by `rank`
    pub fn range(&self, rank: usize) -> Range<usize> {
        let start = self.displacements[rank];
        start..start + self.counts[rank]
    }

    /// Split `items` into per-rank blocks
    pub fn split<'a, T>(&self, items: &'a [T]) -> Result<Vec<&'a [T]>> {
        if items.len() != self.total() {
            anyhow::bail!(
                "Plan covers {} records but {} were supplied",
                self.total(),
                items.len()
            );
        }

        Ok((0..self.participants())
            .map(|rank| &items[self.range(rank)])
            .collect())
    }
}
