//! Role assignment
//!
//! A process's role follows from its world rank alone:
//!
//! | World rank | Role        | Group rank |
//! |------------|-------------|------------|
//! | 0          | Coordinator | 0          |
//! | 1          | Error sink  | -          |
//! | 2..        | Worker      | rank - 1   |
//!
//! The error sink is outside the collective group, so group ranks are contiguous
//! over the coordinator and the workers.

use std::fmt;

/// World rank of the coordinator
pub const COORDINATOR_RANK: usize = 0;

/// World rank of the error sink
pub const ERROR_SINK_RANK: usize = 1;

/// Participant role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    ErrorSink,
    Worker,
}

impl Role {
    /// Role for a world rank
    pub fn from_rank(rank: usize) -> Self {
        match rank {
            COORDINATOR_RANK => Role::Coordinator,
            ERROR_SINK_RANK => Role::ErrorSink,
            _ => Role::Worker,
        }
    }

    /// Whether this role takes part in broadcast / scatter / reduce
    pub fn in_group(self) -> bool {
        !matches!(self, Role::ErrorSink)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::ErrorSink => write!(f, "error-sink"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Group rank of a world rank (`None` for the error sink)
pub fn group_rank(world_rank: usize) -> Option<usize> {
    match Role::from_rank(world_rank) {
        Role::Coordinator => Some(0),
        Role::ErrorSink => None,
        Role::Worker => Some(world_rank - 1),
    }
}

/// World rank of a group rank
pub fn world_rank(group_rank: usize) -> usize {
    if group_rank == 0 {
        COORDINATOR_RANK
    } else {
        group_rank + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_rank() {
        assert_eq!(Role::from_rank(0), Role::Coordinator);
        assert_eq!(Role::from_rank(1), Role::ErrorSink);
        assert_eq!(Role::from_rank(2), Role::Worker);
        assert_eq!(Role::from_rank(17), Role::Worker);
    }

    #[test]
    fn test_group_membership() {
        assert!(Role::Coordinator.in_group());
        assert!(Role::Worker.in_group());
        assert!(!Role::ErrorSink.in_group());
    }

    #[test]
    fn test_group_rank_mapping() {
        assert_eq!(group_rank(0), Some(0));
        assert_eq!(group_rank(1), None);
        assert_eq!(group_rank(2), Some(1));
        assert_eq!(group_rank(5), Some(4));

        for g in 0..10 {
            assert_eq!(group_rank(world_rank(g)), Some(g));
        }
    }
}
