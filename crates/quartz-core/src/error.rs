//! Error types for topology edits, schedule compilation and the run loop.
//!
//! Configuration errors are fatal: they abort compilation (or the running
//! loop, when they arrive through live reconfiguration) and carry the offending
//! node index. Cycle overruns are not errors; they are counted and logged by
//! the playback engine.

use std::collections::TryReserveError;

use thiserror::Error;

/// A malformed clock tree or a malformed edit to one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Node indices are limited to `0..MAX_NODES`.
    #[error("node index {index} out of range (max {max})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Exclusive upper bound.
        max: usize,
    },

    /// A master node was placed somewhere other than index 0.
    #[error("master node must occupy index 0, got index {index}")]
    MasterNotAtZero {
        /// Requested index.
        index: usize,
    },

    /// Index 0 is reserved for the master node.
    #[error("only a master node can occupy index 0")]
    NonMasterAtZero,

    /// `add_node` on an index that already holds a node.
    #[error("node index {index} already taken")]
    IndexOccupied {
        /// Requested index.
        index: usize,
    },

    /// The referenced node does not exist.
    #[error("node {index} not found")]
    NodeNotFound {
        /// Requested index.
        index: usize,
    },

    /// The tree has no master node at index 0.
    #[error("clock tree has no master node")]
    MissingMaster,

    /// A node's parent index points at an empty slot or outside the tree.
    #[error("node {index} links to missing parent {parent}")]
    DanglingParent {
        /// Node whose parent is missing.
        index: usize,
        /// The missing parent index.
        parent: usize,
    },

    /// Leaves cannot feed other nodes.
    #[error("node {index} links to leaf {parent}; only master and divider nodes can be parents")]
    ParentIsLeaf {
        /// Node with the invalid parent.
        index: usize,
        /// The leaf it links to.
        parent: usize,
    },

    /// The parent chain loops without reaching the master.
    #[error("parent chain of node {index} never reaches the master clock")]
    CycleDetected {
        /// Node whose chain loops.
        index: usize,
    },

    /// A master with 0 Hz, or a node whose integer frequency truncates to 0 Hz.
    #[error("node {index} resolves to 0 Hz")]
    ZeroFrequency {
        /// Offending node.
        index: usize,
    },

    /// A divider with a 0 % multiplier.
    #[error("divider {index} has a 0% multiplier")]
    ZeroPercent {
        /// Offending node.
        index: usize,
    },

    /// A leaf's reduced frequency does not divide the tape length.
    #[error("leaf {index} at {frequency} ticks per tape does not divide tape length {tape_length}")]
    InexactPeriod {
        /// Offending leaf.
        index: usize,
        /// Tape length in slots.
        tape_length: u64,
        /// Leaf frequency after GCD reduction.
        frequency: u64,
    },

    /// Frequency arithmetic exceeded 64 bits.
    #[error("frequency arithmetic overflowed at node {index}")]
    FrequencyOverflow {
        /// Node being processed when the overflow happened.
        index: usize,
    },

    /// The master node cannot be removed.
    #[error("the master node cannot be removed")]
    RemoveMaster,
}

/// Errors surfaced by the scheduler.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    /// Bad topology.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The compiled tape would exceed the configured slot limit.
    #[error("tape length {length} exceeds the limit of {limit} slots")]
    TapeTooLong {
        /// Required tape length.
        length: u64,
        /// Configured maximum.
        limit: usize,
    },

    /// A schedule buffer could not be allocated.
    #[error("failed to allocate {what} ({len} entries): {source}")]
    Allocation {
        /// Which buffer.
        what: &'static str,
        /// Requested entry count.
        len: usize,
        /// Allocator failure.
        #[source]
        source: TryReserveError,
    },

    /// Playback was requested before `compile()`.
    #[error("scheduler has no compiled schedule")]
    NotCompiled,

    /// A blocking reconfiguration was requested from the scheduler's own thread.
    #[error("blocking reconfiguration from the scheduler thread would deadlock; use submit()")]
    WouldDeadlock,

    /// The scheduler that owns the command queue is gone.
    #[error("scheduler is no longer running")]
    Disconnected,

    /// The run loop stopped before the request was applied.
    #[error("scheduler stopped before the request was applied")]
    Stopped,
}

impl SchedulerError {
    /// Create an allocation error.
    pub fn allocation(what: &'static str, len: usize, source: TryReserveError) -> Self {
        SchedulerError::Allocation { what, len, source }
    }

    /// Returns the topology error, if this is one.
    pub fn as_topology(&self) -> Option<&TopologyError> {
        match self {
            SchedulerError::Topology(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn topology_display_names_index() {
        let err = TopologyError::DanglingParent {
            index: 4,
            parent: 9,
        };
        assert_eq!(err.to_string(), "node 4 links to missing parent 9");
    }

    #[test]
    fn topology_converts_transparently() {
        let err: SchedulerError = TopologyError::NonMasterAtZero.into();
        assert_eq!(err.to_string(), "only a master node can occupy index 0");
        assert_eq!(err.as_topology(), Some(&TopologyError::NonMasterAtZero));
    }

    #[test]
    fn allocation_exposes_source() {
        let source = Vec::<u32>::new().try_reserve_exact(usize::MAX).unwrap_err();
        let err = SchedulerError::allocation("tape", usize::MAX, source);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("tape"), "got: {err}");
    }

    #[test]
    fn non_topology_has_no_topology() {
        assert!(SchedulerError::NotCompiled.as_topology().is_none());
    }
}
