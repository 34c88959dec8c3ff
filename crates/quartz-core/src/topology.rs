//! Clock-distribution tree.
//!
//! A [`ClockTree`] is a fixed arena of [`MAX_NODES`] slots. Index 0 holds the
//! single [`NodeKind::Master`] oscillator; every other occupied slot holds a
//! divider or a leaf that derives its rate from a parent index. The tree is
//! the mutable half of the scheduler: edits land here, and
//! [`compile()`](crate::compile) turns a consistent tree into an immutable
//! [`CompiledSchedule`](crate::CompiledSchedule).
//!
//! Placement rules (master only at 0, nothing but the master at 0, no double
//! occupancy, nonzero percent/frequency) are enforced eagerly by
//! [`ClockTree::add_node`] and [`ClockTree::replace_node`]. Rules that span
//! several nodes (parents exist, chains reach the master, no cycles) are
//! checked when frequencies are resolved at compile time.

use std::fmt;

use crate::error::TopologyError;
use crate::leaf::Leaf;
use crate::rational::gcd;

/// Number of node slots, and the width of a tape slot mask.
pub const MAX_NODES: usize = 32;

/// Slot reserved for the master oscillator.
pub const MASTER_INDEX: NodeIndex = 0;

/// Index of a node in the clock tree (`0..MAX_NODES`).
pub type NodeIndex = usize;

/// What a node does, with the fields that only make sense for that role.
pub enum NodeKind {
    /// Root oscillator; sole source of absolute frequency.
    Master {
        /// Base frequency in Hz.
        frequency: u64,
    },
    /// Scales its subtree's rate by `percent / 100`.
    Divider {
        /// Node this divider derives its rate from.
        parent: NodeIndex,
        /// Integer percentage multiplier (100 = ×1.0).
        percent: u32,
    },
    /// Schedulable device fired by the tape.
    Leaf {
        /// Node this leaf derives its rate from.
        parent: NodeIndex,
        /// The device itself.
        device: Box<dyn Leaf>,
    },
}

impl NodeKind {
    /// Parent index, `None` for the master.
    pub fn parent(&self) -> Option<NodeIndex> {
        match self {
            NodeKind::Master { .. } => None,
            NodeKind::Divider { parent, .. } | NodeKind::Leaf { parent, .. } => Some(*parent),
        }
    }

    /// Short lowercase label (`master`, `divider`, `leaf`).
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Master { .. } => "master",
            NodeKind::Divider { .. } => "divider",
            NodeKind::Leaf { .. } => "leaf",
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Master { frequency } => f
                .debug_struct("Master")
                .field("frequency", frequency)
                .finish(),
            NodeKind::Divider { parent, percent } => f
                .debug_struct("Divider")
                .field("parent", parent)
                .field("percent", percent)
                .finish(),
            NodeKind::Leaf { parent, .. } => f
                .debug_struct("Leaf")
                .field("parent", parent)
                .finish_non_exhaustive(),
        }
    }
}

/// One entry in the clock tree.
#[derive(Debug)]
pub struct ClockNode {
    name: Option<String>,
    kind: NodeKind,
}

impl ClockNode {
    /// Master oscillator at `frequency` Hz.
    pub fn master(frequency: u64) -> Self {
        Self {
            name: None,
            kind: NodeKind::Master { frequency },
        }
    }

    /// Divider scaling `parent`'s rate by `percent / 100`.
    pub fn divider(parent: NodeIndex, percent: u32) -> Self {
        Self {
            name: None,
            kind: NodeKind::Divider { parent, percent },
        }
    }

    /// Leaf device clocked from `parent`.
    pub fn leaf(parent: NodeIndex, device: impl Leaf + 'static) -> Self {
        Self::leaf_boxed(parent, Box::new(device))
    }

    /// Leaf from an already boxed device.
    pub fn leaf_boxed(parent: NodeIndex, device: Box<dyn Leaf>) -> Self {
        Self {
            name: None,
            kind: NodeKind::Leaf { parent, device },
        }
    }

    /// Attach a display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The node's role.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Parent index, `None` for the master.
    pub fn parent(&self) -> Option<NodeIndex> {
        self.kind.parent()
    }

    /// True for the master oscillator.
    pub fn is_master(&self) -> bool {
        matches!(self.kind, NodeKind::Master { .. })
    }

    /// True for a schedulable leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// Fixed-size arena of clock nodes.
pub struct ClockTree {
    nodes: Vec<Option<ClockNode>>,
}

impl Default for ClockTree {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClockTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl ClockTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self {
            nodes: std::iter::repeat_with(|| None).take(MAX_NODES).collect(),
        }
    }

    /// Insert `node` at an empty `index`.
    ///
    /// Rejects a master anywhere but index 0, anything but a master at index 0,
    /// an occupied slot, a 0 % divider and a 0 Hz master. The tree is left
    /// untouched on error.
    pub fn add_node(&mut self, index: NodeIndex, node: ClockNode) -> Result<(), TopologyError> {
        check_placement(index, &node)?;
        if self.nodes[index].is_some() {
            return Err(TopologyError::IndexOccupied { index });
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("clock_add: {} node {index}", node.kind.label());

        self.nodes[index] = Some(node);
        Ok(())
    }

    /// Put `node` at `index`, returning whatever was there.
    ///
    /// Same placement rules as [`add_node`](Self::add_node), except that the
    /// slot may already be occupied.
    pub fn replace_node(
        &mut self,
        index: NodeIndex,
        node: ClockNode,
    ) -> Result<Option<ClockNode>, TopologyError> {
        check_placement(index, &node)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("clock_replace: {} node {index}", node.kind.label());

        Ok(self.nodes[index].replace(node))
    }

    /// Remove the node at `index` and every node whose parent chain passes
    /// through it. Returns the removed nodes in index order.
    pub fn remove_node(
        &mut self,
        index: NodeIndex,
    ) -> Result<Vec<(NodeIndex, ClockNode)>, TopologyError> {
        if index >= MAX_NODES {
            return Err(TopologyError::IndexOutOfRange {
                index,
                max: MAX_NODES,
            });
        }
        if index == MASTER_INDEX {
            return Err(TopologyError::RemoveMaster);
        }
        if self.nodes[index].is_none() {
            return Err(TopologyError::NodeNotFound { index });
        }

        let mut doomed: u32 = 1 << index;
        loop {
            let mut grown = doomed;
            for (i, node) in self.iter() {
                if node
                    .parent()
                    .is_some_and(|p| p < MAX_NODES && doomed & (1 << p) != 0)
                {
                    grown |= 1 << i;
                }
            }
            if grown == doomed {
                break;
            }
            doomed = grown;
        }

        let mut removed = Vec::with_capacity(doomed.count_ones() as usize);
        for (i, slot) in self.nodes.iter_mut().enumerate() {
            if doomed & (1 << i) == 0 {
                continue;
            }
            if let Some(node) = slot.take() {
                removed.push((i, node));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("clock_remove: node {index} ({} total)", removed.len());

        Ok(removed)
    }

    /// Raw slot write with no placement checks; used to undo edits.
    pub(crate) fn put(&mut self, index: NodeIndex, node: Option<ClockNode>) -> Option<ClockNode> {
        std::mem::replace(&mut self.nodes[index], node)
    }

    /// Node at `index`.
    pub fn get(&self, index: NodeIndex) -> Option<&ClockNode> {
        self.nodes.get(index).and_then(Option::as_ref)
    }

    /// Mutable access to the device of the leaf at `index`.
    pub fn leaf_mut(&mut self, index: NodeIndex) -> Option<&mut dyn Leaf> {
        match self.nodes.get_mut(index)? {
            Some(ClockNode {
                kind: NodeKind::Leaf { device, .. },
                ..
            }) => Some(device.as_mut()),
            _ => None,
        }
    }

    /// Occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &ClockNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.as_ref().map(|n| (i, n)))
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// True if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(Option::is_none)
    }

    /// Bit `j` set for every leaf at index `j`.
    pub fn leaf_mask(&self) -> u32 {
        self.iter()
            .filter(|(_, node)| node.is_leaf())
            .fold(0, |mask, (i, _)| mask | (1 << i))
    }

    /// Master frequency in Hz.
    pub fn master_frequency(&self) -> Result<u64, TopologyError> {
        match self.get(MASTER_INDEX).map(ClockNode::kind) {
            Some(NodeKind::Master { frequency }) => Ok(*frequency),
            _ => Err(TopologyError::MissingMaster),
        }
    }

    /// Integer frequency of the node at `index`:
    /// `master × Π percent / 100^depth`, truncated once at the end.
    ///
    /// Walks the parent chain, failing on missing parents, leaf parents,
    /// loops, overflow and a result of 0 Hz.
    pub fn effective_frequency(&self, index: NodeIndex) -> Result<u64, TopologyError> {
        let master = self.master_frequency()?;
        if self.get(index).is_none() {
            return Err(TopologyError::NodeNotFound { index });
        }

        let mut num = master;
        let mut den: u64 = 1;
        let mut visited: u32 = 0;
        let mut current = index;

        while let Some(node) = self.get(current) {
            let parent = match &node.kind {
                NodeKind::Master { .. } => {
                    let frequency = num / den;
                    if frequency == 0 {
                        return Err(TopologyError::ZeroFrequency { index });
                    }
                    return Ok(frequency);
                }
                NodeKind::Divider { parent, percent } => {
                    num = num
                        .checked_mul(u64::from(*percent))
                        .ok_or(TopologyError::FrequencyOverflow { index })?;
                    den = den
                        .checked_mul(100)
                        .ok_or(TopologyError::FrequencyOverflow { index })?;
                    let g = gcd(num, den);
                    if g > 1 {
                        num /= g;
                        den /= g;
                    }
                    *parent
                }
                NodeKind::Leaf { parent, .. } => *parent,
            };

            if visited & (1 << current) != 0 {
                return Err(TopologyError::CycleDetected { index });
            }
            visited |= 1 << current;

            match self.get(parent) {
                None => {
                    return Err(TopologyError::DanglingParent {
                        index: current,
                        parent,
                    });
                }
                Some(p) if p.is_leaf() => {
                    return Err(TopologyError::ParentIsLeaf {
                        index: current,
                        parent,
                    });
                }
                Some(_) => current = parent,
            }
        }

        Err(TopologyError::NodeNotFound { index: current })
    }

    /// Effective frequency of every occupied slot (0 for empty slots).
    pub fn effective_frequencies(&self) -> Result<[u64; MAX_NODES], TopologyError> {
        self.master_frequency()?;
        let mut out = [0u64; MAX_NODES];
        for (i, _) in self.iter() {
            out[i] = self.effective_frequency(i)?;
        }
        Ok(out)
    }
}

fn check_placement(index: NodeIndex, node: &ClockNode) -> Result<(), TopologyError> {
    if index >= MAX_NODES {
        return Err(TopologyError::IndexOutOfRange {
            index,
            max: MAX_NODES,
        });
    }
    match node.kind {
        NodeKind::Master { frequency } => {
            if index != MASTER_INDEX {
                return Err(TopologyError::MasterNotAtZero { index });
            }
            if frequency == 0 {
                return Err(TopologyError::ZeroFrequency { index });
            }
        }
        _ if index == MASTER_INDEX => return Err(TopologyError::NonMasterAtZero),
        NodeKind::Divider { percent: 0, .. } => return Err(TopologyError::ZeroPercent { index }),
        _ => {}
    }
    Ok(())
}
