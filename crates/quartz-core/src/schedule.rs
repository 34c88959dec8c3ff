//! Compiled tick tape.
//!
//! A [`CompiledSchedule`] is an immutable snapshot produced by
//! [`compile()`](crate::compile). Slot `i` of the tape is a [`SlotMask`] with
//! bit `j` set when leaf `j` fires on tick `i`. Replaying the tape
//! [`repeat_count`](CompiledSchedule::repeat_count) times covers one simulated
//! second.
//!
//! The scheduler shares the schedule via `Arc`; a new generation replaces the
//! old one wholesale, so playback never sees a partially built tape.

use crate::topology::{MAX_NODES, NodeIndex};

/// Per-tick firing mask. Bit `j` = leaf at node index `j`.
pub type SlotMask = u32;

/// Forward links over a sparse tape.
///
/// For every slot `i`, holds the index of the first nonzero slot after `i`,
/// or 0 when no nonzero slot follows before the end of the tape. Slot 0 of a
/// tape with any leaf is always nonzero, so 0 never aliases a real target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipIndex {
    pub(crate) next: Vec<u32>,
}

impl SkipIndex {
    /// First nonzero slot strictly after `slot`, `None` at the end of the tape.
    #[inline]
    pub fn next_after(&self, slot: usize) -> Option<usize> {
        match self.next.get(slot).copied() {
            Some(0) | None => None,
            Some(next) => Some(next as usize),
        }
    }

    /// Number of slots covered (equal to the tape length).
    pub fn len(&self) -> usize {
        self.next.len()
    }

    /// True for an empty index.
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }
}

/// Immutable compiled snapshot of the clock tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSchedule {
    /// One mask per tick.
    pub(crate) tape: Vec<SlotMask>,
    /// Tape replays per simulated second (the GCD factored out of the LCM).
    pub(crate) repeat_count: u64,
    /// Present when the tape has a run of at least two empty slots.
    pub(crate) skip_index: Option<SkipIndex>,
    /// `tape_length / (frequency / repeat_count)` for leaves, 0 elsewhere.
    pub(crate) leaf_periods: [u64; MAX_NODES],
    /// Effective frequency in Hz for every occupied node, 0 elsewhere.
    pub(crate) frequencies: [u64; MAX_NODES],
    /// Bit `j` set for every leaf.
    pub(crate) leaf_mask: SlotMask,
    /// Generation number assigned by the scheduler (0 for a bare compile).
    pub(crate) generation: u64,
}

impl CompiledSchedule {
    /// Number of slots in the tape.
    pub fn tape_length(&self) -> usize {
        self.tape.len()
    }

    /// Tape replays per simulated second.
    pub fn repeat_count(&self) -> u64 {
        self.repeat_count
    }

    /// `tape_length × repeat_count`.
    pub fn ticks_per_second(&self) -> u64 {
        self.tape.len() as u64 * self.repeat_count
    }

    /// The whole tape.
    pub fn tape(&self) -> &[SlotMask] {
        &self.tape
    }

    /// Mask at `slot` (0 when out of range).
    #[inline]
    pub fn slot(&self, slot: usize) -> SlotMask {
        self.tape.get(slot).copied().unwrap_or(0)
    }

    /// Skip index, if the tape was judged sparse.
    pub fn skip_index(&self) -> Option<&SkipIndex> {
        self.skip_index.as_ref()
    }

    /// True when a skip index was built.
    pub fn is_sparse(&self) -> bool {
        self.skip_index.is_some()
    }

    /// Firing period in ticks for a leaf, `None` for non-leaves.
    pub fn leaf_period(&self, index: NodeIndex) -> Option<u64> {
        match self.leaf_periods.get(index).copied() {
            Some(0) | None => None,
            Some(period) => Some(period),
        }
    }

    /// Effective frequency of a node in Hz, `None` for empty slots.
    pub fn effective_frequency(&self, index: NodeIndex) -> Option<u64> {
        match self.frequencies.get(index).copied() {
            Some(0) | None => None,
            Some(frequency) => Some(frequency),
        }
    }

    /// Master frequency in Hz.
    pub fn master_frequency(&self) -> u64 {
        self.frequencies[0]
    }

    /// Bit `j` set for every leaf.
    pub fn leaf_mask(&self) -> SlotMask {
        self.leaf_mask
    }

    /// Leaf indices in ascending order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        SlotBits(self.leaf_mask)
    }

    /// Generation number assigned by the scheduler.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of nonzero slots.
    pub fn busy_slots(&self) -> usize {
        self.tape.iter().filter(|&&mask| mask != 0).count()
    }
}

/// Iterator over the set bits of a [`SlotMask`], lowest first.
#[derive(Debug, Clone, Copy)]
pub struct SlotBits(pub SlotMask);

impl Iterator for SlotBits {
    type Item = NodeIndex;

    #[inline]
    fn next(&mut self) -> Option<NodeIndex> {
        if self.0 == 0 {
            return None;
        }
        let bit = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(bit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

/// True if the tape holds at least two consecutive empty slots.
pub(crate) fn has_empty_run(tape: &[SlotMask]) -> bool {
    tape.windows(2).any(|pair| pair[0] == 0 && pair[1] == 0)
}

/// Fill `next` with forward links for `tape` in one backward pass.
pub(crate) fn link_forward(tape: &[SlotMask], next: &mut Vec<u32>) {
    next.clear();
    next.resize(tape.len(), 0);
    let mut following = 0u32;
    for i in (0..tape.len()).rev() {
        next[i] = following;
        if tape[i] != 0 {
            following = i as u32;
        }
    }
}
