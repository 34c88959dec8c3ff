//! Resumable, budgeted tape playback.
//!
//! The [`PlaybackEngine`] walks a [`CompiledSchedule`] from its
//! [`PlaybackCursor`], firing the leaves of every nonzero slot, until either
//! the tick budget is spent or the caller's interrupt probe reports a pending
//! reconfiguration. Splitting a budget across calls never skips or repeats a
//! tick: running 7 ticks three times leaves the cursor, the tick counter and
//! every leaf in the same state as running 21 ticks once.
//!
//! # Cycle hints
//!
//! Before a slot fires, each leaf on it gets a hint: how many ticks remain
//! until any *other* leaf is next due,
//! `min(period[k] + 1 - position % period[k])` over the other leaves `k`.
//! The leaf returns what it actually consumed. Consuming more than the hint is
//! an overrun: it is counted, logged, and the leaf's remaining allowance for
//! the slot drops to zero. A leaf whose allowance is already zero is skipped.

use crate::leaf::UNBOUNDED_HINT;
use crate::rational::mul_div;
use crate::schedule::{CompiledSchedule, SlotBits, SlotMask};
use crate::topology::{ClockTree, MAX_NODES, NodeIndex};

/// Position inside one simulated second, plus a free-running tick counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackCursor {
    /// Current tape replay, `0..repeat_count`.
    pub repetition: u64,
    /// Current slot, `0..tape_length`.
    pub slot: usize,
    /// Ticks played since the scheduler started (never reset).
    pub tick: u64,
}

impl PlaybackCursor {
    /// Linear position within the second: `repetition × tape_length + slot`.
    #[inline]
    pub fn position(&self, tape_length: usize) -> u64 {
        self.repetition * tape_length as u64 + self.slot as u64
    }

    /// Cursor at linear `position`, keeping `tick`.
    pub fn at_position(position: u64, tape_length: usize, tick: u64) -> Self {
        let tape_length = tape_length.max(1) as u64;
        Self {
            repetition: position / tape_length,
            slot: (position % tape_length) as usize,
            tick,
        }
    }

    /// Map this cursor from an old schedule's coordinates into a new one's.
    ///
    /// `scale = new_total × 100 / old_total`,
    /// `new_position = old_position × scale / 100`, wrapped into the new
    /// second. The free-running tick counter is kept.
    pub fn rescaled(
        &self,
        old_tape_length: usize,
        old_total: u64,
        new_tape_length: usize,
        new_total: u64,
    ) -> Self {
        let old_position = self.position(old_tape_length);
        let position = rescale_position(old_position, old_total, new_total);
        Self::at_position(position, new_tape_length, self.tick)
    }
}

/// Proportional position mapping with whole-percent scale resolution.
pub fn rescale_position(position: u64, old_total: u64, new_total: u64) -> u64 {
    if old_total == 0 || new_total == 0 {
        return 0;
    }
    let scale = u128::from(new_total) * 100 / u128::from(old_total);
    let mapped = u128::from(position) * scale / 100;
    (mapped % u128::from(new_total)) as u64
}

/// Exact proportional mapping of a tick count between two tick rates.
pub fn rescale_ticks(ticks: u64, old_total: u64, new_total: u64) -> u64 {
    if old_total == 0 {
        return 0;
    }
    mul_div(ticks, new_total, old_total)
}

/// Cycles a leaf may use before another leaf is due.
///
/// `position` is the linear tick position within the second. Returns
/// [`UNBOUNDED_HINT`] when `leaf` is the only leaf.
pub fn cycle_hint(schedule: &CompiledSchedule, leaf: NodeIndex, position: u64) -> u32 {
    let others = schedule.leaf_mask() & !(1 << leaf);
    let nearest = SlotBits(others)
        .filter_map(|k| schedule.leaf_period(k))
        .map(|period| period + 1 - position % period)
        .min();
    match nearest {
        Some(hint) => u32::try_from(hint).unwrap_or(UNBOUNDED_HINT),
        None => UNBOUNDED_HINT,
    }
}

/// Per-slot cycle allowance for each leaf.
#[derive(Debug, Clone)]
pub struct HintTable {
    available: [u32; MAX_NODES],
}

impl Default for HintTable {
    fn default() -> Self {
        Self {
            available: [0; MAX_NODES],
        }
    }
}

impl HintTable {
    /// Compute allowances for every leaf in `mask` at `position`.
    pub fn fill(&mut self, schedule: &CompiledSchedule, mask: SlotMask, position: u64) {
        for j in SlotBits(mask) {
            self.available[j] = cycle_hint(schedule, j, position);
        }
    }

    /// Remaining allowance of leaf `j`.
    #[inline]
    pub fn available(&self, j: NodeIndex) -> u32 {
        self.available[j]
    }

    /// Charge `used` cycles to leaf `j`. Returns `true` on overrun, in which
    /// case the allowance is clamped to zero.
    pub fn acknowledge(&mut self, j: NodeIndex, used: u32) -> bool {
        let slot = &mut self.available[j];
        if used > *slot {
            *slot = 0;
            true
        } else {
            *slot -= used;
            false
        }
    }
}

/// Why [`PlaybackEngine::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// The whole budget was consumed.
    BudgetExhausted,
    /// A reconfiguration is pending; the slot that was firing has completed
    /// and the cursor sits after it.
    Reconfigured,
}

/// Result of one [`PlaybackEngine::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Why the call returned.
    pub status: PlaybackStatus,
    /// Ticks consumed out of the budget.
    pub consumed: u64,
    /// Leaf invocations performed.
    pub invocations: u64,
}

/// Tape walker. Owns the cursor and the overrun counter.
#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    cursor: PlaybackCursor,
    hints: HintTable,
    overruns: u64,
    use_skip_index: bool,
}

impl Default for PlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackEngine {
    /// Engine at `(0, 0)` with skip-index use enabled.
    pub fn new() -> Self {
        Self {
            cursor: PlaybackCursor::default(),
            hints: HintTable::default(),
            overruns: 0,
            use_skip_index: true,
        }
    }

    /// Current cursor.
    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    /// Overwrite the cursor.
    pub fn set_cursor(&mut self, cursor: PlaybackCursor) {
        self.cursor = cursor;
    }

    /// Total overruns seen.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Whether a schedule's skip index is honored.
    pub fn set_skip_index_enabled(&mut self, enabled: bool) {
        self.use_skip_index = enabled;
    }

    /// Rewind to the start of the second, keeping the tick counter.
    pub fn realign(&mut self) {
        self.cursor.repetition = 0;
        self.cursor.slot = 0;
    }

    /// Move the cursor into a new schedule's coordinates.
    pub fn rescale(&mut self, old: &CompiledSchedule, new: &CompiledSchedule) {
        self.cursor = self.cursor.rescaled(
            old.tape_length(),
            old.ticks_per_second(),
            new.tape_length(),
            new.ticks_per_second(),
        );
    }

    /// Play up to `budget` ticks of `schedule`, invoking leaves from `tree`.
    ///
    /// `interrupted` is probed after every nonzero slot; when it returns
    /// `true` the engine stops with [`PlaybackStatus::Reconfigured`].
    pub fn run<F>(
        &mut self,
        schedule: &CompiledSchedule,
        tree: &mut ClockTree,
        budget: u64,
        mut interrupted: F,
    ) -> RunReport
    where
        F: FnMut() -> bool,
    {
        let tape_length = schedule.tape_length();
        let mut remaining = budget;
        let mut invocations = 0;

        if tape_length == 0 {
            return RunReport {
                status: PlaybackStatus::BudgetExhausted,
                consumed: 0,
                invocations,
            };
        }
        if self.cursor.repetition >= schedule.repeat_count() || self.cursor.slot >= tape_length {
            self.realign();
        }

        // Nothing to fire: move the cursor arithmetically.
        if schedule.leaf_mask() == 0 {
            let total = schedule.ticks_per_second();
            let position = (self.cursor.position(tape_length) + budget % total) % total;
            self.cursor = PlaybackCursor::at_position(position, tape_length, self.cursor.tick + budget);
            return RunReport {
                status: PlaybackStatus::BudgetExhausted,
                consumed: budget,
                invocations,
            };
        }

        let skip = if self.use_skip_index {
            schedule.skip_index()
        } else {
            None
        };

        while remaining > 0 {
            let slot = self.cursor.slot;
            let mask = schedule.slot(slot);

            if mask == 0 {
                let step = match skip {
                    Some(index) => index.next_after(slot).unwrap_or(tape_length) - slot,
                    None => 1,
                };
                let step = (step as u64).min(remaining);
                self.advance(step, schedule);
                remaining -= step;
                continue;
            }

            let position = self.cursor.position(tape_length);
            self.hints.fill(schedule, mask, position);
            for j in SlotBits(mask) {
                let available = self.hints.available(j);
                if available == 0 {
                    continue;
                }
                let Some(device) = tree.leaf_mut(j) else {
                    continue;
                };
                let used = device.run(available);
                invocations += 1;
                if self.hints.acknowledge(j, used) {
                    self.overruns += 1;
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        "leaf {j} used {used} cycles with {available} available at tick {}, expect desync",
                        self.cursor.tick
                    );
                }
            }

            self.advance(1, schedule);
            remaining -= 1;

            if interrupted() {
                return RunReport {
                    status: PlaybackStatus::Reconfigured,
                    consumed: budget - remaining,
                    invocations,
                };
            }
        }

        RunReport {
            status: PlaybackStatus::BudgetExhausted,
            consumed: budget,
            invocations,
        }
    }

    /// Step forward `step` ticks without crossing the end of the tape.
    #[inline]
    fn advance(&mut self, step: u64, schedule: &CompiledSchedule) {
        self.cursor.tick += step;
        self.cursor.slot += step as usize;
        if self.cursor.slot >= schedule.tape_length() {
            self.cursor.slot = 0;
            self.cursor.repetition += 1;
            if self.cursor.repetition >= schedule.repeat_count() {
                self.cursor.repetition = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, compile};
    use crate::leaf::DEFAULT_CONSUMED_CYCLES;
    use crate::topology::ClockNode;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counter_leaf(parent: usize, hits: &Arc<AtomicU32>) -> ClockNode {
        let hits = Arc::clone(hits);
        ClockNode::leaf(parent, move |_available: u32| {
            hits.fetch_add(1, Ordering::Relaxed);
            DEFAULT_CONSUMED_CYCLES
        })
    }

    /// Master 100 Hz, leaves at 100, 30 and 10 Hz.
    fn three_rate_tree() -> (ClockTree, [Arc<AtomicU32>; 3]) {
        let hits = [
            Arc::new(AtomicU32::new(0)),
            Arc::new(AtomicU32::new(0)),
            Arc::new(AtomicU32::new(0)),
        ];
        let mut tree = ClockTree::new();
        tree.add_node(0, ClockNode::master(100)).unwrap();
        tree.add_node(1, counter_leaf(0, &hits[0])).unwrap();
        tree.add_node(2, ClockNode::divider(0, 30)).unwrap();
        tree.add_node(3, counter_leaf(2, &hits[1])).unwrap();
        tree.add_node(4, ClockNode::divider(0, 10)).unwrap();
        tree.add_node(5, counter_leaf(4, &hits[2])).unwrap();
        (tree, hits)
    }

    fn counts(hits: &[Arc<AtomicU32>; 3]) -> [u32; 3] {
        [
            hits[0].load(Ordering::Relaxed),
            hits[1].load(Ordering::Relaxed),
            hits[2].load(Ordering::Relaxed),
        ]
    }

    #[test]
    fn test_one_second_fires_each_leaf_at_its_rate() {
        let (mut tree, hits) = three_rate_tree();
        let schedule = compile(&tree, &CompileOptions::default()).unwrap();
        let mut engine = PlaybackEngine::new();
        let report = engine.run(&schedule, &mut tree, schedule.ticks_per_second(), || false);
        assert_eq!(report.status, PlaybackStatus::BudgetExhausted);
        assert_eq!(report.consumed, schedule.ticks_per_second());
        assert_eq!(counts(&hits), [100, 30, 10]);
        assert_eq!(engine.cursor().repetition, 0);
        assert_eq!(engine.cursor().slot, 0);
        assert_eq!(engine.cursor().tick, schedule.ticks_per_second());
    }

    #[test]
    fn test_chopped_budget_matches_single_call() {
        let (mut tree_a, hits_a) = three_rate_tree();
        let (mut tree_b, hits_b) = three_rate_tree();
        let schedule = compile(&tree_a, &CompileOptions::default()).unwrap();

        let mut a = PlaybackEngine::new();
        for _ in 0..3 {
            a.run(&schedule, &mut tree_a, 7, || false);
        }
        let mut b = PlaybackEngine::new();
        b.run(&schedule, &mut tree_b, 21, || false);

        assert_eq!(a.cursor(), b.cursor());
        assert_eq!(counts(&hits_a), counts(&hits_b));
    }

    #[test]
    fn test_skip_index_does_not_change_behavior() {
        let (mut tree_a, hits_a) = three_rate_tree();
        let (mut tree_b, hits_b) = three_rate_tree();
        let schedule = compile(&tree_a, &CompileOptions::default()).unwrap();
        assert!(schedule.is_sparse());

        let mut fast = PlaybackEngine::new();
        let mut slow = PlaybackEngine::new();
        slow.set_skip_index_enabled(false);
        for budget in [1, 5, 13, 40, 333, 1] {
            fast.run(&schedule, &mut tree_a, budget, || false);
            slow.run(&schedule, &mut tree_b, budget, || false);
            assert_eq!(fast.cursor(), slow.cursor());
            assert_eq!(counts(&hits_a), counts(&hits_b));
        }
    }

    #[test]
    fn test_hint_example() {
        // 1000 Hz and 300 Hz leaves: tape 30 ticks, periods 3 and 10.
        let mut tree = ClockTree::new();
        tree.add_node(0, ClockNode::master(1000)).unwrap();
        tree.add_node(1, ClockNode::leaf(0, |_: u32| DEFAULT_CONSUMED_CYCLES)).unwrap();
        tree.add_node(2, ClockNode::divider(0, 30)).unwrap();
        tree.add_node(3, ClockNode::leaf(2, |_: u32| DEFAULT_CONSUMED_CYCLES)).unwrap();
        let schedule = compile(&tree, &CompileOptions::default()).unwrap();
        assert_eq!(schedule.leaf_period(1), Some(3));
        assert_eq!(schedule.leaf_period(3), Some(10));

        assert_eq!(cycle_hint(&schedule, 1, 13), 8);
        assert_eq!(cycle_hint(&schedule, 3, 13), 3);
    }

    #[test]
    fn test_lone_leaf_hint_is_unbounded() {
        let mut tree = ClockTree::new();
        tree.add_node(0, ClockNode::master(10)).unwrap();
        tree.add_node(1, ClockNode::leaf(0, |_: u32| DEFAULT_CONSUMED_CYCLES)).unwrap();
        let schedule = compile(&tree, &CompileOptions::default()).unwrap();
        assert_eq!(cycle_hint(&schedule, 1, 0), UNBOUNDED_HINT);
    }

    #[test]
    fn test_overrun_is_counted_not_fatal() {
        let mut tree = ClockTree::new();
        tree.add_node(0, ClockNode::master(1000)).unwrap();
        tree.add_node(1, ClockNode::leaf(0, |available: u32| available + 5))
            .unwrap();
        tree.add_node(2, ClockNode::divider(0, 30)).unwrap();
        tree.add_node(3, ClockNode::leaf(2, |_: u32| DEFAULT_CONSUMED_CYCLES)).unwrap();
        let schedule = compile(&tree, &CompileOptions::default()).unwrap();

        let mut engine = PlaybackEngine::new();
        let report = engine.run(&schedule, &mut tree, 30, || false);
        assert_eq!(report.status, PlaybackStatus::BudgetExhausted);
        // Leaf 1 fires on 10 slots and overruns every time.
        assert_eq!(engine.overruns(), 10);
        assert_eq!(report.invocations, 13);
    }

    #[test]
    fn test_hint_table_acknowledge() {
        let mut hints = HintTable::default();
        hints.available[4] = 3;
        assert!(!hints.acknowledge(4, 2));
        assert_eq!(hints.available(4), 1);
        assert!(hints.acknowledge(4, 2));
        assert_eq!(hints.available(4), 0);
    }

    #[test]
    fn test_interrupt_stops_after_firing_slot() {
        let (mut tree, hits) = three_rate_tree();
        let schedule = compile(&tree, &CompileOptions::default()).unwrap();
        let mut engine = PlaybackEngine::new();
        let report = engine.run(&schedule, &mut tree, 50, || true);
        assert_eq!(report.status, PlaybackStatus::Reconfigured);
        assert_eq!(report.consumed, 1);
        assert_eq!(engine.cursor().slot, 1);
        assert_eq!(counts(&hits), [1, 1, 1]);
    }

    #[test]
    fn test_master_only_advances_arithmetically() {
        let mut tree = ClockTree::new();
        tree.add_node(0, ClockNode::master(1_000_000)).unwrap();
        let schedule = compile(&tree, &CompileOptions::default()).unwrap();
        let mut engine = PlaybackEngine::new();
        let report = engine.run(&schedule, &mut tree, 1_500_000, || false);
        assert_eq!(report.consumed, 1_500_000);
        assert_eq!(engine.cursor().position(1), 500_000);
        assert_eq!(engine.cursor().tick, 1_500_000);
    }

    #[test]
    fn test_rescale_position() {
        assert_eq!(rescale_position(1050, 2100, 4200), 2100);
        assert_eq!(rescale_position(0, 2100, 10), 0);
        assert_eq!(rescale_position(500, 1000, 0), 0);
        // Scale resolution is whole percent.
        assert_eq!(rescale_position(300, 300, 100), 99);
    }

    #[test]
    fn test_cursor_rescaled_decomposes() {
        let cursor = PlaybackCursor {
            repetition: 5,
            slot: 0,
            tick: 77,
        };
        // position 1050 of 2100, scale 4 % → 42 of 100 on a 10-slot tape.
        let moved = cursor.rescaled(210, 2100, 10, 100);
        assert_eq!(moved.repetition, 4);
        assert_eq!(moved.slot, 2);
        assert_eq!(moved.tick, 77);
    }
}
