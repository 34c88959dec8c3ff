//! Rational frequency compiler: clock tree → tick tape.
//!
//! 1. Resolve every node's integer frequency (`master × Π percent / 100^depth`).
//! 2. `lcm` over the master and the leaves (dividers only scale descendants).
//! 3. Factor out `g = gcd` over the same set: `tape_length = lcm / g`,
//!    `repeat_count = g`.
//! 4. Leaf `j` gets period `tape_length / (f_j / g)` and fires on every slot
//!    that is a multiple of it.
//! 5. A tape with two consecutive empty slots gets a forward skip index.
//!
//! Everything is integer arithmetic. Any inconsistency is a hard error.

use crate::error::{SchedulerError, TopologyError};
use crate::rational::{checked_lcm, gcd};
use crate::schedule::{CompiledSchedule, SkipIndex, SlotBits, has_empty_run, link_forward};
use crate::topology::{ClockTree, MASTER_INDEX, MAX_NODES};

/// Default upper bound on tape length, in slots (16 Mi, 64 MiB of masks).
pub const DEFAULT_MAX_TAPE_LENGTH: usize = 16 * 1024 * 1024;

/// Hard ceiling on tape length: skip-index entries are `u32` slot numbers.
pub const TAPE_LENGTH_CEILING: usize = u32::MAX as usize;

/// Whether to build a skip index for sparse tapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SparseMode {
    /// Build one when the tape has a run of two or more empty slots.
    #[default]
    Auto,
    /// Never build one; playback walks every slot.
    Never,
}

/// Compilation limits and switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Longest tape the compiler will allocate. Values past
    /// [`TAPE_LENGTH_CEILING`] are clamped to it.
    pub max_tape_length: usize,
    /// Skip-index policy.
    pub sparse: SparseMode,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            max_tape_length: DEFAULT_MAX_TAPE_LENGTH,
            sparse: SparseMode::Auto,
        }
    }
}

/// Compile `tree` into a fresh [`CompiledSchedule`].
///
/// The tree is only read. Deterministic: the same tree always yields the same
/// tape.
///
/// # Errors
///
/// Any [`TopologyError`] from frequency resolution, [`SchedulerError::TapeTooLong`]
/// past `options.max_tape_length`, and [`SchedulerError::Allocation`] if the
/// tape or skip index cannot be reserved.
pub fn compile(
    tree: &ClockTree,
    options: &CompileOptions,
) -> Result<CompiledSchedule, SchedulerError> {
    let frequencies = tree.effective_frequencies()?;
    let leaf_mask = tree.leaf_mask();

    let mut lcm = frequencies[MASTER_INDEX];
    let mut g = frequencies[MASTER_INDEX];
    for j in SlotBits(leaf_mask) {
        lcm = checked_lcm(lcm, frequencies[j])
            .ok_or(TopologyError::FrequencyOverflow { index: j })?;
        g = gcd(g, frequencies[j]);
    }

    let tape_length = lcm / g;
    let repeat_count = g;
    let limit = options.max_tape_length.min(TAPE_LENGTH_CEILING);
    if tape_length > limit as u64 {
        return Err(SchedulerError::TapeTooLong {
            length: tape_length,
            limit,
        });
    }
    let len = tape_length as usize;

    let mut tape = Vec::new();
    tape.try_reserve_exact(len)
        .map_err(|e| SchedulerError::allocation("tape", len, e))?;
    tape.resize(len, 0);

    let mut leaf_periods = [0u64; MAX_NODES];
    for j in SlotBits(leaf_mask) {
        let reduced = frequencies[j] / g;
        if reduced == 0 || tape_length % reduced != 0 {
            return Err(TopologyError::InexactPeriod {
                index: j,
                tape_length,
                frequency: reduced,
            }
            .into());
        }
        let period = tape_length / reduced;
        leaf_periods[j] = period;
        for slot in (0..len).step_by(period as usize) {
            tape[slot] |= 1 << j;
        }
    }

    let skip_index = match options.sparse {
        SparseMode::Auto if has_empty_run(&tape) => {
            let mut next = Vec::new();
            next.try_reserve_exact(len)
                .map_err(|e| SchedulerError::allocation("skip index", len, e))?;
            link_forward(&tape, &mut next);
            Some(SkipIndex { next })
        }
        _ => None,
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "clock_compile: tape {tape_length} x {repeat_count} ({} ticks/s), {} leaves, sparse={}",
        lcm,
        leaf_mask.count_ones(),
        skip_index.is_some()
    );
    #[cfg(feature = "tracing")]
    for j in SlotBits(leaf_mask) {
        tracing::trace!(
            "clock_compile: leaf {j} at {} Hz, period {}",
            frequencies[j],
            leaf_periods[j]
        );
    }

    Ok(CompiledSchedule {
        tape,
        repeat_count,
        skip_index,
        leaf_periods,
        frequencies,
        leaf_mask,
        generation: 0,
    })
}
