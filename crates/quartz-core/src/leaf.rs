//! The schedulable-device trait.
//!
//! A leaf is anything the tape fires: the CPU fetch step, a timer, a UART.
//! Each invocation receives a cycle hint (how many ticks remain before the
//! next *other* leaf is due) and returns how many ticks it actually used.
//! The playback engine compares the two and reports overruns.

/// Cycles a leaf reports when it has nothing more specific to say.
pub const DEFAULT_CONSUMED_CYCLES: u32 = 1;

/// Hint value used when no other leaf is active.
pub const UNBOUNDED_HINT: u32 = u32::MAX;

/// A device driven by the clock tree.
///
/// Leaves run synchronously on the scheduler thread, one at a time, in
/// ascending node-index order within a tick. They must not block.
///
/// # Example
///
/// ```rust
/// use quartz_core::Leaf;
///
/// struct Timer {
///     counter: u32,
/// }
///
/// impl Leaf for Timer {
///     fn run(&mut self, _available_cycles: u32) -> u32 {
///         self.counter = self.counter.wrapping_add(1);
///         1
///     }
/// }
/// ```
pub trait Leaf: Send {
    /// Run one scheduled step.
    ///
    /// `available_cycles` is the number of ticks this leaf may occupy before
    /// another leaf needs the engine ([`UNBOUNDED_HINT`] if it is alone).
    /// Returns the ticks actually consumed.
    fn run(&mut self, available_cycles: u32) -> u32;
}

impl<F> Leaf for F
where
    F: FnMut(u32) -> u32 + Send,
{
    #[inline]
    fn run(&mut self, available_cycles: u32) -> u32 {
        self(available_cycles)
    }
}

/// Adapter for zero-argument callbacks; always reports one consumed cycle.
pub struct LeafFn<F>(F);

impl<F> Leaf for LeafFn<F>
where
    F: FnMut() + Send,
{
    #[inline]
    fn run(&mut self, _available_cycles: u32) -> u32 {
        (self.0)();
        DEFAULT_CONSUMED_CYCLES
    }
}

/// Wrap a plain `FnMut()` callback as a [`Leaf`].
pub fn leaf_fn<F>(callback: F) -> LeafFn<F>
where
    F: FnMut() + Send,
{
    LeafFn(callback)
}
