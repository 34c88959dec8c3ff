//! Cross-thread control surface for a running scheduler.
//!
//! [`SchedulerHandle`] is the only way other threads (and leaves) talk to the
//! run loop. Three things cross the boundary:
//!
//! - the wake flag, guarded by a `parking_lot` mutex + condvar so a paused loop
//!   parks instead of spinning;
//! - topology edits, sent as [`ReconfigureRequest`]s over a `crossbeam`
//!   channel and applied by the loop at an interruptible point;
//! - telemetry, published into atomics after every frame.
//!
//! `reconfigure` blocks until the loop has applied the edit and rebuilt the
//! tape. Leaves run on the scheduler thread, so they must use `submit`
//! instead; a blocking call from that thread fails with
//! [`SchedulerError::WouldDeadlock`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use crossbeam_channel::{Sender, bounded};
use parking_lot::{Condvar, Mutex};

use crate::error::SchedulerError;
use crate::topology::{ClockNode, NodeIndex};

/// One change to the clock tree.
#[derive(Debug)]
pub enum TopologyEdit {
    /// Insert into an empty slot.
    Add {
        /// Target slot.
        index: NodeIndex,
        /// New node.
        node: ClockNode,
    },
    /// Overwrite a slot.
    Replace {
        /// Target slot.
        index: NodeIndex,
        /// New node.
        node: ClockNode,
    },
    /// Remove a node and its descendants.
    Remove {
        /// Target slot.
        index: NodeIndex,
    },
}

/// A batch of edits applied atomically, followed by a recompile.
///
/// An empty batch just recompiles.
#[derive(Debug)]
pub struct ReconfigureRequest {
    pub(crate) edits: Vec<TopologyEdit>,
    pub(crate) reply: Option<Sender<Result<u64, SchedulerError>>>,
}

/// Snapshot of scheduler progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Telemetry {
    /// Free-running tick counter.
    pub tick: u64,
    /// Simulated milliseconds, each generation's ticks counted at its own
    /// tick rate.
    pub elapsed_ms: u64,
    /// Current adaptive sleep per frame.
    pub sleep_ms: u64,
    /// Generation of the live schedule (0 before the first compile).
    pub generation: u64,
    /// Cycle overruns seen so far.
    pub overruns: u64,
    /// Frames completed.
    pub frames: u64,
    /// Slots in the live tape.
    pub tape_length: u64,
    /// Tape replays per second.
    pub repeat_count: u64,
    /// Whether the live tape has a skip index.
    pub sparse: bool,
}

impl Telemetry {
    /// `tape_length × repeat_count`.
    pub fn ticks_per_second(&self) -> u64 {
        self.tape_length * self.repeat_count
    }
}

/// State shared between the scheduler and its handles.
#[derive(Debug)]
pub(crate) struct Shared {
    awake: Mutex<bool>,
    wake: Condvar,
    stop: AtomicBool,
    pub(crate) pending: AtomicBool,
    scheduler_thread: Mutex<Option<ThreadId>>,

    tick: AtomicU64,
    elapsed_ms: AtomicU64,
    sleep_ms: AtomicU64,
    generation: AtomicU64,
    overruns: AtomicU64,
    frames: AtomicU64,
    tape_length: AtomicU64,
    repeat_count: AtomicU64,
    sparse: AtomicBool,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            awake: Mutex::new(true),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            scheduler_thread: Mutex::new(None),
            tick: AtomicU64::new(0),
            elapsed_ms: AtomicU64::new(0),
            sleep_ms: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            overruns: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            tape_length: AtomicU64::new(0),
            repeat_count: AtomicU64::new(0),
            sparse: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        !*self.awake.lock()
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Park until woken, stopped, handed work, or `timeout` passes.
    pub(crate) fn park(&self, timeout: std::time::Duration) {
        let mut awake = self.awake.lock();
        if !*awake && !self.stop_requested() && !self.pending.load(Ordering::Acquire) {
            self.wake.wait_for(&mut awake, timeout);
        }
    }

    fn notify(&self) {
        let _guard = self.awake.lock();
        self.wake.notify_all();
    }

    /// Mark the calling thread as the one driving the scheduler.
    pub(crate) fn claim(&self) {
        *self.scheduler_thread.lock() = Some(thread::current().id());
    }

    pub(crate) fn release(&self) {
        *self.scheduler_thread.lock() = None;
    }

    fn on_scheduler_thread(&self) -> bool {
        *self.scheduler_thread.lock() == Some(thread::current().id())
    }

    pub(crate) fn publish(&self, t: &Telemetry) {
        self.tick.store(t.tick, Ordering::Relaxed);
        self.elapsed_ms.store(t.elapsed_ms, Ordering::Relaxed);
        self.sleep_ms.store(t.sleep_ms, Ordering::Relaxed);
        self.overruns.store(t.overruns, Ordering::Relaxed);
        self.frames.store(t.frames, Ordering::Relaxed);
        self.tape_length.store(t.tape_length, Ordering::Relaxed);
        self.repeat_count.store(t.repeat_count, Ordering::Relaxed);
        self.sparse.store(t.sparse, Ordering::Relaxed);
        self.generation.store(t.generation, Ordering::Release);
    }

    fn snapshot(&self) -> Telemetry {
        Telemetry {
            generation: self.generation.load(Ordering::Acquire),
            tick: self.tick.load(Ordering::Relaxed),
            elapsed_ms: self.elapsed_ms.load(Ordering::Relaxed),
            sleep_ms: self.sleep_ms.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            tape_length: self.tape_length.load(Ordering::Relaxed),
            repeat_count: self.repeat_count.load(Ordering::Relaxed),
            sparse: self.sparse.load(Ordering::Relaxed),
        }
    }
}

/// Clone-able, thread-safe handle to a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    pub(crate) shared: Arc<Shared>,
    pub(crate) commands: Sender<ReconfigureRequest>,
}

impl SchedulerHandle {
    /// Stop advancing ticks at the next frame boundary.
    pub fn pause(&self) {
        *self.shared.awake.lock() = false;

        #[cfg(feature = "tracing")]
        tracing::debug!("scheduler: pause requested");
    }

    /// Resume after [`pause`](Self::pause).
    pub fn resume(&self) {
        *self.shared.awake.lock() = true;
        self.shared.wake.notify_all();

        #[cfg(feature = "tracing")]
        tracing::debug!("scheduler: resume requested");
    }

    /// True while paused.
    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// End the run loop at the next frame boundary (also wakes a paused loop).
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.notify();
    }

    /// Queue `edits` without waiting. Safe to call from a leaf.
    ///
    /// The running loop notices at its next interruptible point, finishes the
    /// current slot, applies the batch and rescales the cursor.
    pub fn submit(&self, edits: Vec<TopologyEdit>) -> Result<(), SchedulerError> {
        self.send(ReconfigureRequest { edits, reply: None })
    }

    /// Apply `edits` and wait for the rebuilt schedule. Returns its generation.
    ///
    /// Requires the scheduler to be running on another thread. Called from
    /// the thread that owns the scheduler (the one that created it, or last
    /// drove a frame) it fails with [`SchedulerError::WouldDeadlock`], whether
    /// or not a frame is in progress.
    pub fn reconfigure(&self, edits: Vec<TopologyEdit>) -> Result<u64, SchedulerError> {
        if self.shared.on_scheduler_thread() {
            return Err(SchedulerError::WouldDeadlock);
        }
        let (reply, response) = bounded(1);
        self.send(ReconfigureRequest {
            edits,
            reply: Some(reply),
        })?;
        response.recv().map_err(|_| SchedulerError::Disconnected)?
    }

    /// Blocking single add.
    pub fn add_node(&self, index: NodeIndex, node: ClockNode) -> Result<u64, SchedulerError> {
        self.reconfigure(vec![TopologyEdit::Add { index, node }])
    }

    /// Blocking single replace.
    pub fn replace_node(&self, index: NodeIndex, node: ClockNode) -> Result<u64, SchedulerError> {
        self.reconfigure(vec![TopologyEdit::Replace { index, node }])
    }

    /// Blocking single remove.
    pub fn remove_node(&self, index: NodeIndex) -> Result<u64, SchedulerError> {
        self.reconfigure(vec![TopologyEdit::Remove { index }])
    }

    /// Generation of the live schedule.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// Latest published telemetry.
    pub fn telemetry(&self) -> Telemetry {
        self.shared.snapshot()
    }

    fn send(&self, request: ReconfigureRequest) -> Result<(), SchedulerError> {
        self.commands
            .send(request)
            .map_err(|_| SchedulerError::Disconnected)?;
        self.shared.pending.store(true, Ordering::Release);
        self.shared.notify();
        Ok(())
    }
}
