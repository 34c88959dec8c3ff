//! Quartz Core - peripheral clock scheduler for cycle-driven emulation
//!
//! This crate models a microcontroller's clock-distribution tree (one master
//! oscillator, percentage dividers, leaf devices such as the CPU fetch step),
//! compiles it into a compact per-tick firing tape, and plays that tape back
//! in real time while the tree is edited underneath it.
//!
//! # Core Abstractions
//!
//! ## Topology
//!
//! - [`ClockTree`] - Fixed 32-slot arena of [`ClockNode`]s, master at index 0
//! - [`Leaf`] - Schedulable device: `run(available_cycles) -> consumed_cycles`
//!
//! ## Compilation
//!
//! - [`compile()`] - LCM/GCD reduction into a [`CompiledSchedule`]
//! - [`CompileOptions`] / [`SparseMode`] - Tape size limit and skip-index policy
//!
//! ## Playback & Pacing
//!
//! - [`PlaybackEngine`] - Resumable, budgeted tape walker with cycle hints
//! - [`FrameBudget`] - Even split of a second's ticks across frames
//! - [`DriftCorrector`] - ±1 ms sleep correction against wall-clock samples
//! - [`Pacer`] - Clock and sleep source ([`SystemPacer`], [`ManualPacer`])
//!
//! ## Running
//!
//! - [`Scheduler`] - Owns tree, schedule and playback; runs frames
//! - [`SchedulerHandle`] - Pause/resume/stop, live reconfiguration, telemetry
//!
//! ## Collaborators
//!
//! - [`AddressSpace`] - Memory interface leaves use, with [`AccessAttributes`]
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use quartz_core::{ClockNode, DEFAULT_CONSUMED_CYCLES, ManualPacer, Scheduler};
//!
//! let fetches = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&fetches);
//!
//! let mut scheduler = Scheduler::default();
//! scheduler.add_node(0, ClockNode::master(100)).unwrap();
//! scheduler.add_node(1, ClockNode::divider(0, 70)).unwrap();
//! scheduler
//!     .add_node(2, ClockNode::leaf(1, move |_available: u32| {
//!         counter.fetch_add(1, Ordering::Relaxed);
//!         DEFAULT_CONSUMED_CYCLES
//!     }))
//!     .unwrap();
//! scheduler.compile().unwrap();
//!
//! // 60 frames = one simulated second.
//! scheduler.run_frames(60, &mut ManualPacer::default()).unwrap();
//! assert_eq!(fetches.load(Ordering::Relaxed), 70);
//! ```

pub mod bus;
pub mod compiler;
pub mod control;
pub mod error;
pub mod leaf;
pub mod pacing;
pub mod playback;
pub mod rational;
pub mod schedule;
pub mod scheduler;
pub mod topology;

pub use bus::{AccessAttributes, AccessWidth, AddressSpace, BusError};
pub use compiler::{
    CompileOptions, DEFAULT_MAX_TAPE_LENGTH, SparseMode, TAPE_LENGTH_CEILING, compile,
};
pub use control::{SchedulerHandle, Telemetry, TopologyEdit};
pub use error::{SchedulerError, TopologyError};
pub use leaf::{DEFAULT_CONSUMED_CYCLES, Leaf, LeafFn, UNBOUNDED_HINT, leaf_fn};
pub use pacing::{
    DriftCorrector, FrameBudget, FrameSlice, ManualPacer, Pacer, PacingConfig, SystemPacer,
};
pub use playback::{
    HintTable, PlaybackCursor, PlaybackEngine, PlaybackStatus, RunReport, cycle_hint,
};
pub use schedule::{CompiledSchedule, SkipIndex, SlotBits, SlotMask};
pub use scheduler::{FrameReport, Scheduler, SchedulerConfig};
pub use topology::{ClockNode, ClockTree, MASTER_INDEX, MAX_NODES, NodeIndex, NodeKind};
