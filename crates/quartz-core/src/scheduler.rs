//! The owned scheduler: clock tree, live schedule, playback and pacing.
//!
//! Lifecycle is explicit: [`Scheduler::new`] → [`add_node`](Scheduler::add_node)
//! … → [`compile`](Scheduler::compile) → [`run`](Scheduler::run) (or
//! [`spawn`](Scheduler::spawn) onto a dedicated thread). Everything runs on one
//! thread; other threads steer it through a [`SchedulerHandle`].
//!
//! # Live reconfiguration
//!
//! Queued edits are applied at frame start, and between slots when the
//! playback engine reports a pending request. A batch is all-or-nothing: if
//! any edit or the following compile fails, the tree is rolled back and the
//! error is fatal to the run loop. On success the generation is bumped and the
//! cursor, the rest of the second's budget and the rest of the current frame
//! are all rescaled into the new schedule's tick rate.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::compiler::{self, CompileOptions};
use crate::control::{ReconfigureRequest, SchedulerHandle, Shared, Telemetry, TopologyEdit};
use crate::error::SchedulerError;
use crate::pacing::{DriftCorrector, FrameBudget, Pacer, PacingConfig, SystemPacer};
use crate::playback::{PlaybackCursor, PlaybackEngine, PlaybackStatus, rescale_ticks};
use crate::rational::mul_div;
use crate::schedule::CompiledSchedule;
use crate::topology::{ClockNode, ClockTree, NodeIndex};

/// Scheduler settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerConfig {
    /// Frame rate and drift correction.
    pub pacing: PacingConfig,
    /// Tape limits and skip-index policy.
    pub compile: CompileOptions,
}

/// What happened during one frame (or one offline [`Scheduler::advance`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    /// Ticks played.
    pub ticks: u64,
    /// Leaf invocations.
    pub invocations: u64,
    /// Reconfiguration batches applied.
    pub reconfigurations: u32,
    /// First frame of a simulated second.
    pub second_start: bool,
    /// The loop parked on the pause flag during this frame.
    pub paused: bool,
    /// Drift measured at the end of the frame, when a correction happened.
    pub drift_ms: Option<i64>,
}

enum Undo {
    Vacate(NodeIndex),
    Restore(NodeIndex, Option<ClockNode>),
    Reinsert(Vec<(NodeIndex, ClockNode)>),
}

/// Peripheral clock scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    tree: ClockTree,
    schedule: Option<Arc<CompiledSchedule>>,
    engine: PlaybackEngine,
    frames: FrameBudget,
    drift: DriftCorrector,
    shared: Arc<Shared>,
    commands: Sender<ReconfigureRequest>,
    requests: Receiver<ReconfigureRequest>,
    generation: u64,
    frame_count: u64,
    // Simulated time folded in at the last rate change.
    epoch_tick: u64,
    epoch_ms: u64,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl Scheduler {
    /// Empty scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_tree(config, ClockTree::new())
    }

    /// Scheduler over an existing tree. Call [`compile`](Self::compile) before
    /// running.
    pub fn with_tree(config: SchedulerConfig, tree: ClockTree) -> Self {
        let (commands, requests) = unbounded();
        let shared = Arc::new(Shared::new());
        shared.claim();
        Self {
            config,
            tree,
            schedule: None,
            engine: PlaybackEngine::new(),
            frames: FrameBudget::new(config.pacing.frame_rate, 0),
            drift: DriftCorrector::new(&config.pacing),
            shared,
            commands,
            requests,
            generation: 0,
            frame_count: 0,
            epoch_tick: 0,
            epoch_ms: 0,
        }
    }

    /// New handle for pause/resume/stop, reconfiguration and telemetry.
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
            commands: self.commands.clone(),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The clock tree.
    pub fn tree(&self) -> &ClockTree {
        &self.tree
    }

    /// The live schedule, if compiled.
    pub fn schedule(&self) -> Option<&Arc<CompiledSchedule>> {
        self.schedule.as_ref()
    }

    /// Playback cursor.
    pub fn cursor(&self) -> PlaybackCursor {
        self.engine.cursor()
    }

    /// Generation of the live schedule (0 before the first compile).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Add a node. Takes effect at the next [`compile`](Self::compile).
    pub fn add_node(&mut self, index: NodeIndex, node: ClockNode) -> Result<(), SchedulerError> {
        Ok(self.tree.add_node(index, node)?)
    }

    /// Replace a node. Takes effect at the next [`compile`](Self::compile).
    pub fn replace_node(
        &mut self,
        index: NodeIndex,
        node: ClockNode,
    ) -> Result<Option<ClockNode>, SchedulerError> {
        Ok(self.tree.replace_node(index, node)?)
    }

    /// Remove a node and its descendants. Takes effect at the next
    /// [`compile`](Self::compile).
    pub fn remove_node(
        &mut self,
        index: NodeIndex,
    ) -> Result<Vec<(NodeIndex, ClockNode)>, SchedulerError> {
        Ok(self.tree.remove_node(index)?)
    }

    /// Rebuild the schedule from the tree and make it live.
    ///
    /// The first compile starts playback at `(0, 0)`; later ones rescale the
    /// cursor and the remaining per-second budget into the new tick rate.
    /// Returns the new generation. On error the previous schedule stays live.
    pub fn compile(&mut self) -> Result<u64, SchedulerError> {
        let mut schedule = compiler::compile(&self.tree, &self.config.compile)?;
        self.generation += 1;
        schedule.generation = self.generation;
        let schedule = Arc::new(schedule);

        match self.schedule.as_deref() {
            Some(old) => {
                let tick = self.engine.cursor().tick;
                self.epoch_ms += ticks_to_ms(tick - self.epoch_tick, old.ticks_per_second());
                self.epoch_tick = tick;
                self.engine.rescale(old, &schedule);
                self.frames.rescale(schedule.ticks_per_second());

                #[cfg(feature = "tracing")]
                tracing::info!(
                    "scheduler: generation {} live ({} -> {} ticks/s), cursor at ({}, {})",
                    self.generation,
                    old.ticks_per_second(),
                    schedule.ticks_per_second(),
                    self.engine.cursor().repetition,
                    self.engine.cursor().slot
                );
            }
            None => {
                self.engine.realign();
                self.frames =
                    FrameBudget::new(self.config.pacing.frame_rate, schedule.ticks_per_second());

                #[cfg(feature = "tracing")]
                tracing::info!(
                    "scheduler: generation {} live ({} ticks/s)",
                    self.generation,
                    schedule.ticks_per_second()
                );
            }
        }

        self.schedule = Some(schedule);
        self.publish();
        Ok(self.generation)
    }

    /// Current telemetry.
    pub fn telemetry(&self) -> Telemetry {
        let (tape_length, repeat_count, sparse) = self
            .schedule
            .as_deref()
            .map(|s| (s.tape_length() as u64, s.repeat_count(), s.is_sparse()))
            .unwrap_or((0, 0, false));
        let tick = self.engine.cursor().tick;
        let ticks_per_second = tape_length * repeat_count;
        Telemetry {
            tick,
            elapsed_ms: self.epoch_ms + ticks_to_ms(tick - self.epoch_tick, ticks_per_second),
            sleep_ms: self.drift.sleep_ms(),
            generation: self.generation,
            overruns: self.engine.overruns(),
            frames: self.frame_count,
            tape_length,
            repeat_count,
            sparse,
        }
    }

    /// Simulated time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.telemetry().elapsed_ms
    }

    /// Play one frame: apply pending edits, play the frame's budget, park if
    /// paused, sleep, correct drift, publish telemetry.
    pub fn run_frame<P>(&mut self, pacer: &mut P) -> Result<FrameReport, SchedulerError>
    where
        P: Pacer + ?Sized,
    {
        self.shared.claim();
        self.frame(pacer)
    }

    /// Run up to `frames` frames (fewer if stopped). Returns the summed report.
    pub fn run_frames<P>(&mut self, frames: u64, pacer: &mut P) -> Result<FrameReport, SchedulerError>
    where
        P: Pacer + ?Sized,
    {
        let mut total = FrameReport::default();
        for _ in 0..frames {
            if self.shared.stop_requested() {
                break;
            }
            let report = self.run_frame(pacer)?;
            total.ticks += report.ticks;
            total.invocations += report.invocations;
            total.reconfigurations += report.reconfigurations;
            total.second_start |= report.second_start;
            total.paused |= report.paused;
            total.drift_ms = report.drift_ms.or(total.drift_ms);
        }
        Ok(total)
    }

    /// Play `ticks` ticks immediately, without frames or sleeps.
    pub fn advance(&mut self, ticks: u64) -> Result<FrameReport, SchedulerError> {
        self.shared.claim();
        let mut report = FrameReport::default();
        self.play(ticks, &mut report)?;
        self.publish();
        Ok(report)
    }

    /// Run frames until stopped.
    ///
    /// Returns the final telemetry, or the fatal error that ended the loop.
    /// Either way, requests still queued are answered with
    /// [`SchedulerError::Stopped`].
    pub fn run<P>(&mut self, pacer: &mut P) -> Result<Telemetry, SchedulerError>
    where
        P: Pacer + ?Sized,
    {
        #[cfg(feature = "tracing")]
        tracing::info!("scheduler: running at {} fps", self.config.pacing.frame_rate);

        let result = loop {
            if self.shared.stop_requested() {
                break Ok(());
            }
            if let Err(err) = self.run_frame(pacer) {
                break Err(err);
            }
        };

        self.drain_requests();

        match result {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::info!("scheduler: stopped after {} frames", self.frame_count);
                Ok(self.telemetry())
            }
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::error!("scheduler: halted: {err}");
                Err(err)
            }
        }
    }

    /// Move the scheduler onto a dedicated thread paced by the system clock.
    pub fn spawn(
        self,
    ) -> std::io::Result<(SchedulerHandle, JoinHandle<Result<Telemetry, SchedulerError>>)> {
        self.spawn_with(SystemPacer::new())
    }

    /// Move the scheduler onto a dedicated thread paced by `pacer`.
    pub fn spawn_with<P>(
        mut self,
        mut pacer: P,
    ) -> std::io::Result<(SchedulerHandle, JoinHandle<Result<Telemetry, SchedulerError>>)>
    where
        P: Pacer + Send + 'static,
    {
        let handle = self.handle();
        self.shared.release();
        let join = thread::Builder::new()
            .name("quartz-scheduler".into())
            .spawn(move || {
                self.shared.claim();
                self.run(&mut pacer)
            })?;
        Ok((handle, join))
    }

    fn frame<P>(&mut self, pacer: &mut P) -> Result<FrameReport, SchedulerError>
    where
        P: Pacer + ?Sized,
    {
        let mut report = FrameReport::default();
        report.reconfigurations += self.apply_pending()?;
        if self.schedule.is_none() {
            return Err(SchedulerError::NotCompiled);
        }

        let slice = self.frames.next_frame();
        report.second_start = slice.second_start;
        if slice.second_start {
            self.engine.realign();
        }
        self.play(slice.budget, &mut report)?;

        if self.shared.is_paused() {
            report.paused = true;
            self.wait_while_paused()?;
            self.drift.restart();
        }
        if self.shared.stop_requested() {
            self.publish();
            return Ok(report);
        }

        pacer.sleep(Duration::from_millis(self.drift.sleep_ms()));
        report.drift_ms = self.drift.end_frame(pacer.now_ms());
        self.frame_count += 1;
        self.publish();
        Ok(report)
    }

    fn play(&mut self, budget: u64, report: &mut FrameReport) -> Result<(), SchedulerError> {
        let mut left = budget;
        while left > 0 {
            let schedule = self.live()?;
            let shared = &self.shared;
            let run = self.engine.run(&schedule, &mut self.tree, left, || {
                shared.pending.load(Ordering::Acquire)
            });
            left -= run.consumed;
            report.ticks += run.consumed;
            report.invocations += run.invocations;
            if run.status == PlaybackStatus::BudgetExhausted {
                break;
            }

            report.reconfigurations += self.apply_pending()?;
            let after = self.live()?.ticks_per_second();
            left = rescale_ticks(left, schedule.ticks_per_second(), after);
        }
        Ok(())
    }

    fn live(&self) -> Result<Arc<CompiledSchedule>, SchedulerError> {
        self.schedule.clone().ok_or(SchedulerError::NotCompiled)
    }

    fn wait_while_paused(&mut self) -> Result<(), SchedulerError> {
        let poll = self.config.pacing.pause_poll();
        while self.shared.is_paused() && !self.shared.stop_requested() {
            self.shared.park(poll);
            self.apply_pending()?;
        }
        Ok(())
    }

    /// Apply every queued request. Returns how many were applied.
    fn apply_pending(&mut self) -> Result<u32, SchedulerError> {
        if !self.shared.pending.swap(false, Ordering::AcqRel) {
            return Ok(0);
        }
        let mut applied = 0;
        while let Ok(ReconfigureRequest { edits, reply }) = self.requests.try_recv() {
            let result = self.apply_edits(edits);
            if let Some(reply) = reply {
                // The requester may have given up; nothing to do then.
                let _ = reply.send(result.clone());
            }
            result?;
            applied += 1;
        }
        Ok(applied)
    }

    fn apply_edits(&mut self, edits: Vec<TopologyEdit>) -> Result<u64, SchedulerError> {
        let mut undo = Vec::with_capacity(edits.len());
        for edit in edits {
            let step = match edit {
                TopologyEdit::Add { index, node } => {
                    self.tree.add_node(index, node).map(|()| Undo::Vacate(index))
                }
                TopologyEdit::Replace { index, node } => self
                    .tree
                    .replace_node(index, node)
                    .map(|old| Undo::Restore(index, old)),
                TopologyEdit::Remove { index } => self.tree.remove_node(index).map(Undo::Reinsert),
            };
            match step {
                Ok(u) => undo.push(u),
                Err(err) => {
                    self.rollback(undo);
                    return Err(self.rejected(err.into()));
                }
            }
        }

        match self.compile() {
            Ok(generation) => Ok(generation),
            Err(err) => {
                self.rollback(undo);
                Err(self.rejected(err))
            }
        }
    }

    fn rollback(&mut self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            match step {
                Undo::Vacate(index) => {
                    self.tree.put(index, None);
                }
                Undo::Restore(index, old) => {
                    self.tree.put(index, old);
                }
                Undo::Reinsert(nodes) => {
                    for (index, node) in nodes {
                        self.tree.put(index, Some(node));
                    }
                }
            }
        }
    }

    #[cfg_attr(not(feature = "tracing"), allow(clippy::unused_self))]
    fn rejected(&self, err: SchedulerError) -> SchedulerError {
        #[cfg(feature = "tracing")]
        tracing::error!(
            "scheduler: reconfiguration rejected at generation {}: {err}",
            self.generation
        );
        err
    }

    fn drain_requests(&mut self) {
        self.shared.pending.store(false, Ordering::Release);
        while let Ok(request) = self.requests.try_recv() {
            if let Some(reply) = request.reply {
                let _ = reply.send(Err(SchedulerError::Stopped));
            }
        }
    }

    fn publish(&self) {
        self.shared.publish(&self.telemetry());
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.release();
    }
}

fn ticks_to_ms(ticks: u64, ticks_per_second: u64) -> u64 {
    if ticks_per_second == 0 {
        0
    } else {
        mul_div(ticks, 1000, ticks_per_second)
    }
}
