//! End-to-end scheduler scenarios: frame pacing over whole seconds, a 1 Hz
//! tree, a fetch leaf driving an address space, edit rejection and a spawned
//! scheduler driven through its handle.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use quartz_core::{
    AccessAttributes, AccessWidth, AddressSpace, BusError, ClockNode, DEFAULT_CONSUMED_CYCLES,
    Leaf, ManualPacer, Scheduler, SchedulerError, TopologyEdit, TopologyError, UNBOUNDED_HINT,
};

fn counter(hits: &Arc<AtomicU32>) -> impl FnMut(u32) -> u32 + Send + 'static {
    let hits = Arc::clone(hits);
    move |_available| {
        hits.fetch_add(1, Ordering::Relaxed);
        DEFAULT_CONSUMED_CYCLES
    }
}

/// Read-only, execute-only ROM at address 0.
struct Rom {
    bytes: Vec<u8>,
    attributes: AccessAttributes,
}

impl AddressSpace for Rom {
    fn read(
        &self,
        address: u32,
        width: AccessWidth,
        attributes: AccessAttributes,
    ) -> Result<u32, BusError> {
        let start = address as usize;
        let end = start + width.bytes() as usize;
        if end > self.bytes.len() {
            return Err(BusError::Unmapped { address });
        }
        if !self.attributes.permits(attributes) {
            return Err(BusError::AttributeViolation {
                address,
                requested: attributes,
                granted: self.attributes,
            });
        }
        Ok(self.bytes[start..end]
            .iter()
            .rev()
            .fold(0, |acc, &b| (acc << 8) | u32::from(b)))
    }

    fn write(
        &mut self,
        address: u32,
        _width: AccessWidth,
        attributes: AccessAttributes,
        _value: u32,
    ) -> Result<(), BusError> {
        Err(BusError::AttributeViolation {
            address,
            requested: attributes,
            granted: self.attributes,
        })
    }
}

/// Fetches one half-word per call and records it, or the fault.
struct Fetch {
    rom: Rom,
    pc: u32,
    trace: Arc<Mutex<Vec<Result<u32, BusError>>>>,
}

impl Leaf for Fetch {
    fn run(&mut self, _available_cycles: u32) -> u32 {
        let opcode = self
            .rom
            .read(self.pc, AccessWidth::Half, AccessAttributes::SUPERVISOR_EXECUTE);
        if opcode.is_ok() {
            self.pc += 2;
        }
        self.trace.lock().unwrap().push(opcode);
        DEFAULT_CONSUMED_CYCLES
    }
}

#[test]
fn split_tree_runs_exact_counts_per_second() {
    let hits: Vec<_> = (0..3).map(|_| Arc::new(AtomicU32::new(0))).collect();
    let mut scheduler = Scheduler::default();
    scheduler.add_node(0, ClockNode::master(100).named("osc")).unwrap();
    scheduler.add_node(1, ClockNode::divider(0, 70)).unwrap();
    scheduler.add_node(2, ClockNode::leaf(1, counter(&hits[0]))).unwrap();
    scheduler.add_node(3, ClockNode::leaf(1, counter(&hits[1]))).unwrap();
    scheduler.add_node(4, ClockNode::divider(0, 30)).unwrap();
    scheduler.add_node(5, ClockNode::leaf(4, counter(&hits[2]))).unwrap();
    scheduler.compile().unwrap();

    let schedule = scheduler.schedule().unwrap();
    assert_eq!(schedule.tape_length(), 210);
    assert_eq!(schedule.repeat_count(), 10);

    let mut pacer = ManualPacer::default();
    for second in 1..=3 {
        let report = scheduler.run_frames(60, &mut pacer).unwrap();
        assert_eq!(report.ticks, 2100);
        let seen: Vec<u32> = hits.iter().map(|h| h.load(Ordering::Relaxed)).collect();
        assert_eq!(seen, vec![70 * second, 70 * second, 30 * second]);
    }
    assert_eq!(scheduler.telemetry().elapsed_ms, 3000);
}

#[test]
fn one_hertz_leaf_fires_once_at_the_end_of_the_second() {
    let hints = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&hints);
    let mut scheduler = Scheduler::default();
    scheduler.add_node(0, ClockNode::master(1)).unwrap();
    scheduler
        .add_node(
            1,
            ClockNode::leaf(0, move |available: u32| {
                seen.lock().unwrap().push(available);
                DEFAULT_CONSUMED_CYCLES
            }),
        )
        .unwrap();
    scheduler.compile().unwrap();

    let schedule = scheduler.schedule().unwrap();
    assert_eq!(schedule.tape(), &[0b10]);
    assert_eq!(schedule.repeat_count(), 1);

    let mut pacer = ManualPacer::default();
    let quiet = scheduler.run_frames(59, &mut pacer).unwrap();
    assert_eq!(quiet.invocations, 0);
    let last = scheduler.run_frame(&mut pacer).unwrap();
    assert_eq!(last.invocations, 1);
    // A lone leaf is never limited by another leaf's next firing.
    assert_eq!(*hints.lock().unwrap(), vec![UNBOUNDED_HINT]);
}

#[test]
fn fetch_leaf_walks_rom_and_faults_past_the_end() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let rom = Rom {
        bytes: (0u8..16).collect(),
        attributes: AccessAttributes::SUPERVISOR_READ | AccessAttributes::SUPERVISOR_EXECUTE,
    };
    let fetch = Fetch {
        rom,
        pc: 0,
        trace: Arc::clone(&trace),
    };

    let mut scheduler = Scheduler::default();
    scheduler.add_node(0, ClockNode::master(8)).unwrap();
    scheduler.add_node(1, ClockNode::leaf(0, fetch).named("cpu")).unwrap();
    scheduler.compile().unwrap();
    scheduler.advance(9).unwrap();

    let trace = trace.lock().unwrap();
    assert_eq!(trace.len(), 9);
    assert_eq!(trace[0], Ok(0x0100));
    assert_eq!(trace[7], Ok(0x0F0E));
    assert_eq!(trace[8], Err(BusError::Unmapped { address: 16 }));
}

#[test]
fn bad_placements_are_rejected_with_the_offending_index() {
    let mut scheduler = Scheduler::default();
    scheduler.add_node(0, ClockNode::master(1_000)).unwrap();

    let topology = |err: SchedulerError| err.as_topology().cloned();
    assert_eq!(
        topology(scheduler.add_node(32, ClockNode::divider(0, 50)).unwrap_err()),
        Some(TopologyError::IndexOutOfRange { index: 32, max: 32 })
    );
    assert_eq!(
        topology(scheduler.add_node(3, ClockNode::master(10)).unwrap_err()),
        Some(TopologyError::MasterNotAtZero { index: 3 })
    );
    assert_eq!(
        topology(scheduler.add_node(0, ClockNode::master(10)).unwrap_err()),
        Some(TopologyError::IndexOccupied { index: 0 })
    );
    assert_eq!(
        topology(scheduler.add_node(1, ClockNode::divider(0, 0)).unwrap_err()),
        Some(TopologyError::ZeroPercent { index: 1 })
    );

    // 1 % of 1000 Hz is 10 Hz; 5 % of that truncates to 0 Hz.
    scheduler.add_node(1, ClockNode::divider(0, 1)).unwrap();
    scheduler.add_node(2, ClockNode::divider(1, 5)).unwrap();
    scheduler
        .add_node(3, ClockNode::leaf(2, |_: u32| DEFAULT_CONSUMED_CYCLES))
        .unwrap();
    assert_eq!(
        topology(scheduler.compile().unwrap_err()),
        Some(TopologyError::ZeroFrequency { index: 2 })
    );
    assert!(scheduler.schedule().is_none());
}

#[test]
fn spawned_scheduler_pauses_retunes_and_stops() {
    let hits = Arc::new(AtomicU32::new(0));
    let mut scheduler = Scheduler::default();
    scheduler.add_node(0, ClockNode::master(600)).unwrap();
    scheduler.add_node(1, ClockNode::divider(0, 50)).unwrap();
    scheduler.add_node(2, ClockNode::leaf(1, counter(&hits))).unwrap();
    scheduler.compile().unwrap();

    let (handle, join) = scheduler.spawn_with(ManualPacer::default()).unwrap();

    handle.pause();
    assert!(handle.is_paused());
    thread::sleep(Duration::from_millis(20));
    let frozen = handle.telemetry().tick;
    thread::sleep(Duration::from_millis(50));
    assert_eq!(handle.telemetry().tick, frozen);

    // Edits are still applied while paused.
    let generation = handle
        .reconfigure(vec![TopologyEdit::Replace {
            index: 1,
            node: ClockNode::divider(0, 25),
        }])
        .unwrap();
    assert_eq!(generation, 2);
    assert_eq!(handle.telemetry().ticks_per_second(), 600);

    handle.resume();
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.telemetry().tick == frozen && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(handle.telemetry().tick > frozen);

    handle.stop();
    let telemetry = join.join().unwrap().unwrap();
    assert_eq!(telemetry.generation, 2);
    assert!(matches!(
        handle.remove_node(2),
        Err(SchedulerError::Disconnected)
    ));
}
