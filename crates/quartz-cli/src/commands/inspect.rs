//! Schedule inspection command.

use std::path::PathBuf;

use clap::Args;
use quartz_core::{ClockTree, CompiledSchedule, NodeKind, SlotBits};

use super::common::{compile_topology, format_hz, load_topology};

#[derive(Args)]
pub struct InspectArgs {
    /// Topology file (TOML); defaults to the bundled demo
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the first N tape slots
    #[arg(long, value_name = "N")]
    tape: Option<usize>,
}

pub fn run(args: InspectArgs) -> anyhow::Result<()> {
    let config = load_topology(args.config.as_deref())?;
    let (tree, schedule) = compile_topology(&config)?;

    println!("Topology: {}", config.name);
    if let Some(description) = &config.description {
        println!("  {description}");
    }
    println!();
    print_summary(&schedule);
    println!();
    print_nodes(&tree, &schedule);

    if let Some(n) = args.tape {
        println!();
        print_tape(&schedule, n);
    }
    Ok(())
}

fn print_summary(schedule: &CompiledSchedule) {
    println!(
        "Ticks per second: {} ({})",
        schedule.ticks_per_second(),
        format_hz(schedule.ticks_per_second())
    );
    println!("Tape length:      {} slots", schedule.tape_length());
    println!("Repeat count:     {}", schedule.repeat_count());
    println!(
        "Busy slots:       {} / {}{}",
        schedule.busy_slots(),
        schedule.tape_length(),
        if schedule.is_sparse() {
            " (skip index)"
        } else {
            ""
        }
    );
}

fn print_nodes(tree: &ClockTree, schedule: &CompiledSchedule) {
    println!(
        "{:>5}  {:<8} {:<12} {:>6}  {:>12}  {:>8}",
        "INDEX", "KIND", "NAME", "PARENT", "FREQUENCY", "PERIOD"
    );
    for (index, node) in tree.iter() {
        let detail = match node.kind() {
            NodeKind::Divider { percent, .. } => format!("{} ({percent}%)", node.kind().label()),
            kind => kind.label().to_string(),
        };
        let parent = node
            .parent()
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        let frequency = schedule
            .effective_frequency(index)
            .map(format_hz)
            .unwrap_or_else(|| "-".into());
        let period = schedule
            .leaf_period(index)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:>5}  {:<8} {:<12} {:>6}  {:>12}  {:>8}",
            index,
            detail,
            node.name().unwrap_or("-"),
            parent,
            frequency,
            period
        );
    }
}

fn print_tape(schedule: &CompiledSchedule, n: usize) {
    let shown = n.min(schedule.tape_length());
    println!("Tape (first {shown} of {} slots):", schedule.tape_length());
    for (slot, &mask) in schedule.tape().iter().take(shown).enumerate() {
        let leaves: Vec<String> = SlotBits(mask).map(|j| j.to_string()).collect();
        let next = schedule
            .skip_index()
            .and_then(|skip| skip.next_after(slot))
            .map(|s| format!("  -> {s}"))
            .unwrap_or_default();
        println!("  {slot:>6}: {:#010x}  [{}]{next}", mask, leaves.join(" "));
    }
}
