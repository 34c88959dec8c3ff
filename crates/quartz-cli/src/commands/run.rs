//! Real-time run command.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use anyhow::{Context, anyhow};
use clap::Args;
use quartz_config::{NodeKindConfig, TopologyConfig};
use quartz_core::{ClockNode, ManualPacer, Scheduler, TopologyEdit};

use super::common::{build_tree, format_hz, load_topology};

const POLL: Duration = Duration::from_millis(20);

#[derive(Args)]
pub struct RunArgs {
    /// Topology file (TOML); defaults to the bundled demo
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Simulated seconds to run (until Ctrl+C when omitted)
    #[arg(short, long)]
    seconds: Option<u64>,

    /// Change a divider's percentage while running (e.g. "1=50")
    #[arg(long, value_parser = parse_retune, value_name = "INDEX=PERCENT")]
    retune: Vec<(usize, u32)>,

    /// Simulated second at which the --retune edits are applied
    #[arg(long, default_value = "1")]
    retune_at: u64,

    /// Do not pace against the wall clock; run as fast as possible
    #[arg(long)]
    unpaced: bool,
}

fn parse_retune(s: &str) -> Result<(usize, u32), String> {
    let (index, percent) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid retune '{s}' (expected INDEX=PERCENT)"))?;
    let index = index
        .trim()
        .parse()
        .map_err(|_| format!("invalid node index '{index}'"))?;
    let percent = percent
        .trim()
        .trim_end_matches('%')
        .parse()
        .map_err(|_| format!("invalid percentage '{percent}'"))?;
    Ok((index, percent))
}

/// One atomic batch replacing each named divider with a retuned copy.
fn retune_edits(
    config: &TopologyConfig,
    retunes: &[(usize, u32)],
) -> anyhow::Result<Vec<TopologyEdit>> {
    retunes
        .iter()
        .map(|&(index, percent)| -> anyhow::Result<TopologyEdit> {
            let node = config
                .node(index)
                .ok_or_else(|| anyhow!("--retune: no node at index {index}"))?;
            let parent = match (node.kind, node.parent) {
                (NodeKindConfig::Divider, Some(parent)) => parent,
                _ => anyhow::bail!("--retune: node {index} is not a divider"),
            };
            let mut divider = ClockNode::divider(parent, percent);
            if let Some(name) = &node.name {
                divider = divider.named(name.clone());
            }
            Ok(TopologyEdit::Replace {
                index,
                node: divider,
            })
        })
        .collect()
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_topology(args.config.as_deref())?;
    let mut retune = if args.retune.is_empty() {
        None
    } else {
        Some(retune_edits(&config, &args.retune)?)
    };

    let (tree, factory) = build_tree(&config)?;
    let mut scheduler = Scheduler::with_tree(config.scheduler_config(), tree);
    scheduler
        .compile()
        .with_context(|| format!("compiling topology '{}'", config.name))?;

    let frame_rate = u64::from(config.pacing.frame_rate.max(1));
    let telemetry = scheduler.telemetry();
    println!("Running '{}'", config.name);
    println!(
        "  {} ticks/s: {} slots x {}{}",
        format_hz(telemetry.ticks_per_second()),
        telemetry.tape_length,
        telemetry.repeat_count,
        if telemetry.sparse { " (sparse)" } else { "" }
    );
    println!("  {} frames/s{}", frame_rate, if args.unpaced { ", unpaced" } else { "" });
    match args.seconds {
        Some(seconds) => println!("  {seconds} simulated second(s)\n"),
        None => println!("\nPress Ctrl+C to stop...\n"),
    }

    let (handle, join) = if args.unpaced {
        scheduler.spawn_with(ManualPacer::default())?
    } else {
        scheduler.spawn()?
    };

    let stopper = handle.clone();
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        stopper.stop();
    })?;

    let mut reported = 0;
    while !join.is_finished() {
        thread::sleep(POLL);
        let telemetry = handle.telemetry();
        let second = telemetry.frames / frame_rate;

        if second > reported {
            reported = second;
            tracing::info!(
                second,
                tick = telemetry.tick,
                sleep_ms = telemetry.sleep_ms,
                overruns = telemetry.overruns,
                "progress"
            );
        }

        if second >= args.retune_at
            && let Some(edits) = retune.take()
        {
            match handle.reconfigure(edits) {
                Ok(generation) => println!(
                    "Retuned at {} ms: generation {generation}, {} ticks/s",
                    telemetry.elapsed_ms,
                    format_hz(handle.telemetry().ticks_per_second())
                ),
                // The loop has halted with the same error; join reports it.
                Err(err) => tracing::error!("retune rejected: {err}"),
            }
        }

        if args.seconds.is_some_and(|limit| second >= limit) {
            handle.stop();
        }
    }

    let telemetry = join
        .join()
        .map_err(|_| anyhow!("scheduler thread panicked"))?
        .context("scheduler halted")?;

    println!(
        "\nStopped after {} frames ({} ms simulated), generation {}, {} overrun(s)",
        telemetry.frames, telemetry.elapsed_ms, telemetry.generation, telemetry.overruns
    );
    for (index, name, stats) in factory.devices() {
        let faults = stats.faults.load(Ordering::Relaxed);
        let faults = if faults > 0 {
            format!(", {faults} fault(s)")
        } else {
            String::new()
        };
        println!(
            "  [{index:>2}] {name:<12} {} call(s){faults}",
            stats.hits.load(Ordering::Relaxed)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retune() {
        assert_eq!(parse_retune("1=50"), Ok((1, 50)));
        assert_eq!(parse_retune(" 4 = 25% "), Ok((4, 25)));
        assert!(parse_retune("1").is_err());
        assert!(parse_retune("x=5").is_err());
    }

    #[test]
    fn test_retune_edits_require_divider() {
        let config = TopologyConfig::demo();
        let edits = retune_edits(&config, &[(1, 50), (4, 10)]).unwrap();
        assert_eq!(edits.len(), 2);
        assert!(matches!(edits[0], TopologyEdit::Replace { index: 1, .. }));

        assert!(retune_edits(&config, &[(2, 50)]).is_err());
        assert!(retune_edits(&config, &[(9, 50)]).is_err());
    }
}
