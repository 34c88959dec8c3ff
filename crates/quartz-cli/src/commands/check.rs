//! Topology validation command.

use std::path::PathBuf;

use clap::Args;

use super::common::{compile_topology, format_hz, load_topology};

#[derive(Args)]
pub struct CheckArgs {
    /// Topology files (TOML)
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let mut failed = 0;
    for path in &args.files {
        let result = load_topology(Some(path.as_path()))
            .and_then(|config| compile_topology(&config).map(|c| (config, c)));
        match result {
            Ok((config, (_, schedule))) => println!(
                "ok    {}  '{}': {} nodes, {} slots x {} ({})",
                path.display(),
                config.name,
                config.nodes.len(),
                schedule.tape_length(),
                schedule.repeat_count(),
                format_hz(schedule.ticks_per_second())
            ),
            Err(err) => {
                failed += 1;
                println!("FAIL  {}  {err:#}", path.display());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} topology file(s) invalid", args.files.len());
    }
    Ok(())
}
