//! Demo topology writer.

use std::path::PathBuf;

use clap::Args;
use quartz_config::TopologyConfig;

#[derive(Args)]
pub struct InitArgs {
    /// Output file
    #[arg(default_value = "topology.toml")]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,
}

pub fn run(args: InitArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            args.output.display()
        );
    }
    TopologyConfig::demo().save(&args.output)?;
    println!("Wrote demo topology to {}", args.output.display());
    Ok(())
}
