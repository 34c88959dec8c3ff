//! Shared helpers for topology-loading commands.

use std::path::Path;

use anyhow::Context;
use quartz_config::TopologyConfig;
use quartz_core::{ClockTree, CompiledSchedule, compile};

use crate::devices::DeviceFactory;

/// Load `path`, or the bundled demo when no path is given.
pub fn load_topology(path: Option<&Path>) -> anyhow::Result<TopologyConfig> {
    match path {
        Some(path) => TopologyConfig::load(path)
            .with_context(|| format!("loading topology {}", path.display())),
        None => Ok(TopologyConfig::demo()),
    }
}

/// Validate, instantiate demo devices and build the tree.
pub fn build_tree(config: &TopologyConfig) -> anyhow::Result<(ClockTree, DeviceFactory)> {
    let mut factory = DeviceFactory::new();
    let tree = config
        .build_tree(|node| factory.create(node))
        .with_context(|| format!("building topology '{}'", config.name))?;
    Ok((tree, factory))
}

/// Build and compile, for commands that never run the tree.
pub fn compile_topology(config: &TopologyConfig) -> anyhow::Result<(ClockTree, CompiledSchedule)> {
    let (tree, _) = build_tree(config)?;
    let schedule = compile(&tree, &config.scheduler_config().compile)
        .with_context(|| format!("compiling topology '{}'", config.name))?;
    Ok((tree, schedule))
}

/// `1.5 kHz`-style frequency.
pub fn format_hz(hz: u64) -> String {
    match hz {
        0..1_000 => format!("{hz} Hz"),
        1_000..1_000_000 => format!("{} kHz", trim(hz as f64 / 1e3)),
        _ => format!("{} MHz", trim(hz as f64 / 1e6)),
    }
}

fn trim(value: f64) -> String {
    let text = format!("{value:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hz() {
        assert_eq!(format_hz(70), "70 Hz");
        assert_eq!(format_hz(21_000), "21 kHz");
        assert_eq!(format_hz(1_500), "1.5 kHz");
        assert_eq!(format_hz(8_000_000), "8 MHz");
    }

    #[test]
    fn test_demo_compiles() {
        let config = load_topology(None).unwrap();
        let (tree, schedule) = compile_topology(&config).unwrap();
        assert_eq!(tree.len(), 6);
        assert_eq!(schedule.tape_length(), 210);
    }
}
