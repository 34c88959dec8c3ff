//! Topology files for the quartz peripheral clock scheduler.
//!
//! A topology file describes one clock tree (master oscillator, dividers and
//! leaf devices) together with the pacing and compilation settings to run it
//! with. This crate loads, validates and saves those files and turns them into
//! `quartz-core` nodes, leaving the choice of leaf devices to the caller.
//!
//! # Features
//!
//! - **Topology files**: Load and save TOML clock trees
//! - **Validation**: Duplicate indices, kind/key mismatches, master placement
//! - **Building**: Nodes and trees through a caller-supplied leaf factory
//!
//! # Example
//!
//! ```rust
//! use quartz_config::{ConfigError, NodeConfig, TopologyConfig};
//! use quartz_core::{Leaf, leaf_fn};
//!
//! let config = TopologyConfig::new("minimal")
//!     .with_node(NodeConfig::master(1_000))
//!     .with_node(NodeConfig::leaf(1, 0, "cpu"));
//!
//! let tree = config
//!     .build_tree(|node| match node.device.as_deref() {
//!         Some("cpu") => Ok(Box::new(leaf_fn(|| {})) as Box<dyn Leaf>),
//!         _ => Err(ConfigError::unknown_device(node.index, "?")),
//!     })
//!     .unwrap();
//! assert_eq!(tree.len(), 2);
//! ```

mod error;
mod node;
mod settings;
mod topology;

/// Topology file validation.
pub mod validation;

pub use error::ConfigError;
pub use node::{NodeConfig, NodeKindConfig};
pub use settings::{CompileSection, PacingSection};
pub use topology::TopologyConfig;
pub use validation::{
    ValidationError, ValidationResult, validate_node, validate_pacing, validate_topology,
};
