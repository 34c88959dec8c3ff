//! Topology file format and operations.

use std::path::Path;

use quartz_core::{ClockNode, ClockTree, Leaf, NodeIndex, SchedulerConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::node::{NodeConfig, NodeKindConfig};
use crate::settings::{CompileSection, PacingSection};
use crate::validation::{ValidationError, ValidationResult, validate_topology};

/// A clock tree stored as TOML.
///
/// # TOML Format
///
/// ```toml
/// name = "stm-like"
/// description = "70/30 bus split"
///
/// [pacing]
/// frame_rate = 60
///
/// [compile]
/// skip_index = true
///
/// [[nodes]]
/// index = 0
/// kind = "master"
/// frequency = 100
///
/// [[nodes]]
/// index = 1
/// kind = "divider"
/// parent = 0
/// percent = 70
///
/// [[nodes]]
/// index = 2
/// kind = "leaf"
/// parent = 1
/// device = "cpu"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyConfig {
    /// Name of the topology.
    pub name: String,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Frame pacing.
    #[serde(default)]
    pub pacing: PacingSection,

    /// Schedule compilation.
    #[serde(default)]
    pub compile: CompileSection,

    /// Clock nodes, in any order.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl TopologyConfig {
    /// Create an empty topology.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            pacing: PacingSection::default(),
            compile: CompileSection::default(),
            nodes: Vec::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the pacing section.
    pub fn with_pacing(mut self, pacing: PacingSection) -> Self {
        self.pacing = pacing;
        self
    }

    /// Set the compile section.
    pub fn with_compile(mut self, compile: CompileSection) -> Self {
        self.compile = compile;
        self
    }

    /// Add a node.
    pub fn with_node(mut self, node: NodeConfig) -> Self {
        self.nodes.push(node);
        self
    }

    /// Bundled demo: a 1 kHz oscillator split 70/30 between a CPU bus
    /// (CPU and timer) and a peripheral bus (UART).
    pub fn demo() -> Self {
        Self::new("demo")
            .with_description("1 kHz oscillator, 70/30 bus split")
            .with_node(NodeConfig::master(1_000).with_name("osc"))
            .with_node(NodeConfig::divider(1, 0, 70).with_name("ahb"))
            .with_node(NodeConfig::leaf(2, 1, "cpu").with_name("cpu"))
            .with_node(NodeConfig::leaf(3, 1, "counter").with_name("timer"))
            .with_node(NodeConfig::divider(4, 0, 30).with_name("apb"))
            .with_node(NodeConfig::leaf(5, 4, "counter").with_name("uart"))
    }

    /// Load a topology from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        let config: TopologyConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load a topology from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the topology to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the topology to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check indices, keys and pacing. See [`validate_topology`].
    pub fn validate(&self) -> ValidationResult<()> {
        validate_topology(self)
    }

    /// Node at `index`, if any.
    pub fn node(&self, index: usize) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.index == index)
    }

    /// `(index, device)` of every leaf.
    pub fn leaf_devices(&self) -> impl Iterator<Item = (usize, &str)> {
        self.nodes
            .iter()
            .filter(|n| n.kind == NodeKindConfig::Leaf)
            .filter_map(|n| n.device.as_deref().map(|d| (n.index, d)))
    }

    /// Scheduler settings from the `[pacing]` and `[compile]` sections.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            pacing: self.pacing.into(),
            compile: self.compile.into(),
        }
    }

    /// Validate and turn every entry into a [`ClockNode`], in index order.
    ///
    /// `factory` is called once per leaf and returns the device to drive;
    /// it should answer unknown device names with
    /// [`ConfigError::UnknownDevice`].
    pub fn build<F>(&self, mut factory: F) -> Result<Vec<(NodeIndex, ClockNode)>, ConfigError>
    where
        F: FnMut(&NodeConfig) -> Result<Box<dyn Leaf>, ConfigError>,
    {
        self.validate()?;

        let mut entries: Vec<&NodeConfig> = self.nodes.iter().collect();
        entries.sort_by_key(|n| n.index);

        let mut built = Vec::with_capacity(entries.len());
        for entry in entries {
            let node = match entry.kind {
                NodeKindConfig::Master => {
                    ClockNode::master(required(entry, "frequency", entry.frequency)?)
                }
                NodeKindConfig::Divider => ClockNode::divider(
                    required(entry, "parent", entry.parent)?,
                    required(entry, "percent", entry.percent)?,
                ),
                NodeKindConfig::Leaf => {
                    let parent = required(entry, "parent", entry.parent)?;
                    ClockNode::leaf_boxed(parent, factory(entry)?)
                }
            };
            let node = match &entry.name {
                Some(name) => node.named(name.clone()),
                None => node,
            };
            built.push((entry.index, node));
        }
        Ok(built)
    }

    /// Build a [`ClockTree`] holding every node.
    pub fn build_tree<F>(&self, factory: F) -> Result<ClockTree, ConfigError>
    where
        F: FnMut(&NodeConfig) -> Result<Box<dyn Leaf>, ConfigError>,
    {
        let mut tree = ClockTree::new();
        for (index, node) in self.build(factory)? {
            tree.add_node(index, node)?;
        }
        Ok(tree)
    }
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

fn required<T>(node: &NodeConfig, field: &'static str, value: Option<T>) -> Result<T, ConfigError> {
    value.ok_or_else(|| {
        ValidationError::MissingField {
            index: node.index,
            kind: node.kind.as_str(),
            field,
        }
        .into()
    })
}
