//! One `[[nodes]]` entry of a topology file.

use serde::{Deserialize, Serialize};

/// Node kind tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKindConfig {
    /// The oscillator at index 0.
    Master,
    /// Percentage of its parent's frequency.
    Divider,
    /// A device driven by the scheduler.
    Leaf,
}

impl NodeKindConfig {
    /// Lowercase name as written in files.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKindConfig::Master => "master",
            NodeKindConfig::Divider => "divider",
            NodeKindConfig::Leaf => "leaf",
        }
    }
}

/// A clock node as written in a topology file.
///
/// Every kind shares one flat table; which keys are required depends on
/// `kind`:
///
/// | kind      | required              |
/// |-----------|-----------------------|
/// | `master`  | `frequency`           |
/// | `divider` | `parent`, `percent`   |
/// | `leaf`    | `parent`, `device`    |
///
/// Keys that belong to another kind are rejected by validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    /// Slot in the clock tree.
    pub index: usize,

    /// Node kind.
    pub kind: NodeKindConfig,

    /// Optional label shown by `inspect`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Master frequency in Hz.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<u64>,

    /// Parent node index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,

    /// Divider percentage of the parent frequency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<u32>,

    /// Device name resolved by the leaf factory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl NodeConfig {
    fn bare(index: usize, kind: NodeKindConfig) -> Self {
        Self {
            index,
            kind,
            name: None,
            frequency: None,
            parent: None,
            percent: None,
            device: None,
        }
    }

    /// Master oscillator at index 0.
    pub fn master(frequency: u64) -> Self {
        Self {
            frequency: Some(frequency),
            ..Self::bare(0, NodeKindConfig::Master)
        }
    }

    /// Divider at `index` running at `percent` of `parent`.
    pub fn divider(index: usize, parent: usize, percent: u32) -> Self {
        Self {
            parent: Some(parent),
            percent: Some(percent),
            ..Self::bare(index, NodeKindConfig::Divider)
        }
    }

    /// Leaf at `index` driving `device`.
    pub fn leaf(index: usize, parent: usize, device: impl Into<String>) -> Self {
        Self {
            parent: Some(parent),
            device: Some(device.into()),
            ..Self::bare(index, NodeKindConfig::Leaf)
        }
    }

    /// Attach a label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Label, or `<kind><index>` when unnamed.
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}{}", self.kind.as_str(), self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let master = NodeConfig::master(8_000_000);
        assert_eq!(master.index, 0);
        assert_eq!(master.frequency, Some(8_000_000));
        assert!(master.parent.is_none());

        let leaf = NodeConfig::leaf(3, 1, "cpu").with_name("core");
        assert_eq!(leaf.kind, NodeKindConfig::Leaf);
        assert_eq!(leaf.device.as_deref(), Some("cpu"));
        assert_eq!(leaf.display_name(), "core");
        assert_eq!(NodeConfig::divider(2, 0, 50).display_name(), "divider2");
    }

    #[test]
    fn test_toml_shape() {
        let node: NodeConfig = toml::from_str(
            r#"
            index = 1
            kind = "divider"
            parent = 0
            percent = 70
            "#,
        )
        .unwrap();
        assert_eq!(node, NodeConfig::divider(1, 0, 70));

        let text = toml::to_string(&NodeConfig::leaf(2, 1, "uart")).unwrap();
        assert!(text.contains("kind = \"leaf\""));
        assert!(!text.contains("percent"));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = toml::from_str::<NodeConfig>("index = 1\nkind = \"pll\"");
        assert!(err.is_err());
    }
}
