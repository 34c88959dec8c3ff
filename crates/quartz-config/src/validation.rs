//! Topology file validation.
//!
//! Catches what can be judged from the file alone: duplicate or out-of-range
//! indices, keys that do not match the node kind, master placement and zero
//! pacing rates. Whether the parent links form a tree that resolves to
//! non-zero frequencies is decided by `quartz-core` when the tree is built and
//! compiled.
//!
//! # Example
//!
//! ```rust
//! use quartz_config::{NodeConfig, TopologyConfig, ValidationError, validate_topology};
//!
//! let config = TopologyConfig::new("bad")
//!     .with_node(NodeConfig::master(100))
//!     .with_node(NodeConfig::divider(0, 0, 50));
//!
//! // Index 0 is taken twice, and by a divider.
//! assert!(matches!(
//!     validate_topology(&config),
//!     Err(ValidationError::Multiple(errors)) if errors.len() == 2
//! ));
//! ```

use quartz_core::{MASTER_INDEX, MAX_NODES};
use thiserror::Error;

use crate::node::{NodeConfig, NodeKindConfig};
use crate::settings::PacingSection;
use crate::topology::TopologyConfig;

/// Validation error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two nodes claim the same index.
    #[error("node index {index} used more than once")]
    DuplicateIndex {
        /// Repeated index.
        index: usize,
    },

    /// Index outside the 32-slot tree.
    #[error("node index {index} out of range (max {max})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Exclusive upper bound.
        max: usize,
    },

    /// A key the node kind needs is absent.
    #[error("{kind} node {index} is missing '{field}'")]
    MissingField {
        /// Node index.
        index: usize,
        /// Node kind.
        kind: &'static str,
        /// Missing key.
        field: &'static str,
    },

    /// A key that belongs to another node kind.
    #[error("{kind} node {index} does not take '{field}'")]
    UnexpectedField {
        /// Node index.
        index: usize,
        /// Node kind.
        kind: &'static str,
        /// Offending key.
        field: &'static str,
    },

    /// Master somewhere other than index 0, or a non-master at index 0.
    #[error("index 0 must hold the master and only the master (node {index})")]
    MasterPlacement {
        /// Offending node index.
        index: usize,
    },

    /// A pacing rate that must be positive is zero.
    #[error("pacing '{field}' must be greater than zero")]
    ZeroPacing {
        /// Offending key.
        field: &'static str,
    },

    /// Multiple validation errors.
    #[error("multiple validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a pacing section.
pub fn validate_pacing(pacing: &PacingSection) -> ValidationResult<()> {
    let mut errors = Vec::new();
    if pacing.frame_rate == 0 {
        errors.push(ValidationError::ZeroPacing {
            field: "frame_rate",
        });
    }
    if pacing.sync_per_second == 0 {
        errors.push(ValidationError::ZeroPacing {
            field: "sync_per_second",
        });
    }
    if pacing.drift_window_secs == 0 {
        errors.push(ValidationError::ZeroPacing {
            field: "drift_window_secs",
        });
    }
    collect(errors)
}

/// Validate one node's index and keys.
pub fn validate_node(node: &NodeConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    let kind = node.kind.as_str();
    let index = node.index;

    if index >= MAX_NODES {
        errors.push(ValidationError::IndexOutOfRange {
            index,
            max: MAX_NODES,
        });
    }
    if (node.kind == NodeKindConfig::Master) != (index == MASTER_INDEX) {
        errors.push(ValidationError::MasterPlacement { index });
    }

    let fields: [(&'static str, bool); 4] = [
        ("frequency", node.frequency.is_some()),
        ("parent", node.parent.is_some()),
        ("percent", node.percent.is_some()),
        ("device", node.device.is_some()),
    ];
    let required: &[&str] = match node.kind {
        NodeKindConfig::Master => &["frequency"],
        NodeKindConfig::Divider => &["parent", "percent"],
        NodeKindConfig::Leaf => &["parent", "device"],
    };
    for (field, present) in fields {
        let wanted = required.contains(&field);
        if wanted && !present {
            errors.push(ValidationError::MissingField { index, kind, field });
        } else if !wanted && present {
            errors.push(ValidationError::UnexpectedField { index, kind, field });
        }
    }

    collect(errors)
}

/// Validate a whole topology file.
pub fn validate_topology(config: &TopologyConfig) -> ValidationResult<()> {
    let mut errors = Vec::new();
    if let Err(e) = validate_pacing(&config.pacing) {
        flatten(e, &mut errors);
    }

    let mut seen = 0u64;
    for node in &config.nodes {
        if let Err(e) = validate_node(node) {
            flatten(e, &mut errors);
        }
        if node.index < 64 {
            let bit = 1u64 << node.index;
            if seen & bit != 0 {
                errors.push(ValidationError::DuplicateIndex { index: node.index });
            }
            seen |= bit;
        }
    }

    collect(errors)
}

fn flatten(error: ValidationError, into: &mut Vec<ValidationError>) {
    match error {
        ValidationError::Multiple(inner) => into.extend(inner),
        other => into.push(other),
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}
