//! Error types for configuration operations.

use std::path::PathBuf;

use quartz_core::TopologyError;
use thiserror::Error;

/// Errors that can occur while loading, saving or building a topology file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// Path of the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// Path of the file that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// Path of the directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to serialize TOML
    #[error("failed to serialize TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// The file is well-formed TOML but describes an inconsistent topology.
    #[error("validation failed: {0}")]
    Validation(#[from] crate::validation::ValidationError),

    /// A leaf names a device the leaf factory does not know.
    #[error("unknown device '{device}' for leaf {index}")]
    UnknownDevice {
        /// Leaf node index.
        index: usize,
        /// Device name from the file.
        device: String,
    },

    /// A known device could not be built for a leaf.
    #[error("failed to set up device '{device}' for leaf {index}: {source}")]
    DeviceSetup {
        /// Leaf node index.
        index: usize,
        /// Device name from the file.
        device: String,
        /// What went wrong.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The clock tree rejected a node.
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),
}

impl ConfigError {
    /// Create a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Create a write file error.
    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::WriteFile {
            path: path.into(),
            source,
        }
    }

    /// Create a create directory error.
    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Create an unknown device error.
    pub fn unknown_device(index: usize, device: impl Into<String>) -> Self {
        ConfigError::UnknownDevice {
            index,
            device: device.into(),
        }
    }

    /// Create a device setup error.
    pub fn device_setup(
        index: usize,
        device: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        ConfigError::DeviceSetup {
            index,
            device: device.into(),
            source: source.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn mock_io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "mock")
    }

    #[test]
    fn read_file_display() {
        let err = ConfigError::read_file("/a/b.toml", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("failed to read file"), "got: {msg}");
        assert!(msg.contains("/a/b.toml"), "got: {msg}");
        assert!(err.source().is_some(), "ReadFile must expose I/O source");
    }

    #[test]
    fn write_file_factory_produces_correct_variant() {
        let err = ConfigError::write_file("/out/path", mock_io_err());
        assert!(
            matches!(err, ConfigError::WriteFile { ref path, .. } if path == std::path::Path::new("/out/path"))
        );
    }

    #[test]
    fn create_dir_source_is_some() {
        let err = ConfigError::create_dir("/x", mock_io_err());
        assert!(err.source().is_some(), "CreateDir must expose I/O source");
    }

    #[test]
    fn unknown_device_display() {
        let err = ConfigError::unknown_device(4, "dma");
        assert_eq!(err.to_string(), "unknown device 'dma' for leaf 4");
        assert!(err.source().is_none());
    }

    #[test]
    fn device_setup_keeps_source() {
        let err = ConfigError::device_setup(1, "cpu", mock_io_err());
        let msg = err.to_string();
        assert!(msg.contains("device 'cpu' for leaf 1"), "got: {msg}");
        assert!(err.source().is_some(), "DeviceSetup must expose its cause");
    }

    #[test]
    fn topology_error_converts() {
        let err: ConfigError = TopologyError::MissingMaster.into();
        assert_eq!(err.to_string(), "invalid topology: clock tree has no master node");
    }
}
