//! `[pacing]` and `[compile]` sections of a topology file.

use quartz_core::{CompileOptions, DEFAULT_MAX_TAPE_LENGTH, PacingConfig, SparseMode};
use serde::{Deserialize, Serialize};

/// Frame pacing settings. Missing keys take the scheduler defaults.
///
/// ```toml
/// [pacing]
/// frame_rate = 60
/// sync_per_second = 5
/// drift_window_secs = 5
/// pause_poll_ms = 100
/// min_sleep_ms = 1
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingSection {
    /// Frames per simulated second.
    pub frame_rate: u32,
    /// Wall-clock samples per second used for drift correction.
    pub sync_per_second: u32,
    /// Drift measurement window in seconds.
    pub drift_window_secs: u32,
    /// Poll interval while paused, in milliseconds.
    pub pause_poll_ms: u64,
    /// Floor for the adaptive per-frame sleep, in milliseconds.
    pub min_sleep_ms: u64,
}

impl Default for PacingSection {
    fn default() -> Self {
        PacingConfig::default().into()
    }
}

impl From<PacingConfig> for PacingSection {
    fn from(config: PacingConfig) -> Self {
        Self {
            frame_rate: config.frame_rate,
            sync_per_second: config.sync_per_second,
            drift_window_secs: config.drift_window_secs,
            pause_poll_ms: config.pause_poll_ms,
            min_sleep_ms: config.min_sleep_ms,
        }
    }
}

impl From<PacingSection> for PacingConfig {
    fn from(section: PacingSection) -> Self {
        Self {
            frame_rate: section.frame_rate,
            sync_per_second: section.sync_per_second,
            drift_window_secs: section.drift_window_secs,
            pause_poll_ms: section.pause_poll_ms,
            min_sleep_ms: section.min_sleep_ms,
        }
    }
}

/// Schedule compilation settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompileSection {
    /// Longest tape, in slots, the compiler may allocate.
    pub max_tape_length: usize,
    /// Build a skip index for sparse tapes.
    pub skip_index: bool,
}

impl Default for CompileSection {
    fn default() -> Self {
        Self {
            max_tape_length: DEFAULT_MAX_TAPE_LENGTH,
            skip_index: true,
        }
    }
}

impl From<CompileSection> for CompileOptions {
    fn from(section: CompileSection) -> Self {
        Self {
            max_tape_length: section.max_tape_length,
            sparse: if section.skip_index {
                SparseMode::Auto
            } else {
                SparseMode::Never
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing_defaults_match_scheduler() {
        let section = PacingSection::default();
        assert_eq!(PacingConfig::from(section), PacingConfig::default());
        assert_eq!(section.frame_rate, 60);
    }

    #[test]
    fn test_partial_section_fills_defaults() {
        let section: PacingSection = toml::from_str("frame_rate = 50").unwrap();
        assert_eq!(section.frame_rate, 50);
        assert_eq!(section.sync_per_second, 5);
        assert_eq!(section.min_sleep_ms, 1);
    }

    #[test]
    fn test_compile_section() {
        let options: CompileOptions = CompileSection {
            max_tape_length: 4096,
            skip_index: false,
        }
        .into();
        assert_eq!(options.max_tape_length, 4096);
        assert_eq!(options.sparse, SparseMode::Never);
        assert_eq!(
            CompileOptions::from(CompileSection::default()),
            CompileOptions::default()
        );
    }
}
