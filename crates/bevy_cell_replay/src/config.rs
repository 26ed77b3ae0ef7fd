//! Replay configuration.
//!
//! Can be built in code with [`ReplayConfig::at`] or loaded from a TOML file:
//!
//! ```toml
//! working_folder = "/data/run-17"
//! records_per_tick = 500
//! quantum = 50
//! remove_consumed_files = false
//! ```

use std::path::{Path, PathBuf};

use bevy::log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::coords::DEFAULT_QUANTUM;
use crate::error::ConfigError;

/// Default application name for the data directory.
pub const DEFAULT_APP_NAME: &str = "cell_replay";

/// Returns the default working folder.
///
/// Uses OS-standard data directories:
/// - Linux: `~/.local/share/<app_name>/replay/`
/// - Windows: `%APPDATA%/<app_name>/replay/`
/// - macOS: `~/Library/Application Support/<app_name>/replay/`
#[cfg(feature = "native")]
pub fn default_working_folder(app_name: &str) -> PathBuf {
  dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(app_name)
    .join("replay")
}

#[cfg(not(feature = "native"))]
pub fn default_working_folder(_app_name: &str) -> PathBuf {
  PathBuf::from(".")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
  /// Folder containing `keyframe.json` and the numbered diff logs.
  pub working_folder: PathBuf,
  /// Upper bound on log records consumed per tick.
  pub records_per_tick: usize,
  /// Chunk edge length in cells. Grid dimensions are rounded up to it.
  pub quantum: i32,
  /// Delete each diff log once it has been read successfully.
  pub remove_consumed_files: bool,
  /// Sequence number of the first diff log to read.
  pub first_log_index: u32,
  /// World units per cell, used to map the camera onto the grid.
  pub cell_size: f32,
  /// Stop ticking after the first corrupted batch.
  pub halt_on_corruption: bool,
  /// Run the chunk/grid consistency check every frame. Only honored with the
  /// `health-check` feature.
  pub health_check: bool,
}

impl Default for ReplayConfig {
  fn default() -> Self {
    Self {
      working_folder: default_working_folder(DEFAULT_APP_NAME),
      records_per_tick: 1,
      quantum: DEFAULT_QUANTUM,
      remove_consumed_files: false,
      first_log_index: 0,
      cell_size: 32.0,
      halt_on_corruption: true,
      health_check: false,
    }
  }
}

impl ReplayConfig {
  /// Creates a config replaying the given folder.
  pub fn at(folder: impl Into<PathBuf>) -> Self {
    Self {
      working_folder: folder.into(),
      ..Default::default()
    }
  }

  pub fn with_records_per_tick(mut self, records: usize) -> Self {
    self.records_per_tick = records;
    self
  }

  /// Sets the chunk quantum. Values below 1 are raised to 1.
  pub fn with_quantum(mut self, quantum: i32) -> Self {
    self.quantum = quantum.max(1);
    self
  }

  pub fn removing_consumed_files(mut self) -> Self {
    self.remove_consumed_files = true;
    self
  }

  /// Resumes the replay from the given diff log.
  pub fn starting_at(mut self, index: u32) -> Self {
    self.first_log_index = index;
    self
  }

  pub fn with_cell_size(mut self, cell_size: f32) -> Self {
    self.cell_size = cell_size;
    self
  }

  /// Keeps ticking after corruption instead of halting.
  pub fn tolerate_corruption(mut self) -> Self {
    self.halt_on_corruption = false;
    self
  }

  pub fn with_health_check(mut self, enabled: bool) -> Self {
    self.health_check = enabled;
    self
  }

  /// Quantum guaranteed to be at least 1.
  pub fn effective_quantum(&self) -> i32 {
    self.quantum.max(1)
  }

  /// Parses a config from TOML text. Missing keys take their defaults.
  pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
    Ok(toml::from_str(contents)?)
  }

  /// Reads a config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml(&contents)
  }

  /// Reads a config file, falling back to defaults when it is absent or broken.
  pub fn load_or_default(path: &Path) -> Self {
    if !path.exists() {
      return Self::default();
    }
    match Self::load(path) {
      Ok(config) => {
        info!("Loaded replay config from {}", path.display());
        config
      }
      Err(e) => {
        warn!("{e}, using defaults");
        Self::default()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_reference_values() {
    let c = ReplayConfig::at("/tmp/run");
    assert_eq!(c.working_folder, PathBuf::from("/tmp/run"));
    assert_eq!(c.records_per_tick, 1);
    assert_eq!(c.quantum, 50);
    assert!(!c.remove_consumed_files);
    assert!(c.halt_on_corruption);
    assert!(!c.health_check);
  }

  #[test]
  fn partial_toml_fills_defaults() {
    let c = ReplayConfig::from_toml("records_per_tick = 64\nremove_consumed_files = true\n").unwrap();
    assert_eq!(c.records_per_tick, 64);
    assert!(c.remove_consumed_files);
    assert_eq!(c.quantum, 50);
    assert_eq!(c.cell_size, 32.0);
  }

  #[test]
  fn broken_file_falls_back_to_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("replay.toml");
    std::fs::write(&path, "records_per_tick = \"many\"").unwrap();

    assert!(matches!(ReplayConfig::load(&path), Err(ConfigError::Parse(_))));
    assert_eq!(ReplayConfig::load_or_default(&path), ReplayConfig::default());
  }

  #[test]
  fn round_trips_through_toml() {
    let c = ReplayConfig::at("/data").with_quantum(25).starting_at(3);
    let text = toml::to_string_pretty(&c).unwrap();
    assert_eq!(ReplayConfig::from_toml(&text).unwrap(), c);
  }

  #[test]
  fn quantum_never_drops_below_one() {
    assert_eq!(ReplayConfig::default().with_quantum(0).quantum, 1);
    let raw = ReplayConfig {
      quantum: -4,
      ..Default::default()
    };
    assert_eq!(raw.effective_quantum(), 1);
  }
}
