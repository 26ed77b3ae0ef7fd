//! Error types, one enum per layer.

use std::path::PathBuf;

use thiserror::Error;

use crate::coords::GridPos;

/// Failure to bring up a world model. The caller may retry.
#[derive(Debug, Error)]
pub enum InitError {
  #[error("keyframe {path:?} could not be read: {source}")]
  KeyframeMissing {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("keyframe {path:?} is malformed: {source}")]
  KeyframeMalformed {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
  #[error("keyframe dimensions {width}x{height} are out of range")]
  BadDimensions { width: i32, height: i32 },
  #[error("a {width}x{height} grid exceeds {max} cells")]
  GridTooLarge { width: i32, height: i32, max: i64 },
  #[error("keyframe cell {pos:?} lies outside the {width}x{height} grid")]
  CellOutOfBounds {
    pos: GridPos,
    width: i32,
    height: i32,
  },
  #[error("keyframe places two entities at {0:?}")]
  DuplicateCell(GridPos),
  #[error("failed to spawn log reader: {0}")]
  Spawn(#[from] std::io::Error),
}

/// The log disagrees with the grid. The rest of the batch is discarded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CorruptionError {
  #[error("position {0:?} is outside the grid")]
  OutOfBounds(GridPos),
  #[error("cell {0:?} is already occupied")]
  Occupied(GridPos),
  #[error("cell {0:?} holds no entity")]
  Vacant(GridPos),
  #[error("move at {pos:?} expected entity {expected}, found {found}")]
  IdMismatch {
    pos: GridPos,
    expected: u64,
    found: u64,
  },
}

/// Misuse of the log reader's handoff protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ReaderError {
  #[error("log reader is busy loading")]
  Busy,
  #[error("log reader has stopped")]
  Stopped,
}

/// Why a tick was abandoned.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TickError {
  #[error("log corruption: {0}")]
  Corruption(#[from] CorruptionError),
  #[error("reader: {0}")]
  Reader(#[from] ReaderError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path:?}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
}
