//! Cell Replay - streaming diff-log replay of large cellular worlds for Bevy.
//!
//! A world is a keyframe plus a numbered sequence of JSON diff logs. This
//! crate replays the logs against a dense grid a bounded number of records
//! per frame, and materializes only the chunks around the camera. Drawing is
//! left to the application, which consumes [`VisualCommand`] and
//! [`ChunkEvent`] messages.
//!
//! # Example
//! ```ignore
//! App::new()
//!   .add_plugins(MinimalPlugins)
//!   .add_plugins(CellReplayPlugin::new(
//!     ReplayConfig::at("/data/run-17").with_records_per_tick(500),
//!   ))
//!   .run();
//! ```

pub mod chunks;
pub mod color;
pub mod config;
pub mod coords;
pub mod error;
pub mod format;
pub mod geometry;
pub mod pager;
pub mod plugin;
pub mod reader;
pub mod world;

#[cfg(any(test, feature = "health-check"))]
pub use chunks::HealthViolation;
pub use chunks::{
  CellRenderer, Chunk, ChunkEvent, ChunkManager, VisualCommand, VisualHandle, VisualQueue,
};
pub use color::{CellColor, decode_packed, encode_packed};
pub use config::{DEFAULT_APP_NAME, ReplayConfig, default_working_folder};
pub use coords::{DEFAULT_QUANTUM, GridPos, GridRect};
pub use error::{ConfigError, CorruptionError, InitError, ReaderError, TickError};
pub use format::{
  AMBIENT_ID, DiffAction, DiffRecord, KEYFRAME_FILE, Keyframe, KeyframeCell, log_path,
  parse_diff_log,
};
pub use geometry::{
  ceil_to_step, checked_ceil_to_step, grow_to_boundary, shrink_to_boundary, split_remainder,
};
pub use pager::{PagerDelta, ViewportPager};
pub use plugin::{
  CellDiffs, CellReplayPlugin, ReplayCamera, ReplayHalted, ReplaySession, ReplayStatus,
  RetryInitialization, VisibleRect,
};
pub use reader::{LogReader, ReaderSettings};
pub use world::{
  AppliedDiff, Cell, CellEntity, DiffKind, Grid, MAX_GRID_CELLS, WorldModel,
};
