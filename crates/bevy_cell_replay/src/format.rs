//! On-disk formats: the keyframe and the numbered diff logs.
//!
//! Both are JSON. Coordinates on disk are 1-indexed and are converted to
//! [`GridPos`] here, so nothing downstream ever sees wire coordinates.
//!
//! ```text
//! keyframe.json   { "width": W, "height": H, "region": [{ "x", "y", "c", "id"? }] }
//! 0000.json       [{ "sx", "sy", "dx", "dy", "a", "id", "c" }, ...]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::color::{CellColor, decode_packed};
use crate::coords::GridPos;

/// File name of the initial world snapshot.
pub const KEYFRAME_FILE: &str = "keyframe.json";

/// Entity id shared by every ambient cell.
pub const AMBIENT_ID: u64 = 0;

/// Returns the path of the diff log with the given sequence number.
pub fn log_path(folder: &Path, index: u32) -> PathBuf {
  folder.join(format!("{index:04}.json"))
}

/// Mutation kind stored in a diff log.
///
/// `"remove"` is accepted as a spelling of delete. Any other unknown action
/// makes the whole file unparsable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAction {
  Add,
  Move,
  #[serde(alias = "remove")]
  Delete,
  Paint,
}

/// One mutation record, already converted to 0-indexed coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiffRecord {
  pub action: DiffAction,
  pub source: GridPos,
  pub dest: GridPos,
  pub id: u64,
  pub color: CellColor,
}

#[derive(Deserialize)]
struct WireDiff {
  sx: i32,
  sy: i32,
  dx: i32,
  dy: i32,
  a: DiffAction,
  #[serde(default)]
  id: u64,
  #[serde(default)]
  c: u32,
}

impl From<WireDiff> for DiffRecord {
  fn from(w: WireDiff) -> Self {
    Self {
      action: w.a,
      source: GridPos::from_one_based(w.sx, w.sy),
      dest: GridPos::from_one_based(w.dx, w.dy),
      id: w.id,
      color: decode_packed(w.c),
    }
  }
}

/// Parses the contents of one diff log.
pub fn parse_diff_log(bytes: &[u8]) -> Result<Vec<DiffRecord>, serde_json::Error> {
  let wire: Vec<WireDiff> = serde_json::from_slice(bytes)?;
  Ok(wire.into_iter().map(DiffRecord::from).collect())
}

/// Occupied cell in a keyframe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyframeCell {
  pub pos: GridPos,
  pub id: u64,
  pub color: CellColor,
}

#[derive(Deserialize)]
struct WireCell {
  x: i32,
  y: i32,
  c: u32,
  id: Option<u64>,
}

#[derive(Deserialize)]
struct WireKeyframe {
  width: i32,
  height: i32,
  #[serde(default)]
  region: Vec<WireCell>,
}

/// Sparse snapshot of the world at sequence start.
#[derive(Clone, Debug, PartialEq)]
pub struct Keyframe {
  /// Width as stored on disk, before quantum rounding.
  pub width: i32,
  /// Height as stored on disk, before quantum rounding.
  pub height: i32,
  pub cells: Vec<KeyframeCell>,
}

impl Keyframe {
  /// Parses a keyframe. Cells without an explicit id are numbered from 1 in
  /// file order.
  pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
    let wire: WireKeyframe = serde_json::from_slice(bytes)?;
    let cells = wire
      .region
      .into_iter()
      .enumerate()
      .map(|(i, c)| KeyframeCell {
        pos: GridPos::from_one_based(c.x, c.y),
        id: c.id.unwrap_or(i as u64 + 1),
        color: decode_packed(c.c),
      })
      .collect();

    Ok(Self {
      width: wire.width,
      height: wire.height,
      cells,
    })
  }
}
