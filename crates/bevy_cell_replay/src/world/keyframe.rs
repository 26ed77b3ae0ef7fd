//! Builds the initial grid from `keyframe.json`.

use std::path::Path;

use crate::error::InitError;
use crate::format::{KEYFRAME_FILE, Keyframe};
use crate::geometry::checked_ceil_to_step;
use crate::world::grid::{CellEntity, Grid};

/// Largest grid a keyframe may ask for, in cells.
pub const MAX_GRID_CELLS: i64 = 1 << 26;

/// Reads the keyframe in `folder` and fills a new grid with its cells.
///
/// Dimensions are rounded up to a multiple of `quantum`.
pub fn load_keyframe(folder: &Path, quantum: i32) -> Result<Grid, InitError> {
  let path = folder.join(KEYFRAME_FILE);
  let bytes = std::fs::read(&path).map_err(|source| InitError::KeyframeMissing {
    path: path.clone(),
    source,
  })?;
  let keyframe =
    Keyframe::parse(&bytes).map_err(|source| InitError::KeyframeMalformed { path, source })?;
  grid_from_keyframe(&keyframe, quantum)
}

pub fn grid_from_keyframe(keyframe: &Keyframe, quantum: i32) -> Result<Grid, InitError> {
  let bad = InitError::BadDimensions {
    width: keyframe.width,
    height: keyframe.height,
  };
  if keyframe.width <= 0 || keyframe.height <= 0 {
    return Err(bad);
  }
  let (Some(width), Some(height)) = (
    checked_ceil_to_step(keyframe.width, quantum),
    checked_ceil_to_step(keyframe.height, quantum),
  ) else {
    return Err(bad);
  };
  if width as i64 * height as i64 > MAX_GRID_CELLS {
    return Err(InitError::GridTooLarge {
      width,
      height,
      max: MAX_GRID_CELLS,
    });
  }

  let mut grid = Grid::new(width, height);

  for cell in &keyframe.cells {
    if !grid.bounds().contains(cell.pos) {
      return Err(InitError::CellOutOfBounds {
        pos: cell.pos,
        width,
        height,
      });
    }
    let entity = CellEntity {
      id: cell.id,
      color: cell.color,
      last_touched: 0,
    };
    grid
      .place(cell.pos, entity)
      .map_err(|_| InitError::DuplicateCell(cell.pos))?;
  }

  Ok(grid)
}
