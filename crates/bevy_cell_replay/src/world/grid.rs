//! Dense cell storage.

use crate::color::CellColor;
use crate::coords::{GridPos, GridRect};
use crate::error::CorruptionError;

/// An entity occupying exactly one cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellEntity {
  /// Immutable after creation. Not unique: see [`AMBIENT_ID`](crate::format::AMBIENT_ID).
  pub id: u64,
  pub color: CellColor,
  /// Tick that last mutated this entity. Keyframe entities start at 0.
  pub last_touched: u64,
}

/// One grid position, holding at most one entity.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Cell {
  entity: Option<CellEntity>,
}

impl Cell {
  #[inline]
  pub fn entity(&self) -> Option<&CellEntity> {
    self.entity.as_ref()
  }

  #[inline]
  pub fn is_occupied(&self) -> bool {
    self.entity.is_some()
  }
}

/// Row-major grid of cells with `(0, 0)` at the bottom-left.
#[derive(Clone, Debug)]
pub struct Grid {
  width: i32,
  height: i32,
  cells: Vec<Cell>,
  occupied: usize,
}

impl Grid {
  /// Creates an empty grid. Negative dimensions are treated as zero.
  pub fn new(width: i32, height: i32) -> Self {
    let width = width.max(0);
    let height = height.max(0);
    Self {
      width,
      height,
      cells: vec![Cell::default(); width as usize * height as usize],
      occupied: 0,
    }
  }

  pub fn width(&self) -> i32 {
    self.width
  }

  pub fn height(&self) -> i32 {
    self.height
  }

  /// The rectangle covered by the grid.
  pub fn bounds(&self) -> GridRect {
    GridRect::sized(self.width, self.height)
  }

  /// Number of occupied cells.
  pub fn entity_count(&self) -> usize {
    self.occupied
  }

  #[inline]
  fn index(&self, pos: GridPos) -> Result<usize, CorruptionError> {
    if !self.bounds().contains(pos) {
      return Err(CorruptionError::OutOfBounds(pos));
    }
    Ok(pos.y as usize * self.width as usize + pos.x as usize)
  }

  pub fn cell(&self, pos: GridPos) -> Result<&Cell, CorruptionError> {
    let i = self.index(pos)?;
    Ok(&self.cells[i])
  }

  pub fn entity(&self, pos: GridPos) -> Result<Option<&CellEntity>, CorruptionError> {
    Ok(self.cell(pos)?.entity())
  }

  pub(crate) fn entity_mut(
    &mut self,
    pos: GridPos,
  ) -> Result<Option<&mut CellEntity>, CorruptionError> {
    let i = self.index(pos)?;
    Ok(self.cells[i].entity.as_mut())
  }

  /// Puts a new entity into an empty cell.
  pub(crate) fn place(&mut self, pos: GridPos, entity: CellEntity) -> Result<(), CorruptionError> {
    let i = self.index(pos)?;
    let slot = &mut self.cells[i].entity;
    if slot.is_some() {
      return Err(CorruptionError::Occupied(pos));
    }
    *slot = Some(entity);
    self.occupied += 1;
    Ok(())
  }

  /// Removes and returns the entity at `pos`, if any.
  pub(crate) fn take(&mut self, pos: GridPos) -> Result<Option<CellEntity>, CorruptionError> {
    let i = self.index(pos)?;
    let taken = self.cells[i].entity.take();
    if taken.is_some() {
      self.occupied -= 1;
    }
    Ok(taken)
  }

  /// Transfers the entity at `from` into the empty cell `to`.
  ///
  /// Leaves the grid unchanged on error.
  pub(crate) fn relocate(
    &mut self,
    from: GridPos,
    to: GridPos,
  ) -> Result<&mut CellEntity, CorruptionError> {
    let src = self.index(from)?;
    let dst = self.index(to)?;
    if self.cells[dst].entity.is_some() {
      return Err(CorruptionError::Occupied(to));
    }
    let Some(entity) = self.cells[src].entity.take() else {
      return Err(CorruptionError::Vacant(from));
    };
    Ok(self.cells[dst].entity.insert(entity))
  }

  /// Occupied cells inside `rect`, clipped to the grid, in row-major order.
  pub fn occupied_in(&self, rect: GridRect) -> impl Iterator<Item = (GridPos, &CellEntity)> + '_ {
    let rect = rect.clip(&self.bounds());
    rect.positions().filter_map(move |pos| {
      let i = pos.y as usize * self.width as usize + pos.x as usize;
      self.cells[i].entity().map(|e| (pos, e))
    })
  }

  /// Raw row-major storage, for parallel scans.
  pub fn cells(&self) -> &[Cell] {
    &self.cells
  }
}
