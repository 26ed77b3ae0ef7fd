use crate::color::CellColor;
use crate::coords::{GridPos, GridRect};

/// What an applied mutation did to the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiffKind {
  Add,
  Move,
  Delete,
  Paint,
}

/// A mutation the world model applied, as seen by presentation.
///
/// `source == dest` for everything but [`DiffKind::Move`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AppliedDiff {
  pub kind: DiffKind,
  pub entity_id: u64,
  pub color: CellColor,
  pub source: GridPos,
  pub dest: GridPos,
}

impl AppliedDiff {
  /// Returns true if either end of the mutation lies inside `rect`.
  pub fn touches(&self, rect: &GridRect) -> bool {
    rect.contains(self.source) || rect.contains(self.dest)
  }
}
