//! Viewport paging.
//!
//! Turns camera movement into chunk create/remove instructions. The pager owns
//! the loaded rectangle; chunks are rebuilt only where the loaded rectangle
//! changed, everything still inside it is reused.

use crate::coords::{GridPos, GridRect};
use crate::geometry::{grow_to_boundary, shrink_to_boundary, split_remainder};

/// Changes from moving the loaded rectangle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PagerDelta {
  /// New chunk rectangles to materialize.
  pub create: Vec<GridRect>,
  /// Origins of chunks that left the loaded rectangle.
  pub remove: Vec<GridPos>,
}

impl PagerDelta {
  /// Returns an empty delta (no changes).
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.create.is_empty() && self.remove.is_empty()
  }
}

/// Tracks the materialized rectangle as the visible rectangle moves.
#[derive(Clone, Debug)]
pub struct ViewportPager {
  loaded: GridRect,
  quantum: i32,
}

impl ViewportPager {
  /// Creates a pager with nothing loaded. The loaded rectangle starts empty at
  /// the origin so every later edge stays on the quantum lattice.
  pub fn new(quantum: i32) -> Self {
    Self {
      loaded: GridRect::EMPTY,
      quantum: quantum.max(1),
    }
  }

  pub fn loaded_rect(&self) -> GridRect {
    self.loaded
  }

  pub fn quantum(&self) -> i32 {
    self.quantum
  }

  /// Forgets the loaded rectangle, as if nothing had been materialized.
  pub fn reset(&mut self) {
    self.loaded = GridRect::EMPTY;
  }

  /// Rectangle that should be loaded for `visible`, or `None` when nothing
  /// would change.
  fn target(&self, visible: GridRect, world_bounds: GridRect) -> Option<GridRect> {
    if visible.is_empty() {
      return None;
    }
    let shrunk = shrink_to_boundary(self.loaded, visible, self.quantum);
    let grown = grow_to_boundary(shrunk, visible, self.quantum);
    let target = grown.clip(&world_bounds);
    (!target.is_empty() && target != self.loaded).then_some(target)
  }

  /// Returns true if [`recompute`](Self::recompute) would produce changes.
  pub fn is_dirty(&self, visible: GridRect, world_bounds: GridRect) -> bool {
    self.target(visible, world_bounds).is_some()
  }

  /// Moves the loaded rectangle to cover `visible` and returns the chunk
  /// changes needed to keep `chunk_rects` tiling it.
  ///
  /// `chunk_rects` are the rectangles of the currently live chunks.
  pub fn recompute(
    &mut self,
    visible: GridRect,
    world_bounds: GridRect,
    chunk_rects: impl IntoIterator<Item = GridRect>,
  ) -> PagerDelta {
    let Some(target) = self.target(visible, world_bounds) else {
      return PagerDelta::empty();
    };

    let reused = self.loaded.clip(&target);
    let remove = chunk_rects
      .into_iter()
      .filter(|rect| !target.contains_rect(rect))
      .map(|rect| rect.origin())
      .collect();
    let create = split_remainder(target, reused, self.quantum);

    self.loaded = target;
    PagerDelta { create, remove }
  }
}
