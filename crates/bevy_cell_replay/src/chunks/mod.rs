//! Materialized chunks and the visuals they own.
//!
//! Each live chunk covers one quantum-aligned rectangle of the loaded area and
//! keeps a side table from cell position to visual handle. Grid entities never
//! point at visuals; the chunk is the only owner of a handle, and the entity id
//! stored next to it is a plain back reference.

#[cfg(any(test, feature = "health-check"))]
mod health;
mod renderer;

use std::collections::HashMap;

use bevy::log::warn;
#[cfg(any(test, feature = "health-check"))]
pub use health::HealthViolation;
pub use renderer::{CellRenderer, ChunkEvent, VisualCommand, VisualHandle, VisualQueue};

use crate::coords::{GridPos, GridRect};
use crate::pager::PagerDelta;
use crate::world::{AppliedDiff, DiffKind, Grid};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct VisualRecord {
  handle: VisualHandle,
  entity_id: u64,
}

/// One materialized rectangle of the grid.
#[derive(Debug)]
pub struct Chunk {
  rect: GridRect,
  visuals: HashMap<GridPos, VisualRecord>,
}

impl Chunk {
  pub fn rect(&self) -> GridRect {
    self.rect
  }

  pub fn visual_count(&self) -> usize {
    self.visuals.len()
  }

  pub fn handle_at(&self, pos: GridPos) -> Option<VisualHandle> {
    self.visuals.get(&pos).map(|v| v.handle)
  }

  /// Id of the entity the visual at `pos` was created for.
  pub fn entity_at(&self, pos: GridPos) -> Option<u64> {
    self.visuals.get(&pos).map(|v| v.entity_id)
  }
}

/// Registry of live chunks, keyed by chunk origin.
#[derive(Debug)]
pub struct ChunkManager {
  chunks: HashMap<GridPos, Chunk>,
  quantum: i32,
}

impl ChunkManager {
  /// Creates an empty manager for chunks on a `quantum` lattice.
  pub fn new(quantum: i32) -> Self {
    Self {
      chunks: HashMap::new(),
      quantum: quantum.max(1),
    }
  }

  pub fn chunk_count(&self) -> usize {
    self.chunks.len()
  }

  pub fn chunk(&self, origin: GridPos) -> Option<&Chunk> {
    self.chunks.get(&origin)
  }

  pub fn chunks(&self) -> impl Iterator<Item = &Chunk> + '_ {
    self.chunks.values()
  }

  /// Rectangles of all live chunks.
  pub fn chunk_rects(&self) -> impl Iterator<Item = GridRect> + '_ {
    self.chunks.values().map(|c| c.rect)
  }

  /// Total visuals held across all chunks.
  pub fn visual_count(&self) -> usize {
    self.chunks.values().map(Chunk::visual_count).sum()
  }

  /// Origin of the lattice cell containing `pos`.
  fn lattice_origin(&self, pos: GridPos) -> GridPos {
    let q = self.quantum;
    GridPos::new(pos.x.div_euclid(q) * q, pos.y.div_euclid(q) * q)
  }

  /// Returns the live chunk containing `pos`, if any.
  pub fn chunk_containing(&self, pos: GridPos) -> Option<&Chunk> {
    self
      .chunks
      .get(&self.lattice_origin(pos))
      .filter(|c| c.rect.contains(pos))
  }

  fn chunk_containing_mut(&mut self, pos: GridPos) -> Option<&mut Chunk> {
    let origin = self.lattice_origin(pos);
    self
      .chunks
      .get_mut(&origin)
      .filter(|c| c.rect.contains(pos))
  }

  /// Materializes `rect`, creating a visual for every occupied cell in it.
  pub fn create_chunk(&mut self, rect: GridRect, grid: &Grid, renderer: &mut impl CellRenderer) {
    let origin = rect.origin();
    if self.chunks.contains_key(&origin) {
      warn!("Chunk at {origin:?} already exists, ignoring create");
      return;
    }

    renderer.chunk_created(rect);
    let visuals = grid
      .occupied_in(rect)
      .map(|(pos, entity)| {
        let handle = renderer.create_visual(origin, entity.id, entity.color, pos);
        (
          pos,
          VisualRecord {
            handle,
            entity_id: entity.id,
          },
        )
      })
      .collect();

    self.chunks.insert(origin, Chunk { rect, visuals });
  }

  /// Releases every visual of the chunk at `origin` and forgets the chunk.
  ///
  /// Returns false if no chunk lives there.
  pub fn remove_chunk(&mut self, origin: GridPos, renderer: &mut impl CellRenderer) -> bool {
    let Some(chunk) = self.chunks.remove(&origin) else {
      return false;
    };
    for record in chunk.visuals.values() {
      renderer.release_visual(record.handle);
    }
    renderer.chunk_removed(chunk.rect);
    true
  }

  /// Removes then creates the chunks named by a pager delta.
  pub fn apply_delta(
    &mut self,
    delta: &PagerDelta,
    grid: &Grid,
    renderer: &mut impl CellRenderer,
  ) {
    for origin in &delta.remove {
      if !self.remove_chunk(*origin, renderer) {
        warn!("No chunk at {origin:?} to remove");
      }
    }
    for rect in &delta.create {
      self.create_chunk(*rect, grid, renderer);
    }
  }

  /// Releases every chunk.
  pub fn clear(&mut self, renderer: &mut impl CellRenderer) {
    let origins: Vec<GridPos> = self.chunks.keys().copied().collect();
    for origin in origins {
      self.remove_chunk(origin, renderer);
    }
  }

  /// Keeps visuals in step with mutations the world model just applied.
  ///
  /// Cells outside every live chunk are ignored.
  pub fn apply_diffs(&mut self, diffs: &[AppliedDiff], renderer: &mut impl CellRenderer) {
    for diff in diffs {
      match diff.kind {
        DiffKind::Add => {
          self.release_at(diff.dest, renderer);
          self.spawn_at(diff, diff.dest, renderer);
        }
        DiffKind::Move => {
          let moving = self
            .chunk_containing_mut(diff.source)
            .and_then(|c| c.visuals.remove(&diff.source));
          let dest_origin = self.lattice_origin(diff.dest);
          match (moving, self.chunk_containing_mut(diff.dest)) {
            (Some(record), Some(dest)) => {
              renderer.move_visual(record.handle, dest_origin, diff.dest);
              if let Some(stale) = dest.visuals.insert(diff.dest, record) {
                renderer.release_visual(stale.handle);
              }
            }
            (Some(record), None) => renderer.release_visual(record.handle),
            // Entered the loaded area from outside.
            (None, Some(dest)) => {
              let handle =
                renderer.create_visual(dest_origin, diff.entity_id, diff.color, diff.dest);
              dest.visuals.insert(
                diff.dest,
                VisualRecord {
                  handle,
                  entity_id: diff.entity_id,
                },
              );
            }
            (None, None) => {}
          }
        }
        DiffKind::Delete => self.release_at(diff.source, renderer),
        DiffKind::Paint => {
          let existing = self
            .chunk_containing(diff.source)
            .and_then(|c| c.handle_at(diff.source));
          match existing {
            Some(handle) => renderer.recolor_visual(handle, diff.color),
            None => self.spawn_at(diff, diff.source, renderer),
          }
        }
      }
    }
  }

  fn spawn_at(&mut self, diff: &AppliedDiff, pos: GridPos, renderer: &mut impl CellRenderer) {
    let origin = self.lattice_origin(pos);
    if let Some(chunk) = self.chunk_containing_mut(pos) {
      let handle = renderer.create_visual(origin, diff.entity_id, diff.color, pos);
      chunk.visuals.insert(
        pos,
        VisualRecord {
          handle,
          entity_id: diff.entity_id,
        },
      );
    }
  }

  fn release_at(&mut self, pos: GridPos, renderer: &mut impl CellRenderer) {
    if let Some(record) = self
      .chunk_containing_mut(pos)
      .and_then(|c| c.visuals.remove(&pos))
    {
      renderer.release_visual(record.handle);
    }
  }
}
