//! Consistency check between the grid, the live chunks and the renderer.
//!
//! O(loaded area); meant for debugging and tests, never for the hot path.

use rayon::prelude::*;
use thiserror::Error;

use super::{CellRenderer, ChunkManager};
use crate::coords::{GridPos, GridRect};
use crate::world::Grid;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HealthViolation {
  #[error("chunk {0:?} is empty or pokes out of the loaded rect")]
  ChunkOutsideLoaded(GridRect),
  #[error("chunks {0:?} and {1:?} overlap")]
  OverlappingChunks(GridRect, GridRect),
  #[error("chunks cover {covered} cells of a {expected}-cell loaded rect")]
  Untiled { covered: i64, expected: i64 },
  #[error("renderer holds {owners} chunk containers for {chunks} chunks")]
  OwnerCountMismatch { chunks: usize, owners: usize },
  #[error("visual at {0:?} does not match the grid")]
  StaleVisual(GridPos),
  #[error("occupied cell {0:?} inside the loaded rect has no visual")]
  MissingVisual(GridPos),
}

impl ChunkManager {
  /// Verifies that live chunks tile `loaded` and that visuals mirror the grid
  /// exactly inside it.
  pub fn health_check(
    &self,
    grid: &Grid,
    loaded: GridRect,
    renderer: &impl CellRenderer,
  ) -> Result<(), HealthViolation> {
    let rects: Vec<GridRect> = self.chunk_rects().collect();
    for (i, a) in rects.iter().enumerate() {
      if a.is_empty() || !loaded.contains_rect(a) {
        return Err(HealthViolation::ChunkOutsideLoaded(*a));
      }
      if let Some(b) = rects[i + 1..].iter().find(|b| a.overlaps(b)) {
        return Err(HealthViolation::OverlappingChunks(*a, *b));
      }
    }
    let covered: i64 = rects.iter().map(GridRect::area).sum();
    if covered != loaded.area() {
      return Err(HealthViolation::Untiled {
        covered,
        expected: loaded.area(),
      });
    }

    if renderer.live_owners() != self.chunk_count() {
      return Err(HealthViolation::OwnerCountMismatch {
        chunks: self.chunk_count(),
        owners: renderer.live_owners(),
      });
    }

    for chunk in self.chunks.values() {
      for (&pos, record) in &chunk.visuals {
        let matches = chunk.rect.contains(pos)
          && grid
            .entity(pos)
            .ok()
            .flatten()
            .is_some_and(|e| e.id == record.entity_id);
        if !matches {
          return Err(HealthViolation::StaleVisual(pos));
        }
      }
    }

    let scan = loaded.clip(&grid.bounds());
    if scan.is_empty() {
      return Ok(());
    }
    let missing = grid
      .cells()
      .par_chunks(grid.width() as usize)
      .enumerate()
      .filter(|(y, _)| (scan.bottom()..scan.top()).contains(&(*y as i32)))
      .find_map_any(|(y, row)| {
        (scan.left()..scan.right()).find_map(|x| {
          let pos = GridPos::new(x, y as i32);
          let has_visual = self
            .chunk_containing(pos)
            .is_some_and(|c| c.handle_at(pos).is_some());
          (row[x as usize].is_occupied() && !has_visual).then_some(pos)
        })
      });

    match missing {
      Some(pos) => Err(HealthViolation::MissingVisual(pos)),
      None => Ok(()),
    }
  }
}
