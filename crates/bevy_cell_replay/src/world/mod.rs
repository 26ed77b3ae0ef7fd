//! The replayed world: a dense grid fed by the diff logs.
//!
//! [`WorldModel::advance_tick`] consumes a bounded number of records per call
//! and never blocks on disk. Within one tick an entity is mutated at most
//! once: a record whose source entity was already touched this tick ends the
//! tick early, and the record is retried on the next one.

mod diff;
mod grid;
mod keyframe;

use bevy::log::{debug, info};
pub use diff::{AppliedDiff, DiffKind};
pub use grid::{Cell, CellEntity, Grid};
pub use keyframe::{MAX_GRID_CELLS, grid_from_keyframe, load_keyframe};

use crate::color::CellColor;
use crate::config::ReplayConfig;
use crate::coords::{GridPos, GridRect};
use crate::error::{CorruptionError, InitError, TickError};
use crate::format::{DiffAction, DiffRecord};
use crate::reader::{LogReader, ReaderSettings};

/// Result of looking at one record.
enum Step {
  Applied,
  /// The source entity was already mutated this tick.
  Deferred,
}

pub struct WorldModel {
  grid: Grid,
  reader: LogReader,
  pending: Vec<DiffRecord>,
  cursor: usize,
  tick: u64,
}

impl WorldModel {
  /// Loads the keyframe and starts the log reader.
  pub fn initialize(config: &ReplayConfig) -> Result<Self, InitError> {
    let folder = &config.working_folder;
    let grid = load_keyframe(folder, config.effective_quantum())?;
    info!(
      "Loaded keyframe {}x{} with {} entities from {}",
      grid.width(),
      grid.height(),
      grid.entity_count(),
      folder.display()
    );

    let reader = LogReader::spawn(ReaderSettings {
      folder: folder.clone(),
      first_index: config.first_log_index,
      remove_consumed: config.remove_consumed_files,
    })?;

    Ok(Self::from_parts(grid, reader))
  }

  /// Assembles a model from an already built grid and reader.
  pub fn from_parts(grid: Grid, reader: LogReader) -> Self {
    Self {
      grid,
      reader,
      pending: Vec::new(),
      cursor: 0,
      // Keyframe entities carry tick 0, so they are never deferred.
      tick: 1,
    }
  }

  pub fn grid(&self) -> &Grid {
    &self.grid
  }

  pub fn cell(&self, pos: GridPos) -> Result<&Cell, CorruptionError> {
    self.grid.cell(pos)
  }

  /// Grid dimensions, already rounded to the chunk quantum.
  pub fn grid_size(&self) -> (i32, i32) {
    (self.grid.width(), self.grid.height())
  }

  pub fn bounds(&self) -> GridRect {
    self.grid.bounds()
  }

  /// Current tick number. Starts at 1.
  pub fn tick(&self) -> u64 {
    self.tick
  }

  /// Records in the batch being replayed, consumed or not.
  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  /// Index of the next record to replay in the pending batch.
  pub fn cursor(&self) -> usize {
    self.cursor
  }

  pub fn entity_count(&self) -> usize {
    self.grid.entity_count()
  }

  pub fn reader(&mut self) -> &mut LogReader {
    &mut self.reader
  }

  /// Stops the log reader. Safe to call repeatedly.
  pub fn stop(&mut self) {
    self.reader.stop();
  }

  /// Replays up to `max_records` log records.
  ///
  /// Returns the applied mutations with an end inside `visible`. Mutations
  /// elsewhere still change the grid but are not reported. When no batch is
  /// pending, this adopts the reader's last batch or asks for the next file
  /// and returns nothing.
  ///
  /// On corruption the rest of the batch is dropped. Mutations applied
  /// earlier in the same call stay applied.
  pub fn advance_tick(
    &mut self,
    max_records: usize,
    visible: GridRect,
  ) -> Result<Vec<AppliedDiff>, TickError> {
    let mut out = Vec::new();

    if self.pending.is_empty() {
      if self.reader.is_loading() {
        return Ok(out);
      }
      let batch = self.reader.take_batch()?;
      if batch.is_empty() {
        self.reader.request_load_next()?;
        return Ok(out);
      }
      debug!("Replaying batch of {} records at tick {}", batch.len(), self.tick);
      self.pending = batch;
      self.cursor = 0;
    }

    let mut walked = 0;
    while walked < max_records && self.cursor < self.pending.len() {
      let record = self.pending[self.cursor];
      match self.apply(&record, &visible, &mut out) {
        Ok(Step::Applied) => {}
        Ok(Step::Deferred) => break,
        Err(e) => {
          self.pending.clear();
          self.cursor = 0;
          self.tick += 1;
          return Err(e.into());
        }
      }
      self.cursor += 1;
      walked += 1;
    }

    if self.cursor >= self.pending.len() {
      self.pending.clear();
      self.cursor = 0;
    }
    if walked > 0 {
      self.tick += 1;
    }

    Ok(out)
  }

  fn touched_this_tick(&self, pos: GridPos) -> Result<bool, CorruptionError> {
    Ok(
      self
        .grid
        .entity(pos)?
        .is_some_and(|e| e.last_touched == self.tick),
    )
  }

  fn apply(
    &mut self,
    record: &DiffRecord,
    visible: &GridRect,
    out: &mut Vec<AppliedDiff>,
  ) -> Result<Step, CorruptionError> {
    if record.action != DiffAction::Add && self.touched_this_tick(record.source)? {
      return Ok(Step::Deferred);
    }

    let applied = match record.action {
      DiffAction::Add => Some(self.create(record.dest, record.id, record.color)?),
      DiffAction::Move => Some(self.relocate(record)?),
      DiffAction::Delete => self.delete(record.source)?,
      DiffAction::Paint => Some(self.paint(record.source, record.id, record.color)?),
    };

    // A Move repaired into an Add reports only its dest; the record's source
    // still counts for visibility.
    if let Some(diff) = applied
      && (diff.touches(visible) || visible.contains(record.source))
    {
      out.push(diff);
    }
    Ok(Step::Applied)
  }

  fn create(
    &mut self,
    pos: GridPos,
    id: u64,
    color: CellColor,
  ) -> Result<AppliedDiff, CorruptionError> {
    let entity = CellEntity {
      id,
      color,
      last_touched: self.tick,
    };
    self.grid.place(pos, entity)?;
    Ok(AppliedDiff {
      kind: DiffKind::Add,
      entity_id: id,
      color,
      source: pos,
      dest: pos,
    })
  }

  fn relocate(&mut self, record: &DiffRecord) -> Result<AppliedDiff, CorruptionError> {
    let Some(found) = self.grid.entity(record.source)?.map(|e| e.id) else {
      // The log lost this entity's creation; materialize it where it went.
      return self.create(record.dest, record.id, record.color);
    };
    if found != record.id {
      return Err(CorruptionError::IdMismatch {
        pos: record.source,
        expected: record.id,
        found,
      });
    }

    let tick = self.tick;
    let entity = self.grid.relocate(record.source, record.dest)?;
    entity.last_touched = tick;
    Ok(AppliedDiff {
      kind: DiffKind::Move,
      entity_id: entity.id,
      color: entity.color,
      source: record.source,
      dest: record.dest,
    })
  }

  fn delete(&mut self, pos: GridPos) -> Result<Option<AppliedDiff>, CorruptionError> {
    Ok(self.grid.take(pos)?.map(|entity| AppliedDiff {
      kind: DiffKind::Delete,
      entity_id: entity.id,
      color: entity.color,
      source: pos,
      dest: pos,
    }))
  }

  fn paint(
    &mut self,
    pos: GridPos,
    id: u64,
    color: CellColor,
  ) -> Result<AppliedDiff, CorruptionError> {
    if self.grid.entity(pos)?.is_none() {
      return self.create(pos, id, color);
    }
    let tick = self.tick;
    let entity = self
      .grid
      .entity_mut(pos)?
      .ok_or(CorruptionError::Vacant(pos))?;
    entity.color = color;
    entity.last_touched = tick;
    Ok(AppliedDiff {
      kind: DiffKind::Paint,
      entity_id: entity.id,
      color,
      source: pos,
      dest: pos,
    })
  }
}

#[cfg(test)]
mod tests {
  use std::thread;
  use std::time::{Duration, Instant};

  use palette::Srgb;
  use serde_json::json;
  use tempfile::TempDir;

  use super::*;
  use crate::format::log_path;

  struct Fixture {
    _dir: TempDir,
    model: WorldModel,
  }

  fn fixture(
    width: i32,
    height: i32,
    cells: &[(i32, i32, u64)],
    logs: &[serde_json::Value],
  ) -> Fixture {
    let dir = TempDir::new().unwrap();
    let region: Vec<_> = cells
      .iter()
      .map(|&(x, y, id)| json!({ "x": x + 1, "y": y + 1, "c": 0x111, "id": id }))
      .collect();
    let keyframe = json!({ "width": width, "height": height, "region": region });
    std::fs::write(dir.path().join("keyframe.json"), keyframe.to_string()).unwrap();
    for (i, log) in logs.iter().enumerate() {
      std::fs::write(log_path(dir.path(), i as u32), log.to_string()).unwrap();
    }
    let model = WorldModel::initialize(&ReplayConfig::at(dir.path())).unwrap();
    Fixture { _dir: dir, model }
  }

  fn mv(id: u64, from: (i32, i32), to: (i32, i32)) -> serde_json::Value {
    json!({
      "sx": from.0 + 1, "sy": from.1 + 1,
      "dx": to.0 + 1, "dy": to.1 + 1,
      "a": "move", "id": id, "c": 0x111,
    })
  }

  /// Ticks until a batch is pending, so the following call replays records.
  fn prime(model: &mut WorldModel) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while model.pending_len() == 0 {
      assert!(Instant::now() < deadline, "log never arrived");
      let diffs = model.advance_tick(0, GridRect::EMPTY).unwrap();
      assert!(diffs.is_empty());
      thread::sleep(Duration::from_millis(1));
    }
  }

  fn occupant(model: &WorldModel, x: i32, y: i32) -> Option<u64> {
    model.cell(GridPos::new(x, y)).unwrap().entity().map(|e| e.id)
  }

  #[test]
  fn same_entity_waits_for_next_tick() {
    let mut f = fixture(
      50,
      50,
      &[(0, 0, 7)],
      &[json!([mv(7, (0, 0), (1, 0)), mv(7, (1, 0), (2, 0))])],
    );
    prime(&mut f.model);
    let all = GridRect::sized(50, 50);

    let diffs = f.model.advance_tick(2, all).unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(f.model.cursor(), 1);
    assert_eq!(occupant(&f.model, 1, 0), Some(7));

    let diffs = f.model.advance_tick(2, all).unwrap();
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].dest, GridPos::new(2, 0));
    assert_eq!(f.model.pending_len(), 0);
  }

  #[test]
  fn offscreen_mutations_apply_silently() {
    let mut f = fixture(100, 100, &[(80, 80, 3)], &[json!([mv(3, (80, 80), (81, 80))])]);
    prime(&mut f.model);

    let diffs = f.model.advance_tick(10, GridRect::sized(50, 50)).unwrap();
    assert!(diffs.is_empty());
    assert_eq!(occupant(&f.model, 81, 80), Some(3));
    assert_eq!(occupant(&f.model, 80, 80), None);
  }

  #[test]
  fn move_from_empty_cell_becomes_add() {
    let mut f = fixture(50, 50, &[], &[json!([mv(9, (4, 4), (5, 5))])]);
    prime(&mut f.model);

    let diffs = f.model.advance_tick(1, GridRect::sized(50, 50)).unwrap();
    assert_eq!(diffs[0].kind, DiffKind::Add);
    assert_eq!(diffs[0].dest, GridPos::new(5, 5));
    assert_eq!(occupant(&f.model, 5, 5), Some(9));
  }

  #[test]
  fn delete_of_empty_cell_is_noop_and_paint_recolors() {
    let mut f = fixture(
      50,
      50,
      &[(1, 1, 4)],
      &[json!([
        { "sx": 10, "sy": 10, "dx": 10, "dy": 10, "a": "delete", "id": 0 },
        { "sx": 2, "sy": 2, "dx": 2, "dy": 2, "a": "paint", "id": 4, "c": 0xF00 },
        { "sx": 20, "sy": 20, "dx": 20, "dy": 20, "a": "paint", "id": 6, "c": 0x00F },
      ])],
    );
    prime(&mut f.model);

    let diffs = f.model.advance_tick(3, GridRect::sized(50, 50)).unwrap();
    let kinds: Vec<_> = diffs.iter().map(|d| d.kind).collect();
    assert_eq!(kinds, vec![DiffKind::Paint, DiffKind::Add]);
    let painted = f.model.cell(GridPos::new(1, 1)).unwrap().entity().unwrap();
    assert_eq!(painted.color, Srgb::new(0, 0, 225));
    assert_eq!(occupant(&f.model, 19, 19), Some(6));
  }

  #[test]
  fn corruption_discards_rest_of_batch() {
    let mut f = fixture(
      50,
      50,
      &[(0, 0, 1), (3, 3, 2)],
      &[json!([
        mv(1, (0, 0), (1, 0)),
        mv(5, (3, 3), (4, 3)),
        mv(2, (3, 3), (4, 3)),
      ])],
    );
    prime(&mut f.model);

    let err = f.model.advance_tick(3, GridRect::sized(50, 50)).unwrap_err();
    assert_eq!(
      err,
      TickError::Corruption(CorruptionError::IdMismatch {
        pos: GridPos::new(3, 3),
        expected: 5,
        found: 2,
      })
    );
    assert_eq!(occupant(&f.model, 1, 0), Some(1));
    assert_eq!(occupant(&f.model, 3, 3), Some(2));
    assert_eq!(f.model.pending_len(), 0);
  }

  #[test]
  fn out_of_bounds_record_is_corruption() {
    let mut f = fixture(50, 50, &[(0, 0, 1)], &[json!([mv(1, (0, 0), (50, 0))])]);
    prime(&mut f.model);
    assert!(matches!(
      f.model.advance_tick(1, GridRect::sized(50, 50)),
      Err(TickError::Corruption(CorruptionError::OutOfBounds(_)))
    ));
  }

  #[test]
  fn extreme_wire_coordinate_is_corruption() {
    let mut f = fixture(
      50,
      50,
      &[],
      &[json!([{ "sx": i32::MIN, "sy": 1, "dx": 1, "dy": 1, "a": "move", "id": 1 }])],
    );
    prime(&mut f.model);
    assert_eq!(
      f.model.advance_tick(1, GridRect::sized(50, 50)),
      Err(TickError::Corruption(CorruptionError::OutOfBounds(
        GridPos::new(i32::MIN, 0)
      )))
    );

    // The reader survived and keeps serving requests.
    for _ in 0..10 {
      assert!(f.model.advance_tick(1, GridRect::sized(50, 50)).is_ok());
      thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(f.model.reader().next_file_index(), 1);
  }

  #[test]
  fn stop_is_idempotent() {
    let mut f = fixture(50, 50, &[], &[]);
    f.model.stop();
    f.model.stop();
    assert!(matches!(
      f.model.advance_tick(1, GridRect::sized(50, 50)),
      Err(TickError::Reader(_))
    ));
  }
}
