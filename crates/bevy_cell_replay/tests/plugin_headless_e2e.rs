//! E2E tests for the replay plugin in a headless app.
//!
//! Runs `CellReplayPlugin` under `MinimalPlugins` against a temp folder and
//! observes the messages it publishes.
//!
//! Run with:
//!   cargo test -p bevy_cell_replay --test plugin_headless_e2e

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use bevy::app::{TaskPoolOptions, TaskPoolPlugin};
use bevy::ecs::message::{MessageCursor, Messages};
use bevy::prelude::*;
use bevy_cell_replay::{
  CellDiffs, CellReplayPlugin, ChunkEvent, DiffKind, GridPos, GridRect, ReplayCamera,
  ReplayConfig, ReplayHalted, ReplaySession, ReplayStatus, RetryInitialization, VisibleRect,
  VisualCommand, log_path,
};
use serde_json::{Value, json};
use tempfile::TempDir;

fn write_json(path: &Path, value: &Value) {
  std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
}

fn write_keyframe(folder: &Path, cells: &[(i32, i32, u64)]) {
  let region: Vec<Value> = cells
    .iter()
    .map(|(x, y, id)| json!({ "x": x, "y": y, "c": 0x0F0, "id": id }))
    .collect();
  write_json(
    &folder.join("keyframe.json"),
    &json!({ "width": 100, "height": 100, "region": region }),
  );
}

struct TestHarness {
  app: App,
  dir: TempDir,
  diffs: Vec<CellDiffs>,
  halted: Vec<ReplayHalted>,
  visuals: Vec<VisualCommand>,
  chunk_events: Vec<ChunkEvent>,
  diffs_cursor: MessageCursor<CellDiffs>,
  halted_cursor: MessageCursor<ReplayHalted>,
  visuals_cursor: MessageCursor<VisualCommand>,
  chunk_cursor: MessageCursor<ChunkEvent>,
}

impl TestHarness {
  fn new(dir: TempDir, config: ReplayConfig) -> Self {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(TaskPoolPlugin {
      task_pool_options: TaskPoolOptions::with_num_threads(4),
    }));
    app.add_plugins(CellReplayPlugin::new(config));

    Self {
      app,
      dir,
      diffs: Vec::new(),
      halted: Vec::new(),
      visuals: Vec::new(),
      chunk_events: Vec::new(),
      diffs_cursor: MessageCursor::default(),
      halted_cursor: MessageCursor::default(),
      visuals_cursor: MessageCursor::default(),
      chunk_cursor: MessageCursor::default(),
    }
  }

  fn folder(&self) -> &Path {
    self.dir.path()
  }

  fn show(&mut self, rect: GridRect) {
    self.app.world_mut().resource_mut::<VisibleRect>().0 = rect;
  }

  /// Runs one frame and collects everything published during it.
  fn update(&mut self) {
    self.app.update();
    let world = self.app.world();
    self.diffs.extend(
      self
        .diffs_cursor
        .read(world.resource::<Messages<CellDiffs>>())
        .cloned(),
    );
    self.halted.extend(
      self
        .halted_cursor
        .read(world.resource::<Messages<ReplayHalted>>())
        .cloned(),
    );
    self.visuals.extend(
      self
        .visuals_cursor
        .read(world.resource::<Messages<VisualCommand>>())
        .copied(),
    );
    self.chunk_events.extend(
      self
        .chunk_cursor
        .read(world.resource::<Messages<ChunkEvent>>())
        .copied(),
    );
  }

  fn run_until(&mut self, mut done: impl FnMut(&Self) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done(self) {
      assert!(Instant::now() < deadline, "condition never met");
      self.update();
      thread::sleep(Duration::from_millis(1));
    }
  }

  fn status(&self) -> ReplayStatus {
    self.app.world().resource::<ReplayStatus>().clone()
  }

  fn session(&self) -> &ReplaySession {
    self.app.world().resource::<ReplaySession>()
  }

  fn applied(&self) -> usize {
    self.diffs.iter().map(|m| m.diffs.len()).sum()
  }
}

#[test]
fn replays_logs_and_publishes_visuals() {
  let dir = TempDir::new().unwrap();
  write_keyframe(dir.path(), &[(1, 1, 1), (60, 60, 2)]);
  write_json(
    &log_path(dir.path(), 0),
    &json!([
      { "sx": 1, "sy": 1, "dx": 2, "dy": 1, "a": "move", "id": 1, "c": 0x0F0 },
      { "sx": 2, "sy": 1, "dx": 3, "dy": 1, "a": "move", "id": 1, "c": 0x0F0 },
      { "sx": 10, "sy": 10, "dx": 10, "dy": 10, "a": "add", "id": 3, "c": 0xF00 },
      { "sx": 60, "sy": 60, "dx": 60, "dy": 60, "a": "paint", "id": 2, "c": 0x00F },
    ]),
  );

  let config = ReplayConfig::at(dir.path()).with_records_per_tick(10);
  let mut h = TestHarness::new(dir, config);
  assert_eq!(h.status(), ReplayStatus::Running);

  h.show(GridRect::new(0, 0, 100, 100));
  h.run_until(|h| h.applied() == 4);

  let created = h
    .chunk_events
    .iter()
    .filter(|e| matches!(e, ChunkEvent::Created(_)))
    .count();
  assert_eq!(created, 4);

  let spawns = h
    .visuals
    .iter()
    .filter(|c| matches!(c, VisualCommand::Spawn { .. }))
    .count();
  assert_eq!(spawns, 3, "two keyframe cells plus one add");
  assert!(
    h.visuals
      .iter()
      .any(|c| matches!(c, VisualCommand::Recolor { .. }))
  );

  // The second move of entity 1 waits for a later tick.
  let move_ticks: Vec<u64> = h
    .diffs
    .iter()
    .filter(|m| m.diffs.iter().any(|d| d.kind == DiffKind::Move))
    .map(|m| m.tick)
    .collect();
  assert_eq!(move_ticks.len(), 2);
  assert!(move_ticks[0] < move_ticks[1]);

  let model = h.session().model().unwrap();
  let moved = model.cell(GridPos::new(2, 0)).unwrap().entity().unwrap();
  assert_eq!(moved.id, 1);
  assert_eq!(model.entity_count(), 3);
  assert_eq!(h.session().renderer().live_visuals(), 3);
}

#[test]
fn camera_drives_visible_rect() {
  let dir = TempDir::new().unwrap();
  write_keyframe(dir.path(), &[]);
  let config = ReplayConfig::at(dir.path()).with_cell_size(10.0);
  let mut h = TestHarness::new(dir, config);

  h.app.world_mut().spawn((
    GlobalTransform::from_translation(Vec3::new(250.0, 250.0, 0.0)),
    ReplayCamera::new(Vec2::new(200.0, 100.0)),
  ));
  h.update();

  let visible = h.app.world().resource::<VisibleRect>().0;
  assert_eq!(visible, GridRect::from_corners(15, 20, 35, 30));
  assert_eq!(
    h.session().pager().loaded_rect(),
    GridRect::from_corners(0, 0, 50, 50)
  );
  assert_eq!(h.session().chunks().chunk_count(), 1);
}

#[test]
fn missing_keyframe_fails_until_retried() {
  let dir = TempDir::new().unwrap();
  let config = ReplayConfig::at(dir.path());
  let mut h = TestHarness::new(dir, config);

  assert!(matches!(h.status(), ReplayStatus::Failed(_)));
  h.update();
  assert!(h.session().model().is_none());

  write_keyframe(h.folder(), &[(5, 5, 1)]);
  h.app.world_mut().write_message(RetryInitialization);
  h.update();

  assert_eq!(h.status(), ReplayStatus::Running);
  assert_eq!(h.session().model().unwrap().entity_count(), 1);
}

#[test]
fn corrupted_log_halts_replay() {
  let dir = TempDir::new().unwrap();
  write_keyframe(dir.path(), &[(1, 1, 1)]);
  write_json(
    &log_path(dir.path(), 0),
    &json!([{ "sx": 1, "sy": 1, "dx": 1, "dy": 1, "a": "add", "id": 9, "c": 0xFFF }]),
  );

  let config = ReplayConfig::at(dir.path());
  let mut h = TestHarness::new(dir, config);
  h.show(GridRect::new(0, 0, 100, 100));
  h.run_until(|h| !h.halted.is_empty());

  assert!(matches!(h.status(), ReplayStatus::Halted(_)));
  assert_eq!(h.halted.len(), 1);
  assert!(h.diffs.is_empty());

  // Halted replay stops ticking but keeps its world.
  let tick = h.session().model().unwrap().tick();
  for _ in 0..5 {
    h.update();
  }
  assert_eq!(h.session().model().unwrap().tick(), tick);
  assert_eq!(h.halted.len(), 1);
}

#[test]
fn tolerated_corruption_keeps_running() {
  let dir = TempDir::new().unwrap();
  write_keyframe(dir.path(), &[(1, 1, 1)]);
  write_json(
    &log_path(dir.path(), 0),
    &json!([{ "sx": 1, "sy": 1, "dx": 1, "dy": 1, "a": "add", "id": 9, "c": 0xFFF }]),
  );
  write_json(
    &log_path(dir.path(), 1),
    &json!([{ "sx": 7, "sy": 7, "dx": 7, "dy": 7, "a": "add", "id": 10, "c": 0xFFF }]),
  );

  let config = ReplayConfig::at(dir.path()).tolerate_corruption();
  let mut h = TestHarness::new(dir, config);
  h.show(GridRect::new(0, 0, 100, 100));
  h.run_until(|h| h.applied() == 1);

  assert_eq!(h.status(), ReplayStatus::Running);
  assert!(h.halted.is_empty());
  assert_eq!(h.diffs[0].diffs[0].entity_id, 10);

  // Chunks were rebuilt after the abandoned batch.
  let loaded = h.session().pager().loaded_rect();
  assert_eq!(loaded, GridRect::new(0, 0, 100, 100));
  assert_eq!(h.session().renderer().live_visuals(), 2);
}
