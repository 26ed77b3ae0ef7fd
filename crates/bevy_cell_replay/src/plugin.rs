//! Bevy integration: one replay tick per frame, output published as messages.
//!
//! Per frame, chained in `Update`:
//! 1. `retry_initialization` re-runs a failed start when asked to
//! 2. `update_visible_rect` maps the [`ReplayCamera`] onto grid cells
//! 3. `page_viewport` creates/removes chunks as the loaded rect moves
//! 4. `tick_replay` advances the world model and mirrors its diffs
//!
//! With the `health-check` feature, `run_health_check` runs after the tick
//! when [`ReplayConfig::health_check`] is set.

use bevy::ecs::message::{MessageReader, MessageWriter};
use bevy::prelude::*;

use crate::chunks::{ChunkEvent, ChunkManager, VisualCommand, VisualQueue};
use crate::config::ReplayConfig;
use crate::coords::GridRect;
use crate::error::{InitError, TickError};
use crate::pager::ViewportPager;
use crate::world::{AppliedDiff, WorldModel};

/// Marks the camera whose view drives paging.
///
/// The visible rect is derived from the entity's [`GlobalTransform`]
/// translation, which is the center of the view.
#[derive(Component, Clone, Copy, Debug)]
pub struct ReplayCamera {
  /// Size of the view in world units at scale 1.
  pub viewport_size: Vec2,
  /// Zoom factor: 2.0 shows twice as much of the world.
  pub scale: f32,
}

impl ReplayCamera {
  pub fn new(viewport_size: Vec2) -> Self {
    Self {
      viewport_size,
      scale: 1.0,
    }
  }

  /// Grid cells touched by this view.
  pub fn visible_rect(&self, center: Vec2, cell_size: f32) -> GridRect {
    let cell_size = cell_size.max(f32::EPSILON);
    let half = self.viewport_size * self.scale.abs() * 0.5;
    let min = ((center - half) / cell_size).floor();
    let max = ((center + half) / cell_size).ceil();
    GridRect::from_corners(min.x as i32, min.y as i32, max.x as i32, max.y as i32)
  }
}

/// The grid rectangle currently on screen.
///
/// Written by `update_visible_rect` when a [`ReplayCamera`] exists; can be
/// set directly otherwise.
#[derive(Resource, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VisibleRect(pub GridRect);

/// Lifecycle of the replay.
#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub enum ReplayStatus {
  #[default]
  Running,
  /// Stopped ticking after an error. Paging still works.
  Halted(String),
  /// The world model could not be built.
  Failed(String),
}

impl ReplayStatus {
  pub fn is_running(&self) -> bool {
    matches!(self, Self::Running)
  }
}

/// Diffs applied this frame that touch the loaded rect.
#[derive(Message, Clone, Debug)]
pub struct CellDiffs {
  pub tick: u64,
  pub diffs: Vec<AppliedDiff>,
}

/// Sent once when the replay stops ticking.
#[derive(Message, Clone, Debug)]
pub struct ReplayHalted {
  pub reason: String,
}

/// Request to rebuild the world model from the keyframe.
#[derive(Message, Clone, Copy, Debug, Default)]
pub struct RetryInitialization;

/// Everything the replay owns: the world model, the pager, the live chunks
/// and the queue their visual commands go through.
#[derive(Resource)]
pub struct ReplaySession {
  config: ReplayConfig,
  model: Option<WorldModel>,
  pager: ViewportPager,
  chunks: ChunkManager,
  renderer: VisualQueue,
}

impl ReplaySession {
  /// Creates a session without loading anything.
  pub fn new(config: ReplayConfig) -> Self {
    let quantum = config.effective_quantum();
    Self {
      config,
      model: None,
      pager: ViewportPager::new(quantum),
      chunks: ChunkManager::new(quantum),
      renderer: VisualQueue::new(),
    }
  }

  /// Builds (or rebuilds) the world model from the keyframe.
  ///
  /// Any previous model is stopped and its chunks released first.
  pub fn initialize(&mut self) -> Result<(), InitError> {
    self.stop();
    self.model = None;
    self.resync();
    self.model = Some(WorldModel::initialize(&self.config)?);
    Ok(())
  }

  pub fn config(&self) -> &ReplayConfig {
    &self.config
  }

  pub fn model(&self) -> Option<&WorldModel> {
    self.model.as_ref()
  }

  pub fn model_mut(&mut self) -> Option<&mut WorldModel> {
    self.model.as_mut()
  }

  pub fn pager(&self) -> &ViewportPager {
    &self.pager
  }

  pub fn chunks(&self) -> &ChunkManager {
    &self.chunks
  }

  pub fn renderer(&self) -> &VisualQueue {
    &self.renderer
  }

  /// Drops every chunk so the next paging pass rebuilds them from the grid.
  pub fn resync(&mut self) {
    self.chunks.clear(&mut self.renderer);
    self.pager.reset();
  }

  /// Stops the log reader, if running.
  pub fn stop(&mut self) {
    if let Some(model) = self.model.as_mut() {
      model.stop();
    }
  }

  fn flush(
    &mut self,
    chunk_events: &mut MessageWriter<ChunkEvent>,
    visuals: &mut MessageWriter<VisualCommand>,
  ) {
    chunk_events.write_batch(self.renderer.drain_chunk_events());
    visuals.write_batch(self.renderer.drain_commands());
  }
}

/// Plugin replaying a diff-log world.
///
/// Loads the keyframe during `build`. A failure leaves
/// [`ReplayStatus::Failed`] and can be retried with [`RetryInitialization`].
#[derive(Default)]
pub struct CellReplayPlugin {
  pub config: ReplayConfig,
}

impl CellReplayPlugin {
  pub fn new(config: ReplayConfig) -> Self {
    Self { config }
  }
}

impl Plugin for CellReplayPlugin {
  fn build(&self, app: &mut App) {
    let mut session = ReplaySession::new(self.config.clone());
    let status = match session.initialize() {
      Ok(()) => ReplayStatus::Running,
      Err(e) => {
        error!("Failed to initialize replay: {e}");
        ReplayStatus::Failed(e.to_string())
      }
    };

    app
      .insert_resource(session)
      .insert_resource(status)
      .init_resource::<VisibleRect>()
      .add_message::<CellDiffs>()
      .add_message::<ChunkEvent>()
      .add_message::<VisualCommand>()
      .add_message::<ReplayHalted>()
      .add_message::<RetryInitialization>();

    app.add_systems(
      Update,
      (
        retry_initialization,
        update_visible_rect,
        page_viewport,
        tick_replay,
      )
        .chain(),
    );

    #[cfg(feature = "health-check")]
    app.add_systems(Update, run_health_check.after(tick_replay));

    app.add_systems(Last, stop_on_exit);
  }
}

#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
fn retry_initialization(
  mut requests: MessageReader<RetryInitialization>,
  mut session: ResMut<ReplaySession>,
  mut status: ResMut<ReplayStatus>,
  mut chunk_events: MessageWriter<ChunkEvent>,
  mut visuals: MessageWriter<VisualCommand>,
) {
  if requests.read().count() == 0 {
    return;
  }

  *status = match session.initialize() {
    Ok(()) => {
      info!("Replay reinitialized");
      ReplayStatus::Running
    }
    Err(e) => {
      error!("Failed to initialize replay: {e}");
      ReplayStatus::Failed(e.to_string())
    }
  };
  session.flush(&mut chunk_events, &mut visuals);
}

#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
fn update_visible_rect(
  cameras: Query<(&GlobalTransform, &ReplayCamera)>,
  session: Res<ReplaySession>,
  mut visible: ResMut<VisibleRect>,
) {
  let Ok((transform, camera)) = cameras.single() else {
    return;
  };
  let rect = camera.visible_rect(transform.translation().truncate(), session.config.cell_size);
  if visible.0 != rect {
    visible.0 = rect;
  }
}

#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
fn page_viewport(
  mut session: ResMut<ReplaySession>,
  visible: Res<VisibleRect>,
  mut chunk_events: MessageWriter<ChunkEvent>,
  mut visuals: MessageWriter<VisualCommand>,
) {
  let session = &mut *session;
  let Some(model) = session.model.as_ref() else {
    return;
  };
  let bounds = model.bounds();
  if !session.pager.is_dirty(visible.0, bounds) {
    return;
  }

  let delta = session
    .pager
    .recompute(visible.0, bounds, session.chunks.chunk_rects());
  debug!(
    "Paging to {:?}: +{} -{} chunks",
    session.pager.loaded_rect(),
    delta.create.len(),
    delta.remove.len()
  );
  session
    .chunks
    .apply_delta(&delta, model.grid(), &mut session.renderer);
  session.flush(&mut chunk_events, &mut visuals);
}

#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
fn tick_replay(
  mut session: ResMut<ReplaySession>,
  mut status: ResMut<ReplayStatus>,
  mut diff_messages: MessageWriter<CellDiffs>,
  mut halted: MessageWriter<ReplayHalted>,
  mut chunk_events: MessageWriter<ChunkEvent>,
  mut visuals: MessageWriter<VisualCommand>,
) {
  if !status.is_running() {
    return;
  }
  let session = &mut *session;
  let records = session.config.records_per_tick;
  let halt_on_corruption = session.config.halt_on_corruption;
  let loaded = session.pager.loaded_rect();
  let Some(model) = session.model.as_mut() else {
    return;
  };

  let tick = model.tick();
  match model.advance_tick(records, loaded) {
    Ok(diffs) => {
      if !diffs.is_empty() {
        session.chunks.apply_diffs(&diffs, &mut session.renderer);
        diff_messages.write(CellDiffs { tick, diffs });
      }
    }
    Err(TickError::Corruption(e)) => {
      error!("Corrupted diff log at tick {tick}: {e}");
      // The abandoned batch left the grid ahead of the visuals.
      session.resync();
      if halt_on_corruption {
        *status = ReplayStatus::Halted(e.to_string());
        halted.write(ReplayHalted {
          reason: e.to_string(),
        });
      }
    }
    Err(TickError::Reader(e)) => {
      error!("Diff log reader failed at tick {tick}: {e}");
      *status = ReplayStatus::Halted(e.to_string());
      halted.write(ReplayHalted {
        reason: e.to_string(),
      });
    }
  }
  session.flush(&mut chunk_events, &mut visuals);
}

#[cfg(feature = "health-check")]
#[cfg_attr(feature = "tracy", tracing::instrument(skip_all))]
fn run_health_check(session: Res<ReplaySession>) {
  if !session.config.health_check {
    return;
  }
  let Some(model) = session.model.as_ref() else {
    return;
  };
  if let Err(violation) =
    session
      .chunks
      .health_check(model.grid(), session.pager.loaded_rect(), &session.renderer)
  {
    error!("Replay health check failed: {violation}");
  }
}

fn stop_on_exit(mut exits: MessageReader<AppExit>, mut session: ResMut<ReplaySession>) {
  if exits.read().count() > 0 {
    session.stop();
  }
}
