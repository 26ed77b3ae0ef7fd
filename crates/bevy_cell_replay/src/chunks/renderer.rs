//! The seam between chunk bookkeeping and whatever draws cells.

use std::collections::HashSet;

use crate::color::CellColor;
use crate::coords::{GridPos, GridRect};

/// Opaque id of one drawn cell, allocated by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisualHandle(pub u64);

/// Receives visual lifecycle calls from the [`ChunkManager`](super::ChunkManager).
///
/// `chunk` arguments are the origin of the owning chunk, which is also the key
/// passed to [`chunk_created`](Self::chunk_created).
pub trait CellRenderer {
  fn create_visual(
    &mut self,
    chunk: GridPos,
    entity_id: u64,
    color: CellColor,
    pos: GridPos,
  ) -> VisualHandle;

  /// Moves a visual to `pos`, possibly into another chunk.
  fn move_visual(&mut self, handle: VisualHandle, chunk: GridPos, pos: GridPos);

  fn recolor_visual(&mut self, handle: VisualHandle, color: CellColor);

  fn release_visual(&mut self, handle: VisualHandle);

  fn chunk_created(&mut self, rect: GridRect);

  fn chunk_removed(&mut self, rect: GridRect);

  /// Number of chunk containers the renderer currently holds.
  fn live_owners(&self) -> usize;
}

/// Chunk lifecycle notification.
#[derive(bevy::prelude::Message, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkEvent {
  Created(GridRect),
  Removed(GridRect),
}

/// Instruction for the presentation layer about one drawn cell.
#[derive(bevy::prelude::Message, Clone, Copy, Debug, PartialEq)]
pub enum VisualCommand {
  Spawn {
    handle: VisualHandle,
    chunk: GridPos,
    entity_id: u64,
    color: CellColor,
    pos: GridPos,
  },
  Move {
    handle: VisualHandle,
    chunk: GridPos,
    pos: GridPos,
  },
  Recolor {
    handle: VisualHandle,
    color: CellColor,
  },
  Despawn {
    handle: VisualHandle,
  },
}

/// Renderer that records what it was asked to do.
///
/// Used by the plugin to turn chunk manager calls into messages, and by tests
/// to observe them.
#[derive(Debug, Default)]
pub struct VisualQueue {
  next_handle: u64,
  live: HashSet<VisualHandle>,
  owners: HashSet<GridPos>,
  commands: Vec<VisualCommand>,
  chunk_events: Vec<ChunkEvent>,
}

impl VisualQueue {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of visuals spawned and not yet despawned.
  pub fn live_visuals(&self) -> usize {
    self.live.len()
  }

  pub fn is_live(&self, handle: VisualHandle) -> bool {
    self.live.contains(&handle)
  }

  pub fn drain_commands(&mut self) -> impl Iterator<Item = VisualCommand> + '_ {
    self.commands.drain(..)
  }

  pub fn drain_chunk_events(&mut self) -> impl Iterator<Item = ChunkEvent> + '_ {
    self.chunk_events.drain(..)
  }

  /// Drops queued output without touching the live sets.
  pub fn clear_pending(&mut self) {
    self.commands.clear();
    self.chunk_events.clear();
  }
}

impl CellRenderer for VisualQueue {
  fn create_visual(
    &mut self,
    chunk: GridPos,
    entity_id: u64,
    color: CellColor,
    pos: GridPos,
  ) -> VisualHandle {
    let handle = VisualHandle(self.next_handle);
    self.next_handle += 1;
    self.live.insert(handle);
    self.commands.push(VisualCommand::Spawn {
      handle,
      chunk,
      entity_id,
      color,
      pos,
    });
    handle
  }

  fn move_visual(&mut self, handle: VisualHandle, chunk: GridPos, pos: GridPos) {
    self.commands.push(VisualCommand::Move { handle, chunk, pos });
  }

  fn recolor_visual(&mut self, handle: VisualHandle, color: CellColor) {
    self.commands.push(VisualCommand::Recolor { handle, color });
  }

  fn release_visual(&mut self, handle: VisualHandle) {
    if self.live.remove(&handle) {
      self.commands.push(VisualCommand::Despawn { handle });
    }
  }

  fn chunk_created(&mut self, rect: GridRect) {
    self.owners.insert(rect.origin());
    self.chunk_events.push(ChunkEvent::Created(rect));
  }

  fn chunk_removed(&mut self, rect: GridRect) {
    self.owners.remove(&rect.origin());
    self.chunk_events.push(ChunkEvent::Removed(rect));
  }

  fn live_owners(&self) -> usize {
    self.owners.len()
  }
}
