//! Background reader for the numbered diff logs.
//!
//! A single worker thread loads one log file per request. The foreground
//! talks to it through a pair of capacity-1 `async-channel`s and only ever
//! polls, so a tick never waits on disk.
//!
//! ```text
//! Idle --request_load_next--> Loading --worker reply--> Idle
//!   \______________________ stop ______________________/--> Stopped
//! ```
//!
//! At most one load is in flight. A failed load (missing or unparsable file)
//! hands back an empty batch and leaves the file index where it was, so the
//! same file is retried on the next request.

mod worker;

use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use bevy::log::debug;

use crate::error::ReaderError;
use crate::format::DiffRecord;

/// Commands sent from the foreground to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderCommand {
  /// Read the next log file.
  LoadNext,
  /// Terminate the worker.
  Stop,
}

/// Reply for one [`ReaderCommand::LoadNext`].
#[derive(Debug)]
pub(crate) struct LoadOutcome {
  /// Parsed records. Empty when the file was missing or broken.
  pub records: Vec<DiffRecord>,
  /// Index of the file the next request will read.
  pub next_index: u32,
  pub duration: Duration,
}

/// Worker parameters.
#[derive(Clone, Debug)]
pub struct ReaderSettings {
  pub folder: PathBuf,
  pub first_index: u32,
  pub remove_consumed: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ReaderState {
  Idle,
  Loading,
  Stopped,
}

/// Foreground handle to the log worker.
pub struct LogReader {
  cmd_tx: Sender<ReaderCommand>,
  result_rx: Receiver<LoadOutcome>,
  state: ReaderState,
  batch: Vec<DiffRecord>,
  next_index: u32,
  last_load: Duration,
  worker: Option<JoinHandle<()>>,
}

impl LogReader {
  /// Spawns the worker thread. No file is read until the first request.
  pub fn spawn(settings: ReaderSettings) -> std::io::Result<Self> {
    let (cmd_tx, cmd_rx) = async_channel::bounded::<ReaderCommand>(1);
    let (result_tx, result_rx) = async_channel::bounded::<LoadOutcome>(1);
    let next_index = settings.first_index;

    let worker = thread::Builder::new()
      .name("cell-replay-log-reader".into())
      .spawn(move || worker::worker_loop(settings, cmd_rx, result_tx))?;

    Ok(Self::from_channels(cmd_tx, result_rx, next_index, Some(worker)))
  }

  fn from_channels(
    cmd_tx: Sender<ReaderCommand>,
    result_rx: Receiver<LoadOutcome>,
    next_index: u32,
    worker: Option<JoinHandle<()>>,
  ) -> Self {
    Self {
      cmd_tx,
      result_rx,
      state: ReaderState::Idle,
      batch: Vec::new(),
      next_index,
      last_load: Duration::ZERO,
      worker,
    }
  }

  /// Collects a finished load, if any. Never blocks.
  fn poll(&mut self) {
    if self.state != ReaderState::Loading {
      return;
    }
    match self.result_rx.try_recv() {
      Ok(outcome) => {
        self.batch = outcome.records;
        self.next_index = outcome.next_index;
        self.last_load = outcome.duration;
        self.state = ReaderState::Idle;
      }
      Err(TryRecvError::Empty) => {}
      Err(TryRecvError::Closed) => {
        self.state = ReaderState::Stopped;
      }
    }
  }

  /// Returns true when no load is in flight.
  pub fn is_available(&mut self) -> bool {
    self.poll();
    self.state == ReaderState::Idle
  }

  /// Returns true while a load is in flight.
  pub fn is_loading(&mut self) -> bool {
    self.poll();
    self.state == ReaderState::Loading
  }

  /// Asks the worker to read the next log file.
  ///
  /// Requests are never queued: calling this while a load is in flight is an
  /// error.
  pub fn request_load_next(&mut self) -> Result<(), ReaderError> {
    self.poll();
    match self.state {
      ReaderState::Loading => return Err(ReaderError::Busy),
      ReaderState::Stopped => return Err(ReaderError::Stopped),
      ReaderState::Idle => {}
    }

    match self.cmd_tx.try_send(ReaderCommand::LoadNext) {
      Ok(()) => {
        self.state = ReaderState::Loading;
        Ok(())
      }
      Err(TrySendError::Full(_)) => Err(ReaderError::Busy),
      Err(TrySendError::Closed(_)) => {
        self.state = ReaderState::Stopped;
        Err(ReaderError::Stopped)
      }
    }
  }

  /// Takes the most recently completed batch, leaving an empty one behind.
  pub fn take_batch(&mut self) -> Result<Vec<DiffRecord>, ReaderError> {
    self.poll();
    match self.state {
      ReaderState::Loading => Err(ReaderError::Busy),
      ReaderState::Stopped => Err(ReaderError::Stopped),
      ReaderState::Idle => Ok(std::mem::take(&mut self.batch)),
    }
  }

  /// Index of the log file the next request will read.
  pub fn next_file_index(&mut self) -> u32 {
    self.poll();
    self.next_index
  }

  /// Wall time the worker spent on the last completed load.
  pub fn last_load_duration(&self) -> Duration {
    self.last_load
  }

  /// Stops the worker and waits for it to exit. Safe to call repeatedly.
  pub fn stop(&mut self) {
    let Some(worker) = self.worker.take() else {
      return;
    };

    // Blocks only while a previously sent LoadNext still occupies the slot.
    let _ = self.cmd_tx.send_blocking(ReaderCommand::Stop);
    self.cmd_tx.close();
    self.result_rx.close();

    if worker.join().is_err() {
      bevy::log::error!("log reader thread panicked");
    }
    self.state = ReaderState::Stopped;
    debug!("log reader stopped before index {}", self.next_index);
  }
}

impl Drop for LogReader {
  fn drop(&mut self) {
    self.stop();
  }
}
