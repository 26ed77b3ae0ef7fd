//! Worker thread body for [`LogReader`](super::LogReader).

use std::io::ErrorKind;
use std::path::Path;

use async_channel::{Receiver, Sender};
use bevy::log::{debug, warn};
// WASM compat: std::time::Instant panics on wasm32
use web_time::Instant;

use super::{LoadOutcome, ReaderCommand, ReaderSettings};
use crate::format::{DiffRecord, log_path, parse_diff_log};

/// Main worker loop running in a dedicated thread.
pub(super) fn worker_loop(
  settings: ReaderSettings,
  cmd_rx: Receiver<ReaderCommand>,
  result_tx: Sender<LoadOutcome>,
) {
  let mut index = settings.first_index;

  while let Ok(cmd) = cmd_rx.recv_blocking() {
    match cmd {
      ReaderCommand::Stop => break,
      ReaderCommand::LoadNext => {
        let started = Instant::now();
        let records = load_log(&settings.folder, &mut index, settings.remove_consumed);
        let outcome = LoadOutcome {
          records,
          next_index: index,
          duration: started.elapsed(),
        };
        if result_tx.send_blocking(outcome).is_err() {
          break;
        }
      }
    }
  }
}

/// Reads log `index`, advancing it only when the file parsed.
fn load_log(folder: &Path, index: &mut u32, remove_consumed: bool) -> Vec<DiffRecord> {
  let path = log_path(folder, *index);

  let bytes = match std::fs::read(&path) {
    Ok(bytes) => bytes,
    Err(e) if e.kind() == ErrorKind::NotFound => {
      debug!("Diff log {} not written yet", path.display());
      return Vec::new();
    }
    Err(e) => {
      warn!("Failed to read diff log {}: {e}", path.display());
      return Vec::new();
    }
  };

  let records = match parse_diff_log(&bytes) {
    Ok(records) => records,
    Err(e) => {
      // A writer may still be mid-file; retried on the next request.
      warn!("Failed to parse diff log {}: {e}", path.display());
      return Vec::new();
    }
  };

  *index += 1;
  if remove_consumed && let Err(e) = std::fs::remove_file(&path) {
    warn!("Failed to remove consumed log {}: {e}", path.display());
  }

  debug!("Loaded {} records from {}", records.len(), path.display());
  records
}
