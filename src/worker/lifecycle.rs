//! Worker lifecycle state and the registry of open client pages.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Created, no lifecycle event handled yet
  Parsed,
  /// Install handler running
  Installing,
  /// Installed, waiting to activate
  Installed,
  /// Activate handler running
  Activating,
  /// Active and controlling pages
  Activated,
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
    }
  }
}

/// Current state plus the skip-waiting flag.
pub struct Lifecycle {
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
}

impl Lifecycle {
  pub fn new() -> Self {
    Self {
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
    }
  }

  pub fn state(&self) -> WorkerState {
    *self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn transition(&self, next: WorkerState) {
    let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
    if *state != next {
      debug!(from = %*state, to = %next, "Worker state change");
      *state = next;
    }
  }

  pub fn request_skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self::new()
  }
}

/// Open client pages and the worker version controlling each.
#[derive(Debug, Default)]
pub struct ClientRegistry {
  clients: Mutex<BTreeMap<String, Option<String>>>,
}

impl ClientRegistry {
  /// Track an open page. `controller` is the version of the worker serving it, if any.
  ///
  /// The hosting runtime registers pages as they open. The CLI has none, so
  /// there the registry stays empty and the waiting gate never holds.
  #[allow(dead_code)]
  pub fn register(&self, client_id: impl Into<String>, controller: Option<String>) {
    self
      .clients
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(client_id.into(), controller);
  }

  #[allow(dead_code)]
  pub fn controller(&self, client_id: &str) -> Option<String> {
    self
      .clients
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .get(client_id)
      .cloned()
      .flatten()
  }

  /// True if some open page is still served by a different worker version.
  pub fn controlled_by_other(&self, version: &str) -> bool {
    self
      .clients
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .any(|controller| controller.as_deref().is_some_and(|v| v != version))
  }

  /// Make `version` the controller of every open page.
  ///
  /// Returns how many pages changed controller.
  pub fn claim(&self, version: &str) -> usize {
    let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
    let mut claimed = 0;
    for controller in clients.values_mut() {
      if controller.as_deref() != Some(version) {
        *controller = Some(version.to_string());
        claimed += 1;
      }
    }
    claimed
  }

  pub fn len(&self) -> usize {
    self
      .clients
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .len()
  }
}
