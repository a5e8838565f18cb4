//! The fetch interceptor: lifecycle hooks, request routing and client messages.
//!
//! A `ServiceWorker` owns its configuration, a cache layer and a network
//! transport. Everything the hosting runtime would normally deliver as an
//! event is a plain async method here, and `dispatch` maps a `WorkerEvent`
//! to the right one.

mod activate;
mod event;
mod install;
mod lifecycle;
mod message;
mod router;

use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;

use crate::cache::{CacheLayer, CacheStorage};
use crate::config::WorkerConfig;
use crate::net::Network;

pub use activate::ActivationReport;
pub use event::{EventLoop, EventOutcome, WorkerEvent};
pub use install::InstallReport;
pub use lifecycle::{ClientRegistry, WorkerState};
pub use message::{CacheInfo, ClientMessage};

use lifecycle::Lifecycle;

pub struct ServiceWorker<S: CacheStorage, N: Network> {
  config: WorkerConfig,
  caches: CacheLayer<S>,
  network: N,
  lifecycle: Lifecycle,
  clients: ClientRegistry,
  /// Detached cache writes that may still be running
  background: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  pub fn new(config: WorkerConfig, storage: S, network: N) -> Self {
    Self {
      config,
      caches: CacheLayer::new(storage),
      network,
      lifecycle: Lifecycle::new(),
      clients: ClientRegistry::default(),
      background: Mutex::new(Vec::new()),
    }
  }

  pub fn config(&self) -> &WorkerConfig {
    &self.config
  }

  pub fn caches(&self) -> &CacheLayer<S> {
    &self.caches
  }

  pub fn clients(&self) -> &ClientRegistry {
    &self.clients
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  /// Wait for every detached cache write started so far.
  pub async fn settle(&self) {
    let pending = std::mem::take(
      &mut *self
        .background
        .lock()
        .unwrap_or_else(PoisonError::into_inner),
    );

    for handle in pending {
      // A panicked write is as invisible to the requester as a failed one
      let _ = handle.await;
    }
  }

  fn track_background(&self, handle: JoinHandle<()>) {
    let mut background = self
      .background
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    background.retain(|h| !h.is_finished());
    background.push(handle);
  }
}
