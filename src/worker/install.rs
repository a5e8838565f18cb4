use color_eyre::Result;
use tracing::{error, info, warn};

use super::activate::ActivationReport;
use super::lifecycle::WorkerState;
use super::ServiceWorker;
use crate::cache::CacheStorage;
use crate::net::Network;

/// What the install step managed to precache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  pub cache_name: String,
  /// Number of static assets stored
  pub precached: usize,
  /// True when precaching failed and the worker installed without it
  pub degraded: bool,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  /// Handle the install event.
  ///
  /// Precaches the static asset list into the static cache. A missing asset
  /// or an unreachable network leaves the cache unpopulated but never fails
  /// the install. Returns once precaching has finished either way.
  pub async fn install(&self) -> InstallReport {
    let cache_name = self.config.static_cache_name();
    info!(version = %self.config.version, cache = %cache_name, "Installing worker");

    self.lifecycle.transition(WorkerState::Installing);
    self.skip_waiting();

    let precached = match self.precache(&cache_name).await {
      Ok(count) => {
        info!(cache = %cache_name, count, "Precached static assets");
        Some(count)
      }
      Err(e) => {
        warn!(
          cache = %cache_name,
          error = %e,
          "Some static assets could not be cached, continuing in degraded mode"
        );
        None
      }
    };

    self.lifecycle.transition(WorkerState::Installed);

    InstallReport {
      cache_name,
      precached: precached.unwrap_or(0),
      degraded: precached.is_none(),
    }
  }

  async fn precache(&self, cache_name: &str) -> Result<usize> {
    let cache = self.caches.open(cache_name).inspect_err(|e| {
      error!(cache = %cache_name, error = %e, "Failed to open static cache");
    })?;

    let urls = self.config.static_asset_urls();
    cache.add_all(&self.network, &urls).await
  }

  /// Let this worker activate without waiting for older versions to let go.
  pub fn skip_waiting(&self) {
    self.lifecycle.request_skip_waiting();
  }

  /// Activate now if an installed worker is allowed to.
  ///
  /// An installed worker waits while any open page is controlled by another
  /// version, unless skip-waiting was requested. Returns `None` when the
  /// worker is not installed or still has to wait.
  pub async fn try_activate(&self) -> Result<Option<ActivationReport>> {
    if self.lifecycle.state() != WorkerState::Installed {
      return Ok(None);
    }

    if !self.lifecycle.skip_waiting_requested()
      && self.clients.controlled_by_other(&self.config.version)
    {
      info!(
        version = %self.config.version,
        "Worker installed, waiting for older version to release clients"
      );
      return Ok(None);
    }

    self.activate().await.map(Some)
  }
}
