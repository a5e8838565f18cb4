use color_eyre::Result;
use tracing::{debug, info};

use super::lifecycle::WorkerState;
use super::ServiceWorker;
use crate::cache::CacheStorage;
use crate::net::Network;

/// What the activate step cleaned up and took over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  /// Caches deleted because they are not in the whitelist
  pub deleted: Vec<String>,
  /// Open pages that switched to this worker
  pub claimed: usize,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  /// Handle the activate event.
  ///
  /// Deletes every cache outside the current whitelist, then claims all open
  /// pages. Pages are claimed and the worker becomes active even if the purge
  /// failed; the purge error is still returned.
  pub async fn activate(&self) -> Result<ActivationReport> {
    info!(version = %self.config.version, "Activating worker");
    self.lifecycle.transition(WorkerState::Activating);

    let purged = self.purge_stale_caches();

    let claimed = self.clients.claim(&self.config.version);
    info!(claimed, "Worker now controls open clients");
    self.lifecycle.transition(WorkerState::Activated);

    Ok(ActivationReport {
      deleted: purged?,
      claimed,
    })
  }

  fn purge_stale_caches(&self) -> Result<Vec<String>> {
    let whitelist = self.config.whitelist();
    let existing = self.caches.keys()?;
    debug!(?existing, "Existing caches");

    let mut deleted = Vec::new();
    for name in existing {
      if whitelist.contains(&name) {
        continue;
      }
      info!(cache = %name, "Deleting stale cache");
      if self.caches.delete(&name)? {
        deleted.push(name);
      }
    }

    Ok(deleted)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::cache::{RequestKey, SqliteStorage};
  use crate::config::WorkerConfig;
  use crate::net::mock::ScriptedNetwork;
  use crate::net::Response;

  fn storage_with(caches: &[&str]) -> Arc<SqliteStorage> {
    let storage = Arc::new(SqliteStorage::open_in_memory().unwrap());
    for name in caches {
      storage
        .put(name, &RequestKey::new("GET", "https://quiz.test/a.js"), &Response::new(200, "x"))
        .unwrap();
    }
    storage
  }

  #[tokio::test]
  async fn test_activate_deletes_only_stale_version() {
    let storage = storage_with(&[
      "quran-quiz-cache-v26",
      "quran-quiz-cache-v27",
      "versets-cache-v27",
    ]);
    let worker = ServiceWorker::new(
      WorkerConfig::default(),
      Arc::clone(&storage),
      ScriptedNetwork::new(),
    );

    let report = worker.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["quran-quiz-cache-v26"]);
    assert_eq!(
      storage.cache_names().unwrap(),
      vec!["quran-quiz-cache-v27", "versets-cache-v27"]
    );
    assert_eq!(worker.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_activate_clears_foreign_caches() {
    let storage = storage_with(&["versets-cache-v1", "other-app", "quran-quiz-cache-v27"]);
    let worker = ServiceWorker::new(
      WorkerConfig::default(),
      Arc::clone(&storage),
      ScriptedNetwork::new(),
    );

    let report = worker.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["versets-cache-v1", "other-app"]);
    assert_eq!(storage.cache_names().unwrap(), vec!["quran-quiz-cache-v27"]);
  }

  #[tokio::test]
  async fn test_activate_with_nothing_to_delete() {
    let worker = ServiceWorker::new(
      WorkerConfig::default(),
      SqliteStorage::open_in_memory().unwrap(),
      ScriptedNetwork::new(),
    );

    let report = worker.activate().await.unwrap();
    assert_eq!(report, ActivationReport::default());
  }

  #[tokio::test]
  async fn test_activate_claims_clients() {
    let worker = ServiceWorker::new(
      WorkerConfig::default(),
      SqliteStorage::open_in_memory().unwrap(),
      ScriptedNetwork::new(),
    );
    worker.clients().register("tab-1", Some("v26".to_string()));
    worker.clients().register("tab-2", None);

    let report = worker.activate().await.unwrap();

    assert_eq!(report.claimed, 2);
    assert_eq!(worker.clients().controller("tab-1"), Some("v27".to_string()));
  }
}
