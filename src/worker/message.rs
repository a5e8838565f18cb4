use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::activate::ActivationReport;
use super::ServiceWorker;
use crate::cache::CacheStorage;
use crate::net::Network;

/// Messages a client page can post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Activate the waiting worker now
  SkipWaiting,
  /// Reply with the current cache names and version
  GetCacheInfo,
  /// Any other message type; ignored
  #[serde(other)]
  Unknown,
}

impl ClientMessage {
  pub fn from_json(raw: &str) -> Result<Self> {
    serde_json::from_str(raw).map_err(|e| eyre!("Invalid client message {}: {}", raw, e))
  }
}

/// Reply to `GET_CACHE_INFO`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
  pub cache_name: String,
  pub api_cache_name: String,
  pub version: String,
  pub app: String,
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  pub fn cache_info(&self) -> CacheInfo {
    CacheInfo {
      cache_name: self.config.static_cache_name(),
      api_cache_name: self.config.api_cache_name(),
      version: self.config.version_tag(),
      app: self.config.app.clone(),
    }
  }

  /// Handle a message from a client page.
  ///
  /// `reply` is the port `GET_CACHE_INFO` answers on. Returns the activation
  /// report when the message caused this worker to activate.
  pub async fn handle_message(
    &self,
    message: ClientMessage,
    reply: Option<oneshot::Sender<CacheInfo>>,
  ) -> Option<ActivationReport> {
    match message {
      ClientMessage::SkipWaiting => {
        info!("Client requested SKIP_WAITING");
        self.skip_waiting();
        match self.try_activate().await {
          Ok(report) => report,
          Err(e) => {
            error!(error = %e, "Activation after SKIP_WAITING failed");
            None
          }
        }
      }
      ClientMessage::GetCacheInfo => {
        debug!("Client requested cache info");
        match reply {
          Some(port) => {
            if port.send(self.cache_info()).is_err() {
              debug!("Cache info reply port already closed");
            }
          }
          None => warn!("GET_CACHE_INFO received without a reply port"),
        }
        None
      }
      ClientMessage::Unknown => {
        debug!("Ignoring unknown client message");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::config::WorkerConfig;
  use crate::net::mock::ScriptedNetwork;
  use crate::worker::WorkerState;

  fn worker() -> ServiceWorker<SqliteStorage, ScriptedNetwork> {
    ServiceWorker::new(
      WorkerConfig::default(),
      SqliteStorage::open_in_memory().unwrap(),
      ScriptedNetwork::offline(),
    )
  }

  #[test]
  fn test_parse_messages() {
    assert_eq!(
      ClientMessage::from_json(r#"{"type":"SKIP_WAITING"}"#).unwrap(),
      ClientMessage::SkipWaiting
    );
    assert_eq!(
      ClientMessage::from_json(r#"{"type":"GET_CACHE_INFO"}"#).unwrap(),
      ClientMessage::GetCacheInfo
    );
    assert_eq!(
      ClientMessage::from_json(r#"{"type":"PING"}"#).unwrap(),
      ClientMessage::Unknown
    );
    assert!(ClientMessage::from_json("{}").is_err());
  }

  #[test]
  fn test_cache_info_wire_format() {
    let info = worker().cache_info();
    let json = serde_json::to_value(&info).unwrap();

    assert_eq!(
      json,
      serde_json::json!({
        "cacheName": "quran-quiz-cache-v27",
        "apiCacheName": "versets-cache-v27",
        "version": "V27",
        "app": "quiz-numero-sans-API",
      })
    );
  }

  #[tokio::test]
  async fn test_get_cache_info_replies_on_port() {
    let worker = worker();
    let (tx, rx) = oneshot::channel();

    let activation = worker.handle_message(ClientMessage::GetCacheInfo, Some(tx)).await;

    assert!(activation.is_none());
    assert_eq!(rx.await.unwrap(), worker.cache_info());
  }

  #[tokio::test]
  async fn test_get_cache_info_without_port_is_harmless() {
    let worker = worker();
    assert!(worker.handle_message(ClientMessage::GetCacheInfo, None).await.is_none());
  }

  #[tokio::test]
  async fn test_skip_waiting_activates_waiting_worker() {
    let worker = worker();
    worker.clients().register("tab-1", Some("v26".to_string()));
    // Installed without having asked to skip waiting
    worker.lifecycle.transition(WorkerState::Installed);

    assert!(worker.try_activate().await.unwrap().is_none());
    assert_eq!(worker.state(), WorkerState::Installed);

    let activation = worker.handle_message(ClientMessage::SkipWaiting, None).await;

    assert_eq!(activation.unwrap().claimed, 1);
    assert_eq!(worker.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_skip_waiting_when_active_is_noop() {
    let worker = worker();
    worker.activate().await.unwrap();

    assert!(worker.handle_message(ClientMessage::SkipWaiting, None).await.is_none());
    assert_eq!(worker.state(), WorkerState::Activated);
  }
}
