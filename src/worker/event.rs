use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

use super::{ActivationReport, CacheInfo, ClientMessage, InstallReport, ServiceWorker};
use crate::cache::{CacheStorage, Served};
use crate::net::{Network, Request};

/// Events the hosting runtime delivers to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Fetch(Request),
  Message {
    message: ClientMessage,
    /// Reply port for messages that answer
    reply: Option<oneshot::Sender<CacheInfo>>,
  },
}

/// Result of handling one event
#[derive(Debug)]
pub enum EventOutcome {
  /// Install finished; `activation` is set when the worker went on to activate
  Installed {
    report: InstallReport,
    activation: Option<ActivationReport>,
  },
  /// `None` when cleaning up old caches failed
  Activated(Option<ActivationReport>),
  Response(Served),
  Message {
    activation: Option<ActivationReport>,
  },
}

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  /// Route an event to its handler.
  ///
  /// Never fails: errors are logged and fetches always get a response.
  pub async fn dispatch(&self, event: WorkerEvent) -> EventOutcome {
    match event {
      WorkerEvent::Install => {
        let report = self.install().await;
        let activation = self.try_activate().await.unwrap_or_else(|e| {
          error!(error = %e, "Activation after install failed");
          None
        });
        EventOutcome::Installed { report, activation }
      }
      WorkerEvent::Activate => match self.activate().await {
        Ok(report) => EventOutcome::Activated(Some(report)),
        Err(e) => {
          error!(error = %e, "Failed to clean up old caches");
          EventOutcome::Activated(None)
        }
      },
      WorkerEvent::Fetch(request) => EventOutcome::Response(self.handle_fetch(request).await),
      WorkerEvent::Message { message, reply } => EventOutcome::Message {
        activation: self.handle_message(message, reply).await,
      },
    }
  }
}

struct Envelope {
  event: WorkerEvent,
  respond_to: oneshot::Sender<EventOutcome>,
}

/// Feeds events to a worker from a channel, the way a runtime would.
///
/// Lifecycle and message events are handled one at a time, in order, and
/// each finishes before the next starts. Fetches are handed off to their own
/// task so requests in flight interleave with each other.
#[derive(Clone)]
pub struct EventLoop {
  tx: mpsc::UnboundedSender<Envelope>,
}

impl EventLoop {
  pub fn spawn<S: CacheStorage, N: Network>(worker: Arc<ServiceWorker<S, N>>) -> Self {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
      while let Some(Envelope { event, respond_to }) = rx.recv().await {
        if matches!(event, WorkerEvent::Fetch(_)) {
          let worker = Arc::clone(&worker);
          tokio::spawn(async move {
            let outcome = worker.dispatch(event).await;
            // Ignore send errors - the requester may have gone away
            let _ = respond_to.send(outcome);
          });
        } else {
          let outcome = worker.dispatch(event).await;
          let _ = respond_to.send(outcome);
        }
      }
    });

    Self { tx }
  }

  /// Deliver an event and wait for its outcome.
  pub async fn send(&self, event: WorkerEvent) -> Result<EventOutcome> {
    let (respond_to, rx) = oneshot::channel();
    self
      .tx
      .send(Envelope { event, respond_to })
      .map_err(|_| eyre!("Worker event loop has stopped"))?;

    rx.await
      .map_err(|_| eyre!("Worker dropped the event without responding"))
  }
}
