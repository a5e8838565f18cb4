//! Scripted network for tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::client::Network;
use super::types::{Request, Response};

/// Serves canned responses by URL and counts every fetch.
///
/// Unknown URLs get a 404. While offline, every fetch fails.
#[derive(Default)]
pub struct ScriptedNetwork {
  routes: Mutex<HashMap<String, Response>>,
  calls: AtomicUsize,
  offline: AtomicBool,
}

impl ScriptedNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn offline() -> Self {
    let network = Self::default();
    network.set_offline(true);
    network
  }

  pub fn with_route(self, url: &str, response: Response) -> Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable: {}", request.url));
    }

    let response = self.routes.lock().unwrap().get(&request.url).cloned();
    Ok(response.unwrap_or_else(|| Response::new(404, "not found")))
  }
}
