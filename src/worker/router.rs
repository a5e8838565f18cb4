//! Request routing and the two caching strategies.
//!
//! API requests (URL under the configured API prefix) are served from the
//! API cache first and refilled from the network on a miss. Everything else
//! is looked up in every cache, and successful responses for static file
//! types are stored in the background. Both paths always end in a response:
//! when the network is unreachable a fallback is synthesized.

use color_eyre::Result;
use tracing::{debug, error, warn};

use super::ServiceWorker;
use crate::cache::{CacheStorage, CachedResponse, NamedCache, RequestKey, Served};
use crate::net::{Network, Request, Response};

impl<S: CacheStorage, N: Network> ServiceWorker<S, N> {
  /// Handle an intercepted request.
  pub async fn handle_fetch(&self, request: Request) -> Served {
    if self.config.is_api_request(&request.url) {
      self.serve_api(&request).await
    } else {
      self.serve_static(&request).await
    }
  }

  /// Cache-first against the API cache, refilling it on a 200.
  async fn serve_api(&self, request: &Request) -> Served {
    let key = RequestKey::from(request);
    let cache_name = self.config.api_cache_name();

    let cache = match self.caches.open(&cache_name) {
      Ok(cache) => Some(cache),
      Err(e) => {
        error!(cache = %cache_name, error = %e, "Failed to open API cache");
        None
      }
    };

    if let Some(cached) = cache
      .as_ref()
      .and_then(|cache| lookup(cache.get(&key), &request.url))
    {
      debug!(url = %request.url, "Serving API response from cache");
      return Served::from_cache(cached);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 && request.is_get() {
          if let Some(cache) = &cache {
            store(cache, &key, &response);
          }
        }
        Served::from_network(response)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Network error, serving offline API response");
        Served::fallback(self.offline_api_response())
      }
    }
  }

  /// Cache-first against every cache, storing fetched static files in the background.
  async fn serve_static(&self, request: &Request) -> Served {
    let key = RequestKey::from(request);

    // Unscoped on purpose: an entry in the API cache is served here too
    if let Some(cached) = lookup(self.caches.match_any(&key), &request.url) {
      debug!(url = %request.url, cache = %cached.cache_name, "Serving asset from cache");
      return Served::from_cache(cached);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 && request.is_get() && self.config.is_cacheable_asset(request) {
          self.store_detached(key, response.clone());
        }
        Served::from_network(response)
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "Network error, serving unavailable response");
        Served::fallback(self.unavailable_response())
      }
    }
  }

  /// Write a static response without holding up the requester.
  fn store_detached(&self, key: RequestKey, response: Response) {
    let caches = self.caches.clone();
    let cache_name = self.config.static_cache_name();

    let handle = tokio::spawn(async move {
      match caches.open(&cache_name) {
        Ok(cache) => store(&cache, &key, &response),
        Err(e) => warn!(cache = %cache_name, error = %e, "Failed to open static cache"),
      }
    });

    self.track_background(handle);
  }

  /// JSON stub returned for API requests when the network is unreachable.
  pub fn offline_api_response(&self) -> Response {
    let payload = serde_json::json!({
      "code": 0,
      "status": "offline",
      "data": { "text": self.config.offline_message },
    });

    Response::new(200, payload.to_string()).with_header("Content-Type", "application/json")
  }

  /// Plain-text 404 returned for static requests when the network is unreachable.
  pub fn unavailable_response(&self) -> Response {
    Response::new(404, self.config.unavailable_message.clone())
      .with_header("Content-Type", "text/plain;charset=UTF-8")
  }
}

/// Treat a storage failure as a miss.
fn lookup(result: Result<Option<CachedResponse>>, url: &str) -> Option<CachedResponse> {
  result.unwrap_or_else(|e| {
    error!(url = %url, error = %e, "Cache lookup failed");
    None
  })
}

fn store<S: CacheStorage>(cache: &NamedCache<S>, key: &RequestKey, response: &Response) {
  match cache.put(key, response) {
    Ok(()) => debug!(url = %key.url, cache = %cache.name(), "Stored response"),
    Err(e) => warn!(url = %key.url, cache = %cache.name(), error = %e, "Failed to store response"),
  }
}
