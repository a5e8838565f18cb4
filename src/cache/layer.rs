//! Cache layer that fronts a storage backend with named cache handles.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;

use super::storage::CacheStorage;
use super::traits::{CachedResponse, RequestKey};
use crate::net::{Network, Request, Response};

/// Entry point to every named cache in a storage backend.
///
/// Cloning is cheap; clones share the same backend.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
}

impl<S: CacheStorage> CacheLayer<S> {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Open a named cache, creating it if it does not exist.
  pub fn open(&self, cache_name: &str) -> Result<NamedCache<S>> {
    self.storage.create_cache(cache_name)?;

    Ok(NamedCache {
      storage: Arc::clone(&self.storage),
      name: cache_name.to_string(),
    })
  }

  /// Names of all existing caches, oldest first.
  pub fn keys(&self) -> Result<Vec<String>> {
    self.storage.cache_names()
  }

  pub fn delete(&self, cache_name: &str) -> Result<bool> {
    self.storage.delete(cache_name)
  }

  /// Look a request up in every cache, not just one.
  pub fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.storage.get_any(key)
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

/// Handle to a single named cache.
pub struct NamedCache<S: CacheStorage> {
  storage: Arc<S>,
  name: String,
}

impl<S: CacheStorage> NamedCache<S> {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn get(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.storage.get(&self.name, key)
  }

  pub fn put(&self, key: &RequestKey, response: &Response) -> Result<()> {
    self.storage.put(&self.name, key, response)
  }

  pub fn keys(&self) -> Result<Vec<RequestKey>> {
    self.storage.entry_keys(&self.name)
  }

  /// Fetch every URL and store all responses as one unit.
  ///
  /// All fetches run concurrently. If any of them fails or comes back with a
  /// non-2xx status, nothing is written and the first failure is returned.
  pub async fn add_all<N: Network>(&self, network: &N, urls: &[String]) -> Result<usize> {
    let requests: Vec<Request> = urls.iter().map(|url| Request::get(url.as_str())).collect();

    let fetches: Vec<_> = requests.iter().map(|request| network.fetch(request)).collect();
    let results = futures::future::join_all(fetches).await;

    let mut entries = Vec::with_capacity(requests.len());
    for (request, result) in requests.iter().zip(results) {
      let response = result?;
      if !response.is_ok() {
        return Err(eyre!(
          "Request for {} failed with status {}",
          request.url,
          response.status
        ));
      }
      entries.push((RequestKey::from(request), response));
    }

    self.storage.put_all(&self.name, &entries)?;
    Ok(entries.len())
  }
}

impl<S: CacheStorage> Clone for NamedCache<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      name: self.name.clone(),
    }
  }
}
