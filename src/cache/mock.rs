//! Storage double whose every operation fails.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::storage::CacheStorage;
use super::traits::{CachedResponse, RequestKey};
use crate::net::Response;

/// A backend that is always broken, e.g. a corrupt or locked database.
///
/// Counts how many operations were attempted.
#[derive(Default)]
pub struct BrokenStorage {
  attempts: AtomicUsize,
}

impl BrokenStorage {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn attempts(&self) -> usize {
    self.attempts.load(Ordering::SeqCst)
  }

  fn fail<T>(&self, op: &str) -> Result<T> {
    self.attempts.fetch_add(1, Ordering::SeqCst);
    Err(eyre!("cache storage unavailable: {}", op))
  }
}

impl CacheStorage for BrokenStorage {
  fn create_cache(&self, _cache_name: &str) -> Result<()> {
    self.fail("create_cache")
  }

  fn cache_names(&self) -> Result<Vec<String>> {
    self.fail("cache_names")
  }

  fn delete(&self, _cache_name: &str) -> Result<bool> {
    self.fail("delete")
  }

  fn get(&self, _cache_name: &str, _key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.fail("get")
  }

  fn get_any(&self, _key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.fail("get_any")
  }

  fn put(&self, _cache_name: &str, _key: &RequestKey, _response: &Response) -> Result<()> {
    self.fail("put")
  }

  fn put_all(&self, _cache_name: &str, _entries: &[(RequestKey, Response)]) -> Result<()> {
    self.fail("put_all")
  }

  fn entry_keys(&self, _cache_name: &str) -> Result<Vec<RequestKey>> {
    self.fail("entry_keys")
  }
}
