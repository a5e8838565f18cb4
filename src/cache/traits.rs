//! Core types for the named-cache system.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::net::{Request, Response};

/// Identity of a cached request: method plus absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: impl Into<String>) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.into(),
    }
  }

  /// Stable, fixed-length storage key for this request.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl From<&Request> for RequestKey {
  fn from(request: &Request) -> Self {
    Self::new(&request.method, request.url.clone())
  }
}

/// A response read back from a named cache.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  /// Name of the cache the entry was found in
  pub cache_name: String,
  pub response: Response,
  /// When the entry was last written
  pub cached_at: DateTime<Utc>,
}

/// A response handed back to the requester, with where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache {
        cache_name: cached.cache_name,
        cached_at: cached.cached_at,
      },
    }
  }

  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
    }
  }

  /// A response synthesized locally because neither cache nor network could answer.
  pub fn fallback(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Fallback,
    }
  }

  #[allow(dead_code)]
  pub fn is_from_cache(&self) -> bool {
    matches!(self.source, ResponseSource::Cache { .. })
  }
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored snapshot; no network contact
  Cache {
    cache_name: String,
    cached_at: DateTime<Utc>,
  },
  /// Fresh from the network (any status)
  Network,
  /// Offline stub built by the worker
  Fallback,
}

impl std::fmt::Display for ResponseSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ResponseSource::Cache { cache_name, .. } => write!(f, "cache ({})", cache_name),
      ResponseSource::Network => write!(f, "network"),
      ResponseSource::Fallback => write!(f, "offline fallback"),
    }
  }
}
