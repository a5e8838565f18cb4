//! Network transport used on cache misses.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::sync::Arc;

use super::types::{Request, Response};

/// Anything that can turn a request into a response over the network.
///
/// An `Err` means the network could not be reached (offline, DNS failure,
/// connection reset). HTTP error statuses are still `Ok` responses.
pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

impl<T: Network> Network for Arc<T> {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    (**self).fetch(request)
  }
}

/// reqwest-backed network transport
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("quiz-sw/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, &request.url);
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status();
    let headers = header_pairs(response.headers());

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body: body.to_vec(),
    })
  }
}

/// Copy every header. Values that are not valid UTF-8 are kept, lossily.
fn header_pairs(headers: &reqwest::header::HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .map(|(name, value)| {
      (
        name.as_str().to_string(),
        String::from_utf8_lossy(value.as_bytes()).into_owned(),
      )
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

  #[test]
  fn test_header_pairs_keeps_non_utf8_values() {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
    headers.insert("x-title", HeaderValue::from_bytes(b"caf\xe9").unwrap());

    let pairs = header_pairs(&headers);

    assert_eq!(pairs.len(), 2);
    assert!(pairs.contains(&("content-type".to_string(), "text/css".to_string())));
    assert!(pairs.contains(&("x-title".to_string(), "caf\u{fffd}".to_string())));
  }
}
