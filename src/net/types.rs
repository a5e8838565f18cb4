use serde::{Deserialize, Serialize};

/// An intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  /// Upper-cased HTTP method
  pub method: String,
  /// Absolute URL
  pub url: String,
  pub headers: Vec<(String, String)>,
}

impl Request {
  pub fn new(method: &str, url: impl Into<String>) -> Self {
    Self {
      method: method.to_ascii_uppercase(),
      url: url.into(),
      headers: Vec::new(),
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new("GET", url)
  }

  #[allow(dead_code)]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// Lower-cased extension of the last URL path segment, if any.
  ///
  /// Query strings and fragments are ignored, so `/app.js?v=3` yields `js`.
  pub fn path_extension(&self) -> Option<String> {
    let parsed = url::Url::parse(&self.url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
      return None;
    }
    Some(ext.to_ascii_lowercase())
  }
}

/// A full response snapshot: status line, headers and body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  #[serde(default)]
  pub status_text: String,
  #[serde(default)]
  pub headers: Vec<(String, String)>,
  #[serde(default)]
  pub body: Vec<u8>,
}

impl Response {
  /// Build a locally synthesized response. The status text is left empty,
  /// as it is for responses constructed inside a worker.
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Case-insensitive header lookup.
  #[allow(dead_code)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// True for any 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
