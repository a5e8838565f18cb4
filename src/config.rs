use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::net::Request;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub worker: WorkerConfig,
  #[serde(default)]
  pub storage: StorageConfig,
  #[serde(default)]
  pub log: LogConfig,
}

/// Everything the worker needs to know about the deployed app.
///
/// Cache names are derived from the prefixes and the version, so bumping
/// `version` is what invalidates every cache from the previous deployment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
  /// Deployment version embedded in cache names (e.g. "v27")
  pub version: String,
  /// App name reported to clients
  pub app: String,
  pub static_cache_prefix: String,
  pub api_cache_prefix: String,
  /// Origin the app is served from; static assets are resolved against it
  pub origin: String,
  pub base_path: String,
  /// Paths relative to `base_path` to precache at install time
  pub static_assets: Vec<String>,
  /// Requests whose URL starts with this prefix use the API strategy
  pub api_prefix: String,
  /// Extensions (without the dot) that are cached opportunistically
  pub cacheable_extensions: Vec<String>,
  /// Text of the offline stub returned for API requests
  pub offline_message: String,
  /// Body of the 404 returned for static requests while offline
  pub unavailable_message: String,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      version: "v27".to_string(),
      app: "quiz-numero-sans-API".to_string(),
      static_cache_prefix: "quran-quiz-cache".to_string(),
      api_cache_prefix: "versets-cache".to_string(),
      origin: "https://localhost".to_string(),
      base_path: "/quiz-numero-sans-API".to_string(),
      static_assets: [
        "/",
        "/index.html",
        "/manifest.json",
        "/images/icon-192.png",
        "/images/icon-512.png",
        "/images/icon-maskable-192.png",
        "/images/icon-maskable-512.png",
        "/images/screenshot-1.png",
        "/images/screenshot-2.png",
      ]
      .iter()
      .map(|s| s.to_string())
      .collect(),
      api_prefix: "https://api.alquran.cloud/v1/ayah/".to_string(),
      cacheable_extensions: ["js", "css", "png", "jpg"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      offline_message: "Verset non disponible hors connexion.".to_string(),
      unavailable_message: "Ressource indisponible".to_string(),
    }
  }
}

impl WorkerConfig {
  pub fn static_cache_name(&self) -> String {
    format!("{}-{}", self.static_cache_prefix, self.version)
  }

  pub fn api_cache_name(&self) -> String {
    format!("{}-{}", self.api_cache_prefix, self.version)
  }

  /// Caches that survive activation.
  pub fn whitelist(&self) -> [String; 2] {
    [self.static_cache_name(), self.api_cache_name()]
  }

  /// Version as shown to clients ("v27" -> "V27").
  pub fn version_tag(&self) -> String {
    self.version.to_uppercase()
  }

  /// Absolute URLs of the static assets, in list order.
  pub fn static_asset_urls(&self) -> Vec<String> {
    let origin = self.origin.trim_end_matches('/');
    let base = self.base_path.trim_end_matches('/');
    self
      .static_assets
      .iter()
      .map(|path| format!("{}{}{}", origin, base, path))
      .collect()
  }

  pub fn is_api_request(&self, url: &str) -> bool {
    url.starts_with(&self.api_prefix)
  }

  /// Whether a successful static response for this request may be cached.
  pub fn is_cacheable_asset(&self, request: &Request) -> bool {
    request.path_extension().is_some_and(|ext| {
      self
        .cacheable_extensions
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&ext))
    })
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// SQLite database path (default: $XDG_DATA_HOME/quiz-sw/cache.db)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Filter directive, e.g. "info" or "quiz_sw=debug"
  pub level: String,
  /// Also write logs to this file
  pub file: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./quiz-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/quiz-sw/config.yaml
  ///
  /// Falls back to the built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_env();

    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("quiz-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("quiz-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    Ok(config)
  }

  /// Apply environment overrides.
  ///
  /// QUIZ_SW_VERSION replaces the worker version.
  fn apply_env(&mut self) {
    if let Ok(version) = std::env::var("QUIZ_SW_VERSION") {
      if !version.trim().is_empty() {
        self.worker.version = version.trim().to_string();
      }
    }
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.storage.path {
      Some(path) => Ok(path.clone()),
      None => crate::cache::SqliteStorage::default_path(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_cache_names() {
    let worker = WorkerConfig::default();
    assert_eq!(worker.static_cache_name(), "quran-quiz-cache-v27");
    assert_eq!(worker.api_cache_name(), "versets-cache-v27");
    assert_eq!(worker.version_tag(), "V27");
  }

  #[test]
  fn test_static_asset_urls() {
    let worker = WorkerConfig::default();
    let urls = worker.static_asset_urls();

    assert_eq!(urls.len(), 9);
    assert_eq!(urls[0], "https://localhost/quiz-numero-sans-API/");
    assert_eq!(urls[1], "https://localhost/quiz-numero-sans-API/index.html");
  }

  #[test]
  fn test_api_classification() {
    let worker = WorkerConfig::default();
    assert!(worker.is_api_request("https://api.alquran.cloud/v1/ayah/2:255/fr.hamidullah"));
    assert!(!worker.is_api_request("https://api.alquran.cloud/v1/surah/2"));
    assert!(!worker.is_api_request("https://localhost/quiz-numero-sans-API/index.html"));
  }

  #[test]
  fn test_cacheable_extensions() {
    let worker = WorkerConfig::default();
    let cacheable = |url: &str| worker.is_cacheable_asset(&Request::get(url));

    assert!(cacheable("https://localhost/app.js"));
    assert!(cacheable("https://localhost/style.CSS"));
    assert!(cacheable("https://localhost/img/a.jpg?x=1"));
    assert!(!cacheable("https://localhost/img/a.jpeg"));
    assert!(!cacheable("https://localhost/data.json"));
    assert!(!cacheable("https://localhost/"));
  }

  #[test]
  fn test_partial_yaml_keeps_defaults() {
    let config = Config::from_yaml(
      r#"
worker:
  version: v28
  origin: https://example.github.io/
storage:
  path: /tmp/quiz.db
"#,
    )
    .unwrap();

    assert_eq!(config.worker.static_cache_name(), "quran-quiz-cache-v28");
    assert_eq!(config.worker.app, "quiz-numero-sans-API");
    assert_eq!(
      config.worker.static_asset_urls()[0],
      "https://example.github.io/quiz-numero-sans-API/"
    );
    assert_eq!(config.log.level, "info");
    assert_eq!(config.database_path().unwrap(), PathBuf::from("/tmp/quiz.db"));
  }

  #[test]
  fn test_example_config_parses() {
    let config = Config::from_yaml(include_str!("../config.example.yaml")).unwrap();
    let defaults = WorkerConfig::default();

    assert_eq!(config.worker.static_assets, defaults.static_assets);
    assert_eq!(config.worker.api_prefix, defaults.api_prefix);
    assert_eq!(config.worker.offline_message, defaults.offline_message);
  }

  #[test]
  fn test_empty_yaml_is_default() {
    let config = Config::from_yaml("{}").unwrap();
    assert_eq!(config.worker.version, "v27");
    assert!(config.storage.path.is_none());
  }

  #[test]
  fn test_missing_explicit_path_errors() {
    let err = Config::load(Some(Path::new("/nonexistent/quiz-sw.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
