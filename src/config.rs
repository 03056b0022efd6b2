use serde::Deserialize;
use std::path::Path;
use url::Url;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the precache manifest and probe path are resolved against.
  #[serde(default = "default_origin")]
  pub origin: Url,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Version tag embedded in partition names. Must change on every
  /// deployment so stale partitions are swept at activation.
  #[serde(default = "default_version")]
  pub version: String,
  #[serde(default = "default_static_prefix")]
  pub static_prefix: String,
  #[serde(default = "default_dynamic_prefix")]
  pub dynamic_prefix: String,
  /// Root-relative paths pre-populated into the static partition at
  /// install. Requests matching these exactly are served cache-first.
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  /// Paths containing this segment are routed network-first.
  #[serde(default = "default_api_marker")]
  pub api_marker: String,
  /// Document served when network-with-fallback has nothing cached.
  #[serde(default = "default_offline_fallback")]
  pub offline_fallback: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Root-relative path HEAD-probed to confirm connectivity before each
  /// queued item is considered delivered.
  #[serde(default = "default_probe_path")]
  pub probe_path: String,
  /// Minimum delay between drain passes after a probe failure.
  /// None means retry immediately on every connectivity signal.
  #[serde(default)]
  pub backoff: Option<BackoffConfig>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BackoffConfig {
  #[serde(default = "default_backoff_initial")]
  pub initial_secs: u64,
  #[serde(default = "default_backoff_max")]
  pub max_secs: u64,
}

fn default_origin() -> Url {
  Url::parse("http://localhost:8080").expect("static url")
}

fn default_version() -> String {
  "v1.0.1".to_string()
}

fn default_static_prefix() -> String {
  "outbox-static".to_string()
}

fn default_dynamic_prefix() -> String {
  "outbox-dynamic".to_string()
}

fn default_precache() -> Vec<String> {
  ["/", "/index.html", "/styles.css", "/app.js", "/manifest.json"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_api_marker() -> String {
  "/api/".to_string()
}

fn default_offline_fallback() -> String {
  "/index.html".to_string()
}

fn default_probe_path() -> String {
  "/manifest.json".to_string()
}

fn default_backoff_initial() -> u64 {
  5
}

fn default_backoff_max() -> u64 {
  300
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
    }
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_version(),
      static_prefix: default_static_prefix(),
      dynamic_prefix: default_dynamic_prefix(),
      precache: default_precache(),
      api_marker: default_api_marker(),
      offline_fallback: default_offline_fallback(),
    }
  }
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      probe_path: default_probe_path(),
      backoff: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided (an error if it does not exist)
  /// 2. ./outbox.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/outbox/config.yaml
  /// 4. Built-in defaults
  pub fn load(path: Option<&Path>) -> Result<Self> {
    if let Some(path) = path {
      return Self::from_file(path);
    }

    let local = Path::new("outbox.yaml");
    if local.exists() {
      return Self::from_file(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg = config_dir.join("outbox").join("config.yaml");
      if xdg.exists() {
        return Self::from_file(&xdg);
      }
    }

    Ok(Self::default())
  }

  fn from_file(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
    serde_yaml::from_str(&contents)
      .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
  }

  /// Name of the current static partition.
  pub fn static_partition(&self) -> String {
    format!("{}-{}", self.cache.static_prefix, self.cache.version)
  }

  /// Name of the current dynamic partition.
  pub fn dynamic_partition(&self) -> String {
    format!("{}-{}", self.cache.dynamic_prefix, self.cache.version)
  }

  /// Absolute URL of the connectivity probe.
  pub fn probe_url(&self) -> Result<Url> {
    self
      .origin
      .join(&self.sync.probe_path)
      .map_err(|e| Error::Config(format!("invalid probe path {}: {e}", self.sync.probe_path)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_partition_names_embed_version() {
    let config = Config::default();
    assert_eq!(config.static_partition(), "outbox-static-v1.0.1");
    assert_eq!(config.dynamic_partition(), "outbox-dynamic-v1.0.1");
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let config: Config = serde_yaml::from_str(
      r#"
origin: "https://demo.example"
cache:
  version: "v2"
"#,
    )
    .unwrap();

    assert_eq!(config.origin.as_str(), "https://demo.example/");
    assert_eq!(config.static_partition(), "outbox-static-v2");
    assert_eq!(config.cache.api_marker, "/api/");
    assert_eq!(config.sync.probe_path, "/manifest.json");
    assert!(config.sync.backoff.is_none());
  }

  #[test]
  fn test_probe_url_resolves_against_origin() {
    let config = Config::default();
    assert_eq!(
      config.probe_url().unwrap().as_str(),
      "http://localhost:8080/manifest.json"
    );
  }
}
