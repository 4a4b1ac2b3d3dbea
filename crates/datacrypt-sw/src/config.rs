//! Controller configuration.
//!
//! Loaded once per worker instantiation and never mutated afterwards.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CacheControllerError, Result};

/// Offline cache controller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Origin the worker is registered for.
    pub origin: String,

    /// Version label shared by both cache generations.
    pub version: String,

    /// Prefix of the static generation name.
    pub static_prefix: String,

    /// Prefix of the dynamic generation name.
    pub dynamic_prefix: String,

    /// Paths precached on install.
    pub core_assets: Vec<String>,

    /// Shell document served to offline navigations.
    pub offline_shell: String,

    /// Patterns routed to network-first, checked before `cache_first`.
    pub network_first: Vec<String>,

    /// Patterns routed to cache-first.
    pub cache_first: Vec<String>,

    /// Maximum entries kept in the dynamic generation.
    pub max_dynamic_entries: usize,

    /// Seconds between janitor passes.
    pub trim_interval_secs: u64,

    /// POST endpoint receiving OS share actions.
    pub share_target_path: String,

    /// Notification presentation.
    pub notification: NotificationConfig,

    /// Activate a freshly installed worker without waiting for pages to close.
    pub skip_waiting_on_install: bool,
}

/// Defaults used when a push payload omits fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub icon: String,
    pub badge: String,
    pub default_title: String,
    pub default_body: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080/".to_string(),
            version: "v3.0".to_string(),
            static_prefix: "static".to_string(),
            dynamic_prefix: "dynamic".to_string(),
            core_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/assets/css/main.css".to_string(),
                "/assets/css/themes.css".to_string(),
                "/assets/js/main.js".to_string(),
                "/assets/js/i18n.js".to_string(),
                "/assets/icons/icon-192x192.png".to_string(),
                "/assets/icons/icon-512x512.png".to_string(),
            ],
            offline_shell: "/index.html".to_string(),
            network_first: vec![
                r"^/api/".to_string(),
                r"\.json(\?.*)?$".to_string(),
                r"^/share-target(?:[/?]|$)".to_string(),
            ],
            cache_first: vec![
                r"\.(?:png|jpe?g|gif|webp|svg|ico|css|js|woff2?|ttf)(\?.*)?$".to_string(),
                r"^/assets/".to_string(),
            ],
            max_dynamic_entries: 50,
            trim_interval_secs: 24 * 60 * 60,
            share_target_path: "/share-target".to_string(),
            notification: NotificationConfig::default(),
            skip_waiting_on_install: true,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            icon: "/assets/icons/icon-192x192.png".to_string(),
            badge: "/assets/icons/badge-72x72.png".to_string(),
            default_title: "DataCrypt Labs".to_string(),
            default_body: "New insights are available.".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Parse a JSON document; omitted fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CacheControllerError::config(e.to_string()))
    }

    /// Config for a different version label.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Config for a different origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Name of the current static generation, e.g. `static-v3.0`.
    pub fn static_cache_name(&self) -> String {
        format!("{}-{}", self.static_prefix, self.version)
    }

    /// Name of the current dynamic generation, e.g. `dynamic-v3.0`.
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-{}", self.dynamic_prefix, self.version)
    }

    /// Interval between janitor passes.
    pub fn trim_interval(&self) -> Duration {
        Duration::from_secs(self.trim_interval_secs)
    }

    /// Parsed origin.
    pub fn origin_url(&self) -> Result<Url> {
        let url = Url::parse(&self.origin)?;
        if url.cannot_be_a_base() {
            return Err(CacheControllerError::config(format!(
                "origin is not a base URL: {}",
                self.origin
            )));
        }
        Ok(url)
    }

    /// Resolve a site path against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.origin_url()?.join(path)?)
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.origin_url()?;
        if self.version.trim().is_empty() {
            return Err(CacheControllerError::config("version label is empty"));
        }
        if self.static_cache_name() == self.dynamic_cache_name() {
            return Err(CacheControllerError::config(
                "static and dynamic generations share a name",
            ));
        }
        if self.max_dynamic_entries == 0 {
            return Err(CacheControllerError::config("max_dynamic_entries must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_names() {
        let config = ControllerConfig::default();
        assert_eq!(config.static_cache_name(), "static-v3.0");
        assert_eq!(config.dynamic_cache_name(), "dynamic-v3.0");

        let next = config.with_version("v4.0");
        assert_eq!(next.static_cache_name(), "static-v4.0");
        assert_eq!(next.dynamic_cache_name(), "dynamic-v4.0");
    }

    #[test]
    fn test_from_json_partial() {
        let config = ControllerConfig::from_json(
            r#"{ "version": "v5.1", "max_dynamic_entries": 10 }"#,
        )
        .unwrap();

        assert_eq!(config.version, "v5.1");
        assert_eq!(config.max_dynamic_entries, 10);
        assert_eq!(config.offline_shell, "/index.html");
        assert_eq!(config.trim_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(matches!(
            ControllerConfig::from_json("{ not json"),
            Err(CacheControllerError::Config(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(ControllerConfig::default().validate().is_ok());

        let mut config = ControllerConfig::default();
        config.dynamic_prefix = config.static_prefix.clone();
        assert!(config.validate().is_err());

        let config = ControllerConfig::default().with_origin("mailto:ops@example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve() {
        let config = ControllerConfig::default().with_origin("https://datacrypt.test/");
        let url = config.resolve("/assets/css/main.css").unwrap();
        assert_eq!(url.as_str(), "https://datacrypt.test/assets/css/main.css");
    }
}
