//! Request classification.
//!
//! Rules are evaluated top-down and the first match wins. Network-first rules
//! always precede cache-first rules; anything unmatched falls through to
//! stale-while-revalidate.

use datacrypt_net::Request;
use http::Method;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use crate::config::ControllerConfig;
use crate::error::{CacheControllerError, Result};

/// Caching policy applied to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkFirst => "network-first",
            Strategy::CacheFirst => "cache-first",
            Strategy::StaleWhileRevalidate => "stale-while-revalidate",
        }
    }
}

/// What the controller does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted; the page goes to the network itself.
    Passthrough,
    /// POST to the share-target endpoint.
    ShareTarget,
    /// Served through a caching strategy.
    Cached(Strategy),
}

/// A compiled pattern and the strategy it selects.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: Regex,
    pub strategy: Strategy,
}

/// Ordered request classifier.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    share_target_path: String,
    rules: Vec<RouteRule>,
}

impl Classifier {
    /// Compile the pattern lists from `config`.
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let mut rules = Vec::with_capacity(config.network_first.len() + config.cache_first.len());
        for pattern in &config.network_first {
            rules.push(compile(pattern, Strategy::NetworkFirst)?);
        }
        for pattern in &config.cache_first {
            rules.push(compile(pattern, Strategy::CacheFirst)?);
        }

        Ok(Self {
            origin: config.origin_url()?,
            share_target_path: config.share_target_path.clone(),
            rules,
        })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    /// Decide how to handle a request.
    pub fn route(&self, request: &Request) -> Route {
        if request.url.origin() != self.origin.origin() {
            return Route::Passthrough;
        }

        if request.method == Method::POST && request.url.path() == self.share_target_path {
            return Route::ShareTarget;
        }

        if request.method != Method::GET {
            return Route::Passthrough;
        }

        Route::Cached(self.classify(&request.url))
    }

    /// Strategy for a same-origin GET of `url`.
    pub fn classify(&self, url: &Url) -> Strategy {
        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        let strategy = self
            .rules
            .iter()
            .find(|rule| rule.pattern.is_match(&target))
            .map(|rule| rule.strategy)
            .unwrap_or(Strategy::StaleWhileRevalidate);

        trace!(url = %url, strategy = strategy.as_str(), "Classified request");
        strategy
    }
}

fn compile(pattern: &str, strategy: Strategy) -> Result<RouteRule> {
    let pattern = Regex::new(pattern)
        .map_err(|e| CacheControllerError::config(format!("bad pattern '{}': {}", pattern, e)))?;
    Ok(RouteRule { pattern, strategy })
}
