use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hooks::HookDefinition;

use super::retry::RetryPolicy;

/// A request template document.
///
/// ```json
/// {
///   "request": {"method": "POST", "baseURL": "https://api.example.com",
///               "path": "/users", "headers": {"X-Trace": "{{ trace }}"}, "timeout": 10},
///   "body": {"name": "{{ toUpper(name) }}"},
///   "beforeHooks": [], "afterHooks": [],
///   "caching": {"enabled": true, "ttl": 60, "keyPattern": "user-{{ id }}"},
///   "retry": {"enabled": true, "maxAttempts": 3, "initialDelay": 1000, "backoffFactor": 2}
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateDefinition {
    pub request: RequestSpec,
    /// Arbitrary JSON whose strings may contain template expressions.
    /// `null` sends no body.
    pub body: serde_json::Value,
    pub before_hooks: Vec<HookDefinition>,
    pub after_hooks: Vec<HookDefinition>,
    pub caching: CachingSpec,
    pub retry: RetrySpec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSpec {
    pub method: Option<String>,
    #[serde(rename = "baseURL")]
    pub base_url: Option<String>,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    /// Seconds. Zero keeps the client's timeout.
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CachingSpec {
    pub enabled: bool,
    /// Seconds.
    pub ttl: u64,
    pub key_pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySpec {
    pub enabled: bool,
    pub max_attempts: i64,
    /// Milliseconds.
    pub initial_delay: i64,
    pub backoff_factor: f64,
}

impl TemplateDefinition {
    pub fn parse(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(Error::Definition)
    }

    /// The body as template source, or `None` when there is no body.
    pub fn body_source(&self) -> Result<Option<String>> {
        if self.body.is_null() {
            return Ok(None);
        }
        serde_json::to_string(&self.body)
            .map(Some)
            .map_err(Error::Definition)
    }

    /// Request timeout override, if any.
    pub fn timeout(&self) -> Option<Duration> {
        (self.request.timeout > 0).then(|| Duration::from_secs(self.request.timeout))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.caching.ttl)
    }

    /// The key pattern, ignoring blank ones.
    pub fn key_pattern(&self) -> Option<&str> {
        self.caching
            .key_pattern
            .as_deref()
            .filter(|pattern| !pattern.trim().is_empty())
    }

    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        self.retry.enabled.then(|| {
            RetryPolicy::from_settings(
                self.retry.max_attempts,
                self.retry.initial_delay,
                self.retry.backoff_factor,
            )
        })
    }
}
