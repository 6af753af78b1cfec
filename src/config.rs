//! Application configuration loaded from environment variables.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::resilience::{BreakerConfig, ResilienceConfig, RetryPolicy};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Application ===
    /// Application name reported by health and info endpoints.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application version.
    #[serde(default = "default_app_version")]
    pub app_version: String,

    /// Human readable description.
    #[serde(default = "default_app_description")]
    pub app_description: String,

    /// Contact name published in info and OpenAPI.
    #[serde(default = "default_contact_name")]
    pub app_contact_name: String,

    /// Contact email published in info and OpenAPI.
    #[serde(default = "default_contact_email")]
    pub app_contact_email: String,

    /// Active profiles (comma separated, e.g. "dev,local").
    #[serde(default)]
    pub app_profiles: Vec<String>,

    // === Server Configuration ===
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,

    // === Consul ===
    /// Consul agent host.
    #[serde(default = "default_consul_host")]
    pub consul_host: String,

    /// Consul agent HTTP port.
    #[serde(default = "default_consul_port")]
    pub consul_port: u16,

    /// Consul agent scheme (http or https).
    #[serde(default = "default_consul_scheme")]
    pub consul_scheme: String,

    /// ACL token sent as X-Consul-Token.
    #[serde(default)]
    pub consul_token: Option<String>,

    /// Datacenter to query (agent default if unset).
    #[serde(default)]
    pub consul_datacenter: Option<String>,

    /// Whether discovery is enabled. Reported only.
    #[serde(default = "default_true")]
    pub consul_discovery_enabled: bool,

    /// Whether Consul config is enabled. Reported only.
    #[serde(default = "default_true")]
    pub consul_config_enabled: bool,

    /// Only return instances whose checks are passing.
    #[serde(default)]
    pub consul_passing_only: bool,

    /// Overall HTTP timeout for registry calls in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    // === Resilience ===
    /// Policy name used in logs and metric labels.
    #[serde(default = "default_resilience_name")]
    pub resilience_name: String,

    /// Maximum attempts per call, including the first one.
    #[serde(default = "default_max_attempts")]
    pub resilience_max_attempts: u32,

    /// Initial wait between attempts in milliseconds.
    #[serde(default = "default_wait_ms")]
    pub resilience_wait_ms: u64,

    /// Backoff multiplier applied per attempt.
    #[serde(default = "default_backoff_multiplier")]
    pub resilience_backoff_multiplier: f64,

    /// Upper bound for the wait between attempts in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub resilience_max_wait_ms: u64,

    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub resilience_failure_threshold: u32,

    /// Seconds the breaker stays open before probing.
    #[serde(default = "default_open_duration_s")]
    pub resilience_open_duration_s: u64,

    /// Successful probes needed to close a half-open breaker.
    #[serde(default = "default_half_open_successes")]
    pub resilience_half_open_successes: u32,

    /// Time limit per attempt in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub resilience_timeout_ms: u64,

    /// Service names returned by the async listing when the registry is down.
    #[serde(default = "default_fallback_services")]
    pub fallback_services: Vec<String>,

    /// Count instances without a reported status as healthy.
    #[serde(default = "default_true")]
    pub discovery_unknown_status_healthy: bool,

    // === CORS ===
    /// Allowed origins ("*" for any).
    #[serde(default = "default_cors_origins")]
    pub cors_allowed_origins: Vec<String>,

    /// Preflight cache lifetime in seconds.
    #[serde(default = "default_cors_max_age")]
    pub cors_max_age_s: u64,

    // === Observability ===
    /// Install the Prometheus recorder and expose /metrics.
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Emit logs as JSON lines.
    #[serde(default)]
    pub log_json: bool,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_app_name() -> String {
    "consul-discovery".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_app_description() -> String {
    "Consul Discovery Service".to_string()
}

fn default_contact_name() -> String {
    "Platform Team".to_string()
}

fn default_contact_email() -> String {
    "platform@example.com".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_consul_host() -> String {
    "localhost".to_string()
}

fn default_consul_port() -> u16 {
    8500
}

fn default_consul_scheme() -> String {
    "http".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_resilience_name() -> String {
    "consul-service".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_wait_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_wait_ms() -> u64 {
    5000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_duration_s() -> u64 {
    30
}

fn default_half_open_successes() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_fallback_services() -> Vec<String> {
    vec!["consul".to_string()]
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_max_age() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            app_version: default_app_version(),
            app_description: default_app_description(),
            app_contact_name: default_contact_name(),
            app_contact_email: default_contact_email(),
            app_profiles: Vec::new(),
            port: default_port(),
            consul_host: default_consul_host(),
            consul_port: default_consul_port(),
            consul_scheme: default_consul_scheme(),
            consul_token: None,
            consul_datacenter: None,
            consul_discovery_enabled: true,
            consul_config_enabled: true,
            consul_passing_only: false,
            http_timeout_ms: default_http_timeout_ms(),
            resilience_name: default_resilience_name(),
            resilience_max_attempts: default_max_attempts(),
            resilience_wait_ms: default_wait_ms(),
            resilience_backoff_multiplier: default_backoff_multiplier(),
            resilience_max_wait_ms: default_max_wait_ms(),
            resilience_failure_threshold: default_failure_threshold(),
            resilience_open_duration_s: default_open_duration_s(),
            resilience_half_open_successes: default_half_open_successes(),
            resilience_timeout_ms: default_timeout_ms(),
            fallback_services: default_fallback_services(),
            discovery_unknown_status_healthy: true,
            cors_allowed_origins: default_cors_origins(),
            cors_max_age_s: default_cors_max_age(),
            metrics_enabled: true,
            rust_log: default_log_level(),
            log_json: false,
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build configuration from explicit key/value pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(vars)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if self.app_name.trim().is_empty() {
            return Err("APP_NAME must not be empty".to_string());
        }

        if self.consul_host.trim().is_empty() {
            return Err("CONSUL_HOST must not be empty".to_string());
        }

        if self.consul_port == 0 {
            return Err("CONSUL_PORT must be between 1 and 65535".to_string());
        }

        if !matches!(self.consul_scheme.as_str(), "http" | "https") {
            return Err("CONSUL_SCHEME must be http or https".to_string());
        }

        if self.resilience_max_attempts == 0 {
            return Err("RESILIENCE_MAX_ATTEMPTS must be at least 1".to_string());
        }

        if self.resilience_failure_threshold == 0 {
            return Err("RESILIENCE_FAILURE_THRESHOLD must be at least 1".to_string());
        }

        if self.resilience_half_open_successes == 0 {
            return Err("RESILIENCE_HALF_OPEN_SUCCESSES must be at least 1".to_string());
        }

        if self.resilience_backoff_multiplier < 1.0 {
            return Err("RESILIENCE_BACKOFF_MULTIPLIER must be >= 1.0".to_string());
        }

        if self.resilience_timeout_ms == 0 {
            return Err("RESILIENCE_TIMEOUT_MS must be positive".to_string());
        }

        Ok(())
    }

    /// Base URL of the Consul agent HTTP API.
    pub fn consul_base_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&format!(
            "{}://{}:{}/",
            self.consul_scheme, self.consul_host, self.consul_port
        ))
    }

    /// Resilience settings for registry calls.
    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig {
            name: self.resilience_name.clone(),
            retry: RetryPolicy {
                max_attempts: self.resilience_max_attempts,
                initial_delay_ms: self.resilience_wait_ms,
                backoff_multiplier: self.resilience_backoff_multiplier,
                max_delay_ms: self.resilience_max_wait_ms,
            },
            breaker: BreakerConfig {
                failure_threshold: self.resilience_failure_threshold,
                open_duration: Duration::from_secs(self.resilience_open_duration_s),
                half_open_successes: self.resilience_half_open_successes,
            },
            timeout: Duration::from_millis(self.resilience_timeout_ms),
        }
    }

    /// Active profiles, falling back to "default" when none are set.
    pub fn active_profiles(&self) -> Vec<String> {
        let active: Vec<String> = self
            .app_profiles
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        if active.is_empty() {
            vec!["default".to_string()]
        } else {
            active
        }
    }

    /// Flattened view of the configuration keyed by dotted property name.
    ///
    /// The ACL token is never exposed.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut props = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            props.insert(key.to_string(), value);
        };

        put("app.name", self.app_name.clone());
        put("app.version", self.app_version.clone());
        put("app.description", self.app_description.clone());
        put("app.contact.name", self.app_contact_name.clone());
        put("app.contact.email", self.app_contact_email.clone());
        put("app.profiles", self.active_profiles().join(","));
        put("server.port", self.port.to_string());
        put("consul.host", self.consul_host.clone());
        put("consul.port", self.consul_port.to_string());
        put("consul.scheme", self.consul_scheme.clone());
        put(
            "consul.datacenter",
            self.consul_datacenter.clone().unwrap_or_default(),
        );
        put(
            "consul.discovery.enabled",
            self.consul_discovery_enabled.to_string(),
        );
        put(
            "consul.config.enabled",
            self.consul_config_enabled.to_string(),
        );
        put("consul.passing-only", self.consul_passing_only.to_string());
        put("consul.token.set", self.consul_token.is_some().to_string());
        put("http.timeout-ms", self.http_timeout_ms.to_string());
        put("resilience.name", self.resilience_name.clone());
        put(
            "resilience.retry.max-attempts",
            self.resilience_max_attempts.to_string(),
        );
        put("resilience.retry.wait-ms", self.resilience_wait_ms.to_string());
        put(
            "resilience.retry.backoff-multiplier",
            self.resilience_backoff_multiplier.to_string(),
        );
        put(
            "resilience.retry.max-wait-ms",
            self.resilience_max_wait_ms.to_string(),
        );
        put(
            "resilience.breaker.failure-threshold",
            self.resilience_failure_threshold.to_string(),
        );
        put(
            "resilience.breaker.open-duration-s",
            self.resilience_open_duration_s.to_string(),
        );
        put(
            "resilience.breaker.half-open-successes",
            self.resilience_half_open_successes.to_string(),
        );
        put(
            "resilience.time-limiter.timeout-ms",
            self.resilience_timeout_ms.to_string(),
        );
        put("discovery.fallback-services", self.fallback_services.join(","));
        put(
            "discovery.unknown-status-healthy",
            self.discovery_unknown_status_healthy.to_string(),
        );
        put("cors.allowed-origins", self.cors_allowed_origins.join(","));
        put("cors.max-age-s", self.cors_max_age_s.to_string());
        put("metrics.enabled", self.metrics_enabled.to_string());
        put("logging.level", self.rust_log.clone());
        put("logging.json", self.log_json.to_string());

        props
    }

    /// Look up a single property by dotted key.
    pub fn property(&self, key: &str) -> Option<String> {
        self.properties().remove(key)
    }

    /// Keys whose values differ between two configurations.
    pub fn changed_keys(&self, other: &Config) -> Vec<String> {
        let ours = self.properties();
        let theirs = other.properties();

        ours.iter()
            .filter(|(key, value)| theirs.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect()
    }
}
