use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::reconcile::ConflictPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Local,
    Dev,
    Stage,
    Prod,
}

impl Deployment {
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Self::Dev,
            "stage" | "staging" => Self::Stage,
            "prod" | "production" => Self::Prod,
            _ => Self::Local,
        }
    }

    /// Stage and prod ship logs to a collector as JSON lines.
    #[must_use]
    pub fn json_logs(self) -> bool {
        matches!(self, Self::Stage | Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_url: String,

    // Change streams
    pub change_channel: String,
    pub subscription_buffer: usize,
    pub reconcile_reject_stale: bool,

    // Live views
    pub view_ready_timeout_seconds: u64,
    pub rollover_check_interval_seconds: u64,
    pub resubscribe_delay_seconds: u64,

    // API settings
    pub api_host: String,
    pub api_port: u16,
    pub max_range_days: i64,

    // Caching
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: u64,

    // Application metadata
    pub deployment: Deployment,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            change_channel: "telemetry_changes".to_string(),
            subscription_buffer: 256,
            reconcile_reject_stale: false,
            view_ready_timeout_seconds: 10,
            rollover_check_interval_seconds: 60,
            resubscribe_delay_seconds: 5,
            api_host: "0.0.0.0".to_string(),
            api_port: 3000,
            max_range_days: 90,
            cache_ttl_seconds: 300,
            cache_max_entries: 1024,
            deployment: Deployment::Local,
        }
    }
}

/// Parse `key`, falling back to `default` when unset or malformed.
fn var_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if required environment variables are not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Change streams
            change_channel: env::var("CHANGE_CHANNEL").unwrap_or(defaults.change_channel),
            subscription_buffer: var_or("SUBSCRIPTION_BUFFER", defaults.subscription_buffer).max(1),
            reconcile_reject_stale: var_or("RECONCILE_REJECT_STALE", defaults.reconcile_reject_stale),

            // Live views
            view_ready_timeout_seconds: var_or(
                "VIEW_READY_TIMEOUT_SECONDS",
                defaults.view_ready_timeout_seconds,
            ),
            rollover_check_interval_seconds: var_or(
                "ROLLOVER_CHECK_INTERVAL_SECONDS",
                defaults.rollover_check_interval_seconds,
            )
            .max(1),
            resubscribe_delay_seconds: var_or(
                "RESUBSCRIBE_DELAY_SECONDS",
                defaults.resubscribe_delay_seconds,
            ),

            // API settings
            api_host: env::var("API_HOST").unwrap_or(defaults.api_host),
            api_port: var_or("API_PORT", defaults.api_port),
            max_range_days: var_or("MAX_RANGE_DAYS", defaults.max_range_days),

            // Caching
            cache_ttl_seconds: var_or("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds),
            cache_max_entries: var_or("CACHE_MAX_ENTRIES", defaults.cache_max_entries),

            // Application metadata
            deployment: Deployment::from_str(
                &env::var("DEPLOYMENT").unwrap_or_else(|_| "local".to_string()),
            ),
        })
    }

    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    #[must_use]
    pub fn conflict_policy(&self) -> ConflictPolicy {
        if self.reconcile_reject_stale {
            ConflictPolicy::RejectStale
        } else {
            ConflictPolicy::LastApplied
        }
    }

    #[must_use]
    pub fn view_ready_timeout(&self) -> Duration {
        Duration::from_secs(self.view_ready_timeout_seconds)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
