//! Scheduler configuration structures.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::retry::BackoffPolicy;

/// Prefix of the environment variables read by [`SchedulerConfig::from_env`].
pub const ENV_PREFIX: &str = "DELAY_QUEUE_";

/// Task store backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreBackendConfig {
    /// In-memory store for development and tests. Not durable.
    #[default]
    InMemory,
    /// JSON-lines log under `path`, one file per stream.
    File {
        /// Directory holding the log.
        path: PathBuf,
        /// Log file stem.
        #[serde(default = "default_stream")]
        stream: String,
    },
}

fn default_stream() -> String {
    "tasks".into()
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrently executing tasks.
    pub concurrency: usize,
    /// Longest sleep between readiness queries, in milliseconds.
    pub poll_interval_ms: u64,
    /// Age after which an ACTIVE claim counts as abandoned, in milliseconds.
    pub claim_grace_ms: u64,
    /// Interval between reconciliation runs, in milliseconds.
    pub reconcile_interval_ms: u64,
    /// Attempt budget for tasks that do not set one.
    pub default_max_attempts: u32,
    /// Backoff for tasks that do not set one.
    pub default_backoff: BackoffPolicy,
    /// Cap on any retry delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Per-attempt timeout for tasks that do not set one.
    pub default_timeout_ms: Option<u64>,
    /// How long terminal records are kept; unset keeps them.
    pub retention_ms: Option<u64>,
    /// Store backend.
    pub store: StoreBackendConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval_ms: 1_000,
            claim_grace_ms: 300_000,
            reconcile_interval_ms: 30_000,
            default_max_attempts: 3,
            default_backoff: BackoffPolicy::default(),
            max_backoff_ms: 3_600_000,
            default_timeout_ms: None,
            retention_ms: None,
            store: StoreBackendConfig::InMemory,
        }
    }
}

impl SchedulerConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.reconcile_interval_ms == 0 {
            return Err("reconcile_interval_ms must be greater than 0".into());
        }
        if self.default_max_attempts == 0 {
            return Err("default_max_attempts must be greater than 0".into());
        }
        if self.max_backoff_ms == 0 {
            return Err("max_backoff_ms must be greater than 0".into());
        }
        if self.default_timeout_ms == Some(0) {
            return Err("default_timeout_ms must be greater than 0 when set".into());
        }
        if let Some(timeout) = self.default_timeout_ms {
            if timeout >= self.claim_grace_ms {
                return Err(format!(
                    "claim_grace_ms ({}) must exceed default_timeout_ms ({timeout})",
                    self.claim_grace_ms
                ));
            }
        }
        if let StoreBackendConfig::File { path, stream } = &self.store {
            if path.as_os_str().is_empty() {
                return Err("file store path must not be empty".into());
            }
            if stream.is_empty() || stream.contains(['/', '\\']) {
                return Err(format!("invalid file store stream name `{stream}`"));
            }
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `DELAY_QUEUE_*` environment variables,
    /// loading a `.env` file first when one exists. Unset variables keep
    /// their defaults.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env file is normal.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// `lookup` receives full variable names such as `DELAY_QUEUE_CONCURRENCY`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut cfg = Self::default();

        if let Some(v) = get("CONCURRENCY") {
            cfg.concurrency = parse_var("CONCURRENCY", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            cfg.poll_interval_ms = parse_var("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("CLAIM_GRACE_MS") {
            cfg.claim_grace_ms = parse_var("CLAIM_GRACE_MS", &v)?;
        }
        if let Some(v) = get("RECONCILE_INTERVAL_MS") {
            cfg.reconcile_interval_ms = parse_var("RECONCILE_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("MAX_ATTEMPTS") {
            cfg.default_max_attempts = parse_var("MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("MAX_BACKOFF_MS") {
            cfg.max_backoff_ms = parse_var("MAX_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("TIMEOUT_MS") {
            cfg.default_timeout_ms = Some(parse_var("TIMEOUT_MS", &v)?);
        }
        if let Some(v) = get("RETENTION_MS") {
            cfg.retention_ms = Some(parse_var("RETENTION_MS", &v)?);
        }

        let backoff_delay = get("BACKOFF_DELAY_MS")
            .map(|v| parse_var::<u64>("BACKOFF_DELAY_MS", &v))
            .transpose()?;
        let backoff_type = get("BACKOFF_TYPE");
        if backoff_type.is_some() || backoff_delay.is_some() {
            let delay = backoff_delay.unwrap_or_else(|| cfg.default_backoff.base_delay_ms());
            cfg.default_backoff = match backoff_type.as_deref().unwrap_or("exponential") {
                "fixed" => BackoffPolicy::Fixed { delay_ms: delay },
                "exponential" => BackoffPolicy::Exponential {
                    base_delay_ms: delay,
                },
                other => return Err(format!("{ENV_PREFIX}BACKOFF_TYPE: unknown policy `{other}`")),
            };
        }

        match get("STORE").as_deref() {
            None | Some("in_memory") => {}
            Some("file") => {
                let path = get("STORE_PATH")
                    .ok_or_else(|| format!("{ENV_PREFIX}STORE_PATH is required for the file store"))?;
                cfg.store = StoreBackendConfig::File {
                    path: PathBuf::from(path),
                    stream: get("STREAM").unwrap_or_else(default_stream),
                };
            }
            Some(other) => return Err(format!("{ENV_PREFIX}STORE: unknown backend `{other}`")),
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{name}: {e}"))
}
