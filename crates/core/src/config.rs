use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// First key that is set wins; later keys are legacy aliases.
fn profiled_env_parse<T: std::str::FromStr>(profile: &str, keys: &[&str], default: T) -> T {
    keys.iter()
        .find_map(|key| profiled_env_opt(profile, key))
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    profiled_env_opt(profile, key)
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

/// Legacy switches count as on whenever they are set, unless the value is
/// an explicit false.
fn profiled_env_switch(profile: &str, key: &str) -> Option<bool> {
    profiled_env_opt(profile, key).map(|v| parse_flag(&v).unwrap_or(true))
}

// ── Top-level config ──────────────────────────────────────────

/// Process-wide configuration. Every value here must be identical on every
/// producer and worker in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub routing: RoutingConfig,
    pub retry: RetryConfig,
    pub reduction: ReductionConfig,
    pub batch: BatchConfig,
    pub deployment: DeploymentConfig,
    pub queue: QueueConfig,
    pub aws: AwsConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `MARSHAL_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("MARSHAL_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            routing: RoutingConfig::from_env_profiled(p),
            retry: RetryConfig::from_env_profiled(p),
            reduction: ReductionConfig::from_env_profiled(p),
            batch: BatchConfig::from_env_profiled(p),
            deployment: DeploymentConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            aws: AwsConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values that would make a component loop forever or never dispatch.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.retry.max_attempts == 0 {
            return Err(CoreError::InvalidConfig("MAX_TASK_ATTEMPTS must be at least 1".into()));
        }
        if self.reduction.poll_interval_seconds == 0 {
            return Err(CoreError::InvalidConfig("REDUCER_POLL_SECONDS must be at least 1".into()));
        }
        if self.batch.segments_batch_size == 0 || self.batch.frames_batch_size == 0 {
            return Err(CoreError::InvalidConfig("batch sizes must be at least 1".into()));
        }
        if self.batch.sampling_rate == 0 {
            return Err(CoreError::InvalidConfig("SAMPLING_RATE must be at least 1".into()));
        }
        match self.queue.broker.as_str() {
            "memory" | "sqs" => Ok(()),
            other => Err(CoreError::InvalidConfig(format!(
                "invalid broker '{other}', expected 'memory' or 'sqs'"
            ))),
        }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  routing:     per_model_queues={}, per_retriever_queues={}, table={}",
            self.routing.per_model_queues,
            self.routing.per_retriever_queues,
            self.routing
                .table_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(builtin)".into())
        );
        tracing::info!("  retry:       max_attempts={}", self.retry.max_attempts);
        tracing::info!("  reduction:   poll_interval={}s", self.reduction.poll_interval_seconds);
        tracing::info!(
            "  batch:       segments={}, frames={}, rate={}",
            self.batch.segments_batch_size, self.batch.frames_batch_size, self.batch.sampling_rate
        );
        tracing::info!("  deployment:  orchestrated={}", self.deployment.orchestrated);
        tracing::info!("  queue:       broker={}, prefix={}", self.queue.broker, self.queue.name_prefix.as_deref().unwrap_or("(none)"));
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "routing": {
                "per_model_queues": self.routing.per_model_queues,
                "per_retriever_queues": self.routing.per_retriever_queues,
                "table_path": self.routing.table_path,
                "enforce_listeners": self.routing.enforce_listeners,
            },
            "retry": { "max_attempts": self.retry.max_attempts },
            "reduction": { "poll_interval_seconds": self.reduction.poll_interval_seconds },
            "batch": {
                "segments_batch_size": self.batch.segments_batch_size,
                "frames_batch_size": self.batch.frames_batch_size,
                "sampling_rate": self.batch.sampling_rate,
            },
            "deployment": { "orchestrated": self.deployment.orchestrated },
            "queue": { "broker": self.queue.broker, "name_prefix": self.queue.name_prefix },
            "aws": { "region": self.aws.region, "configured": self.aws.is_configured() },
        })
    }
}

// ── Routing ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Route model-scoped kinds to `qmodel-<id>` instead of the global model queue.
    pub per_model_queues: bool,
    /// Route retriever-scoped kinds to `qretriever-<id>` instead of the global retriever queue.
    pub per_retriever_queues: bool,
    /// Optional TOML routing table replacing the builtin one.
    pub table_path: Option<PathBuf>,
    /// Refuse dynamic dispatch to queues no worker has announced.
    pub enforce_listeners: bool,
}

impl RoutingConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            // GLOBAL_MODEL sends model work to the shared queue.
            per_model_queues: toggle_with_legacy(p, "PER_MODEL_QUEUES", "GLOBAL_MODEL", false, true),
            // DISABLE_GLOBAL_RETRIEVER gives each retriever its own queue.
            per_retriever_queues: toggle_with_legacy(
                p,
                "PER_RETRIEVER_QUEUES",
                "DISABLE_GLOBAL_RETRIEVER",
                true,
                false,
            ),
            table_path: profiled_env_opt(p, "ROUTING_TABLE_PATH").map(PathBuf::from),
            enforce_listeners: profiled_env_bool(p, "ENFORCE_LISTENERS", false),
        }
    }
}

/// Read `key`, falling back to a legacy switch that forces the toggle to
/// `legacy_on_means` while set. `key` wins when both are present.
fn toggle_with_legacy(p: &str, key: &str, legacy: &str, legacy_on_means: bool, default: bool) -> bool {
    if profiled_env_opt(p, key).is_some() {
        return profiled_env_bool(p, key, default);
    }
    match profiled_env_switch(p, legacy) {
        Some(true) => legacy_on_means,
        _ => default,
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            per_model_queues: true,
            per_retriever_queues: false,
            table_path: None,
            enforce_listeners: false,
        }
    }
}

// ── Retry ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

impl RetryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_attempts: profiled_env_u32(p, "MAX_TASK_ATTEMPTS", DEFAULT_MAX_ATTEMPTS),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

// ── Reduction ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionConfig {
    pub poll_interval_seconds: u64,
}

pub const DEFAULT_REDUCER_POLL_SECONDS: u64 = 60;

impl ReductionConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            poll_interval_seconds: profiled_env_u64(p, "REDUCER_POLL_SECONDS", DEFAULT_REDUCER_POLL_SECONDS),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self { poll_interval_seconds: DEFAULT_REDUCER_POLL_SECONDS }
    }
}

// ── Batching ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Video segments handed to one decode task.
    pub segments_batch_size: u64,
    /// Dataset frames handed to one extraction/inference task.
    pub frames_batch_size: u64,
    /// Decode one frame every N frames (key frames are always kept).
    pub sampling_rate: u32,
}

pub const DEFAULT_SEGMENTS_BATCH_SIZE: u64 = 10;
pub const DEFAULT_FRAMES_BATCH_SIZE: u64 = 500;
pub const DEFAULT_SAMPLING_RATE: u32 = 30;

impl BatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            segments_batch_size: profiled_env_parse(
                p,
                &["SEGMENTS_BATCH_SIZE", "DEFAULT_SEGMENTS_BATCH_SIZE"],
                DEFAULT_SEGMENTS_BATCH_SIZE,
            ),
            frames_batch_size: profiled_env_parse(
                p,
                &["FRAMES_BATCH_SIZE", "DEFAULT_FRAMES_BATCH_SIZE"],
                DEFAULT_FRAMES_BATCH_SIZE,
            ),
            sampling_rate: profiled_env_parse(p, &["SAMPLING_RATE", "DEFAULT_RATE"], DEFAULT_SAMPLING_RATE),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            segments_batch_size: DEFAULT_SEGMENTS_BATCH_SIZE,
            frames_batch_size: DEFAULT_FRAMES_BATCH_SIZE,
            sampling_rate: DEFAULT_SAMPLING_RATE,
        }
    }
}

// ── Deployment ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentConfig {
    /// Workers may be rescheduled at any time by an orchestrator.
    pub orchestrated: bool,
}

impl DeploymentConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            orchestrated: profiled_env_bool(p, "ORCHESTRATED", false) || env_opt("KUBE_MODE").is_some(),
        }
    }
}

// ── Queue / broker ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// "memory" or "sqs"
    pub broker: String,
    /// Prepended to every queue name before looking it up on the broker.
    pub name_prefix: Option<String>,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            broker: profiled_env_or(p, "BROKER", "memory").to_lowercase(),
            name_prefix: profiled_env_opt(p, "QUEUE_NAME_PREFIX"),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { broker: "memory".into(), name_prefix: None }
    }
}

// ── AWS ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "QUEUE_AWS_ENDPOINT_URL"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: String::new(),
            routing: RoutingConfig::default(),
            retry: RetryConfig::default(),
            reduction: ReductionConfig::default(),
            batch: BatchConfig::default(),
            deployment: DeploymentConfig::default(),
            queue: QueueConfig::default(),
            aws: AwsConfig {
                region: "us-east-1".into(),
                access_key_id: None,
                secret_access_key: None,
                session_token: None,
                endpoint_url: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own profile prefix so parallel tests never see
    // each other's variables.

    #[test]
    fn defaults_match_fleet_constants() {
        let cfg = Config::default();
        assert!(cfg.routing.per_model_queues);
        assert!(!cfg.routing.per_retriever_queues);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.reduction.poll_interval(), Duration::from_secs(60));
        assert_eq!(cfg.batch.segments_batch_size, 10);
        assert_eq!(cfg.batch.frames_batch_size, 500);
        assert_eq!(cfg.batch.sampling_rate, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn profiled_overrides_take_precedence() {
        env::set_var("CFGTESTA_MAX_TASK_ATTEMPTS", "9");
        env::set_var("CFGTESTA_PER_MODEL_QUEUES", "false");
        env::set_var("CFGTESTA_FRAMES_BATCH_SIZE", "250");
        let cfg = Config::for_profile("cfgtesta");
        assert_eq!(cfg.profile, "CFGTESTA");
        assert_eq!(cfg.retry.max_attempts, 9);
        assert!(!cfg.routing.per_model_queues);
        assert_eq!(cfg.batch.frames_batch_size, 250);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        env::set_var("CFGTESTB_REDUCER_POLL_SECONDS", "soon");
        env::set_var("CFGTESTB_PER_RETRIEVER_QUEUES", "maybe");
        let cfg = Config::for_profile("CFGTESTB");
        assert_eq!(cfg.reduction.poll_interval_seconds, 60);
        assert!(!cfg.routing.per_retriever_queues);
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = Config::default();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.batch.frames_batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.batch.sampling_rate = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_broker() {
        let mut cfg = Config::default();
        cfg.queue.broker = "carrier-pigeon".into();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("carrier-pigeon"));
    }

    #[test]
    fn redacted_summary_has_no_secrets() {
        let mut cfg = Config::default();
        cfg.aws.secret_access_key = Some("hunter2".into());
        let summary = cfg.redacted_summary().to_string();
        assert!(!summary.contains("hunter2"));
        assert!(summary.contains("\"profile\":\"default\""));
    }

    #[test]
    fn legacy_names_are_accepted() {
        env::set_var("CFGTESTC_GLOBAL_MODEL", "1");
        env::set_var("CFGTESTC_DISABLE_GLOBAL_RETRIEVER", "yes");
        env::set_var("CFGTESTC_DEFAULT_SEGMENTS_BATCH_SIZE", "4");
        env::set_var("CFGTESTC_DEFAULT_FRAMES_BATCH_SIZE", "64");
        env::set_var("CFGTESTC_DEFAULT_RATE", "15");
        let cfg = Config::for_profile("CFGTESTC");
        assert!(!cfg.routing.per_model_queues);
        assert!(cfg.routing.per_retriever_queues);
        assert_eq!(cfg.batch.segments_batch_size, 4);
        assert_eq!(cfg.batch.frames_batch_size, 64);
        assert_eq!(cfg.batch.sampling_rate, 15);
    }

    #[test]
    fn new_names_win_over_legacy_names() {
        env::set_var("CFGTESTD_GLOBAL_MODEL", "1");
        env::set_var("CFGTESTD_PER_MODEL_QUEUES", "true");
        env::set_var("CFGTESTD_DISABLE_GLOBAL_RETRIEVER", "false");
        env::set_var("CFGTESTD_SAMPLING_RATE", "10");
        env::set_var("CFGTESTD_DEFAULT_RATE", "15");
        let cfg = Config::for_profile("CFGTESTD");
        assert!(cfg.routing.per_model_queues);
        assert!(!cfg.routing.per_retriever_queues);
        assert_eq!(cfg.batch.sampling_rate, 10);
    }
}
