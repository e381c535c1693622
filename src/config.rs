//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use std::env;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub refund: RefundPolicyConfig,
    pub worker: WorkerConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone)]
pub enum LogFormat {
    Json,
    Plain,
}

/// One cancellation-window tier: reservations at least `min_hours` away
/// refund at `percentage`.
#[derive(Debug, Clone)]
pub struct RefundTier {
    pub min_hours: f64,
    pub percentage: u8,
    pub label: String,
}

/// Refund business rules. Every knob the eligibility calculator and the
/// adjustment engine consume lives here as a typed field; nothing is keyed by
/// string at runtime.
#[derive(Debug, Clone)]
pub struct RefundPolicyConfig {
    /// Cancellation-window tiers, ordered farthest-out first.
    pub tiers: Vec<RefundTier>,
    /// Percentage-point delta for shop-initiated cancellations.
    pub shop_request_delta: i32,
    /// Percentage-point delta (penalty) for no-shows.
    pub no_show_delta: i32,
    /// Percentage-point delta when the customer waives the refund.
    pub no_refund_preference_delta: i32,
}

impl Default for RefundPolicyConfig {
    fn default() -> Self {
        // Tier boundaries mirror the platform policy; override via REFUND_TIERS.
        Self {
            tiers: vec![
                RefundTier {
                    min_hours: 48.0,
                    percentage: 100,
                    label: "far-out".to_string(),
                },
                RefundTier {
                    min_hours: 24.0,
                    percentage: 70,
                    label: "standard".to_string(),
                },
                RefundTier {
                    min_hours: 12.0,
                    percentage: 50,
                    label: "near-in".to_string(),
                },
                RefundTier {
                    min_hours: 6.0,
                    percentage: 30,
                    label: "last-minute".to_string(),
                },
                RefundTier {
                    min_hours: 0.0,
                    percentage: 0,
                    label: "cutoff".to_string(),
                },
            ],
            shop_request_delta: 20,
            no_show_delta: -50,
            no_refund_preference_delta: -100,
        }
    }
}

impl RefundPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Ok(raw) = env::var("REFUND_TIERS") {
            cfg.tiers = parse_tiers(&raw)?;
        }
        if let Ok(raw) = env::var("REFUND_SHOP_REQUEST_DELTA") {
            cfg.shop_request_delta = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REFUND_SHOP_REQUEST_DELTA".to_string()))?;
        }
        if let Ok(raw) = env::var("REFUND_NO_SHOW_DELTA") {
            cfg.no_show_delta = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue("REFUND_NO_SHOW_DELTA".to_string()))?;
        }
        if let Ok(raw) = env::var("REFUND_NO_REFUND_PREFERENCE_DELTA") {
            cfg.no_refund_preference_delta = raw.parse().map_err(|_| {
                ConfigError::InvalidValue("REFUND_NO_REFUND_PREFERENCE_DELTA".to_string())
            })?;
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::InvalidValue(
                "REFUND_TIERS must define at least one tier".to_string(),
            ));
        }

        // Tiers must be strictly ordered farthest-out first and monotone:
        // a farther-out cancellation never refunds less than a closer one.
        for pair in self.tiers.windows(2) {
            if pair[0].min_hours <= pair[1].min_hours {
                return Err(ConfigError::InvalidValue(
                    "REFUND_TIERS hour boundaries must strictly decrease".to_string(),
                ));
            }
            if pair[0].percentage < pair[1].percentage {
                return Err(ConfigError::InvalidValue(
                    "REFUND_TIERS percentages must not increase toward the reservation".to_string(),
                ));
            }
        }

        for tier in &self.tiers {
            if tier.percentage > 100 {
                return Err(ConfigError::InvalidValue(format!(
                    "REFUND_TIERS percentage {} exceeds 100",
                    tier.percentage
                )));
            }
            if tier.min_hours < 0.0 {
                return Err(ConfigError::InvalidValue(
                    "REFUND_TIERS hours must be non-negative".to_string(),
                ));
            }
        }

        for (name, delta) in [
            ("REFUND_SHOP_REQUEST_DELTA", self.shop_request_delta),
            ("REFUND_NO_SHOW_DELTA", self.no_show_delta),
            (
                "REFUND_NO_REFUND_PREFERENCE_DELTA",
                self.no_refund_preference_delta,
            ),
        ] {
            if !(-100..=100).contains(&delta) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be within [-100, 100]",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Parse `"48:100,24:70,12:50,6:30,0:0"` into tiers, labelled by hour boundary.
fn parse_tiers(raw: &str) -> Result<Vec<RefundTier>, ConfigError> {
    let mut tiers = Vec::new();
    for part in raw.split(',') {
        let (hours, pct) = part
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidValue("REFUND_TIERS".to_string()))?;
        let min_hours: f64 = hours
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REFUND_TIERS".to_string()))?;
        let percentage: u8 = pct
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue("REFUND_TIERS".to_string()))?;
        tiers.push(RefundTier {
            min_hours,
            percentage,
            label: format!("{}h+", hours.trim()),
        });
    }
    Ok(tiers)
}

/// Background worker schedules and queue policy.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub no_show_scan_interval_secs: u64,
    pub queue_maintenance_interval_secs: u64,
    pub audit_retention_interval_secs: u64,
    /// How long past the reservation time a Confirmed reservation may remain
    /// before it counts as a no-show.
    pub attendance_grace_minutes: i64,
    /// Delay between enqueueing a no-show refund and it becoming processable.
    pub processing_grace_minutes: i64,
    /// Cool-down before a failed queue item is retried.
    pub retry_cooldown_minutes: i64,
    /// Failed items at this retry count are permanently skipped.
    pub max_retry_count: i32,
    /// Completed/skipped queue items older than this are purged.
    pub queue_purge_days: i64,
    /// Items stuck in `processing` longer than this are reclaimed.
    pub stale_processing_minutes: i64,
    /// Audit rows older than this are purged by the daily retention job.
    pub audit_retention_days: i64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            no_show_scan_interval_secs: 1_800,
            queue_maintenance_interval_secs: 900,
            audit_retention_interval_secs: 86_400,
            attendance_grace_minutes: 60,
            processing_grace_minutes: 30,
            retry_cooldown_minutes: 30,
            max_retry_count: 3,
            queue_purge_days: 30,
            stale_processing_minutes: 15,
            audit_retention_days: 365,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.no_show_scan_interval_secs = env_u64("NO_SHOW_SCAN_INTERVAL_SECS")
            .unwrap_or(cfg.no_show_scan_interval_secs);
        cfg.queue_maintenance_interval_secs = env_u64("QUEUE_MAINTENANCE_INTERVAL_SECS")
            .unwrap_or(cfg.queue_maintenance_interval_secs);
        cfg.audit_retention_interval_secs = env_u64("AUDIT_RETENTION_INTERVAL_SECS")
            .unwrap_or(cfg.audit_retention_interval_secs);
        cfg.attendance_grace_minutes =
            env_i64("ATTENDANCE_GRACE_MINUTES").unwrap_or(cfg.attendance_grace_minutes);
        cfg.processing_grace_minutes =
            env_i64("PROCESSING_GRACE_MINUTES").unwrap_or(cfg.processing_grace_minutes);
        cfg.retry_cooldown_minutes =
            env_i64("RETRY_COOLDOWN_MINUTES").unwrap_or(cfg.retry_cooldown_minutes);
        cfg.max_retry_count = env_i64("QUEUE_MAX_RETRY_COUNT")
            .map(|v| v as i32)
            .unwrap_or(cfg.max_retry_count);
        cfg.queue_purge_days = env_i64("QUEUE_PURGE_DAYS").unwrap_or(cfg.queue_purge_days);
        cfg.stale_processing_minutes =
            env_i64("STALE_PROCESSING_MINUTES").unwrap_or(cfg.stale_processing_minutes);
        cfg.audit_retention_days =
            env_i64("AUDIT_RETENTION_DAYS").unwrap_or(cfg.audit_retention_days);
        cfg
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retry_count < 1 {
            return Err(ConfigError::InvalidValue(
                "QUEUE_MAX_RETRY_COUNT must be at least 1".to_string(),
            ));
        }
        if self.no_show_scan_interval_secs == 0 || self.queue_maintenance_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "worker intervals must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_i64(name: &str) -> Option<i64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            refund: RefundPolicyConfig::from_env()?,
            worker: WorkerConfig::from_env(),
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.refund.validate()?;
        self.worker.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".to_string()))?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()))?,
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_MIN_CONNECTIONS".to_string()))?,
            connection_timeout: env::var("DB_CONNECTION_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DB_CONNECTION_TIMEOUT".to_string()))?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let format = match env::var("LOG_FORMAT")
            .unwrap_or_else(|_| "plain".to_string())
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Plain,
        };

        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format,
        })
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(name) => {
                write!(f, "Missing environment variable: {}", name)
            }
            ConfigError::InvalidValue(detail) => {
                write!(f, "Invalid configuration value: {}", detail)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_refund_tiers_validate() {
        let cfg = RefundPolicyConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tiers.first().map(|t| t.percentage), Some(100));
        assert_eq!(cfg.tiers.last().map(|t| t.percentage), Some(0));
    }

    #[test]
    fn non_monotonic_tiers_are_rejected() {
        let mut cfg = RefundPolicyConfig::default();
        // A closer tier refunding more than a farther one is a config bug.
        cfg.tiers[1].percentage = 100;
        cfg.tiers[0].percentage = 70;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn tier_parse_accepts_hour_percentage_pairs() {
        let tiers = parse_tiers("48:100,24:70,0:0").unwrap();
        assert_eq!(tiers.len(), 3);
        assert_eq!(tiers[0].min_hours, 48.0);
        assert_eq!(tiers[0].percentage, 100);
        assert_eq!(tiers[2].label, "0h+");
    }

    #[test]
    fn tier_parse_rejects_garbage() {
        assert!(parse_tiers("not-a-tier").is_err());
        assert!(parse_tiers("48:not-a-number").is_err());
    }

    #[test]
    fn preference_delta_is_env_overridable() {
        env::set_var("REFUND_NO_REFUND_PREFERENCE_DELTA", "-80");
        let cfg = RefundPolicyConfig::from_env().unwrap();
        env::remove_var("REFUND_NO_REFUND_PREFERENCE_DELTA");
        assert_eq!(cfg.no_refund_preference_delta, -80);
    }

    #[test]
    fn worker_config_rejects_zero_retry_bound() {
        let mut cfg = WorkerConfig::default();
        cfg.max_retry_count = 0;
        assert!(cfg.validate().is_err());
    }
}
