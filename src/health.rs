//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::workers::JobStats;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Named worker stats handles for the health report.
pub type WorkerStatsMap = Vec<(&'static str, Arc<JobStats>)>;

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    db_pool: sqlx::PgPool,
    workers: Arc<WorkerStatsMap>,
}

impl HealthChecker {
    pub fn new(db_pool: sqlx::PgPool, workers: WorkerStatsMap) -> Self {
        Self {
            db_pool,
            workers: Arc::new(workers),
        }
    }

    pub async fn check(&self) -> HealthStatus {
        let mut status = HealthStatus::new();

        let db_health = self.check_database().await;
        if db_health.status == ComponentState::Down {
            status.status = HealthState::Unhealthy;
        }
        status.checks.insert("database".to_string(), db_health);

        for (name, stats) in self.workers.iter() {
            let errored = stats.error_count() > 0 && stats.run_count() == stats.error_count();
            let health = if errored {
                if status.status == HealthState::Healthy {
                    status.status = HealthState::Degraded;
                }
                ComponentHealth::warning(
                    None,
                    Some(format!(
                        "all {} runs failed ({} errors)",
                        stats.run_count(),
                        stats.error_count()
                    )),
                )
            } else {
                ComponentHealth::up(None)
            };
            status.checks.insert((*name).to_string(), health);
        }

        status
    }

    async fn check_database(&self) -> ComponentHealth {
        let started = Instant::now();
        let probe = sqlx::query("SELECT 1").execute(&self.db_pool);

        match timeout(Duration::from_secs(5), probe).await {
            Ok(Ok(_)) => ComponentHealth::up(Some(started.elapsed().as_millis())),
            Ok(Err(e)) => ComponentHealth::down(Some(e.to_string())),
            Err(_) => ComponentHealth::down(Some("database probe timed out".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_status_is_healthy() {
        let status = HealthStatus::new();
        assert!(status.is_healthy());
        assert!(status.checks.is_empty());
    }

    #[test]
    fn component_constructors_set_state() {
        assert_eq!(ComponentHealth::up(Some(3)).status, ComponentState::Up);
        assert_eq!(
            ComponentHealth::down(Some("gone".to_string())).status,
            ComponentState::Down
        );
        assert_eq!(
            ComponentHealth::warning(None, None).status,
            ComponentState::Warning
        );
    }
}
