//! Provider reachability and readiness reporting.
//!
//! [`DependencyProbe`] makes one cheap provider call with a short timeout and
//! reports the outcome as data. It never retries: a readiness probe is a
//! point-in-time signal. [`readiness`] combines it with static
//! configuration checks.

use crate::backend::Backend;
use crate::config::ServiceConfig;
use crate::error::{ProviderError, Retryability};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Outcome of a single probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy {
        latency_ms: u64,
    },
    Unhealthy {
        kind: ErrorKindLabel,
        error: String,
    },
    /// No credential; the probe was not attempted.
    NotConfigured {
        note: String,
    },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }
}

/// Serializable form of the failure class seen by a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKindLabel {
    Transient,
    Permanent,
}

/// One-shot provider health check.
#[derive(Clone)]
pub struct DependencyProbe {
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl std::fmt::Debug for DependencyProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyProbe")
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DependencyProbe {
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Probe once. Failures and timeouts come back as
    /// [`HealthStatus::Unhealthy`], never as errors.
    pub async fn check(&self) -> HealthStatus {
        if !self.backend.is_configured() {
            return HealthStatus::NotConfigured {
                note: "running without a provider credential".into(),
            };
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.backend.probe())
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.timeout)));

        match outcome {
            Ok(()) => HealthStatus::Healthy {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Err(err) => {
                warn!(backend = self.backend.name(), error = %err, "provider_health_check_failed");
                let kind = match err.classify() {
                    Retryability::Transient => ErrorKindLabel::Transient,
                    Retryability::Permanent => ErrorKindLabel::Permanent,
                };
                HealthStatus::Unhealthy {
                    kind,
                    error: err.to_string(),
                }
            }
        }
    }
}

/// Static configuration completeness check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigCheck {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<&'static str>,
}

/// One entry in the readiness report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Check {
    Provider(HealthStatus),
    Config(ConfigCheck),
}

/// Readiness payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub checks: BTreeMap<&'static str, Check>,
}

impl ReadinessReport {
    /// HTTP-equivalent status: 200 when ready, 503 otherwise.
    pub fn status(&self) -> u16 {
        if self.ready {
            200
        } else {
            503
        }
    }
}

/// Run the provider probe and the configuration checks.
///
/// A missing credential only blocks readiness in production.
pub async fn readiness(probe: &DependencyProbe, config: &ServiceConfig) -> ReadinessReport {
    let provider = probe.check().await;
    let missing = config.missing_settings();

    let provider_ok = match &provider {
        HealthStatus::Healthy { .. } => true,
        HealthStatus::NotConfigured { .. } => !config.environment.is_production(),
        HealthStatus::Unhealthy { .. } => false,
    };
    let config_ok = missing.is_empty() || !config.environment.is_production();

    let mut checks = BTreeMap::new();
    checks.insert("provider", Check::Provider(provider));
    checks.insert(
        "config",
        Check::Config(ConfigCheck {
            status: if missing.is_empty() { "complete" } else { "incomplete" },
            missing,
        }),
    );

    ReadinessReport {
        ready: provider_ok && config_ok,
        checks,
    }
}

/// Liveness payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub version: &'static str,
}

impl HealthCheck {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::Environment;
    use serde_json::json;

    struct Unconfigured;

    #[async_trait::async_trait]
    impl Backend for Unconfigured {
        async fn complete(
            &self,
            _request: &crate::backend::LlmRequest,
        ) -> Result<crate::backend::LlmResponse, ProviderError> {
            Err(ProviderError::Transport("unused".into()))
        }

        async fn probe(&self) -> Result<(), ProviderError> {
            panic!("probe must not run without a credential");
        }

        fn name(&self) -> &'static str {
            "unconfigured"
        }

        fn is_configured(&self) -> bool {
            false
        }
    }

    fn config_with_key() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.provider.api_key = Some("sk-abcdefghijklmnopqrstuvwxyz".into());
        config
    }

    #[tokio::test]
    async fn test_healthy_probe() {
        let mock = Arc::new(MockBackend::fixed("x"));
        let probe = DependencyProbe::new(mock.clone(), Duration::from_secs(5));
        assert!(probe.check().await.is_healthy());
        assert_eq!(mock.probes(), 1);
    }

    #[tokio::test]
    async fn test_timeout_reports_unhealthy_within_bound() {
        let mock = Arc::new(MockBackend::fixed("x").with_latency(Duration::from_secs(3600)));
        let probe = DependencyProbe::new(mock.clone(), Duration::from_millis(50));

        let started = Instant::now();
        let status = probe.check().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        match status {
            HealthStatus::Unhealthy { kind, error } => {
                assert_eq!(kind, ErrorKindLabel::Transient);
                assert!(error.contains("timed out"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(mock.probes(), 1);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let mock = Arc::new(MockBackend::fixed("x").with_probe_outcome(Err(ProviderError::Http {
            status: 401,
            body: "bad key".into(),
            retry_after: None,
        })));
        let probe = DependencyProbe::new(mock.clone(), Duration::from_secs(5));
        let status = probe.check().await;
        assert!(matches!(
            status,
            HealthStatus::Unhealthy {
                kind: ErrorKindLabel::Permanent,
                ..
            }
        ));
        assert_eq!(mock.probes(), 1);
    }

    #[tokio::test]
    async fn test_readiness_payload_shape() {
        let probe = DependencyProbe::new(Arc::new(MockBackend::fixed("x")), Duration::from_secs(5));
        let report = readiness(&probe, &config_with_key()).await;
        assert!(report.ready);
        assert_eq!(report.status(), 200);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["ready"], true);
        assert_eq!(value["checks"]["provider"]["status"], "healthy");
        assert!(value["checks"]["provider"]["latency_ms"].is_u64());
        assert_eq!(value["checks"]["config"], json!({"status": "complete"}));
    }

    #[tokio::test]
    async fn test_unhealthy_provider_blocks_readiness() {
        let mock = MockBackend::fixed("x")
            .with_probe_outcome(Err(ProviderError::Transport("refused".into())));
        let probe = DependencyProbe::new(Arc::new(mock), Duration::from_secs(5));
        let report = readiness(&probe, &config_with_key()).await;
        assert!(!report.ready);
        assert_eq!(report.status(), 503);
    }

    #[tokio::test]
    async fn test_missing_credential_only_blocks_production() {
        let probe = DependencyProbe::new(Arc::new(Unconfigured), Duration::from_secs(5));

        let dev = ServiceConfig::default();
        let report = readiness(&probe, &dev).await;
        assert!(report.ready);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["checks"]["provider"]["status"], "not_configured");
        assert_eq!(value["checks"]["config"]["missing"], json!(["OPENAI_API_KEY"]));

        let prod = ServiceConfig {
            environment: Environment::Production,
            ..ServiceConfig::default()
        };
        assert!(!readiness(&probe, &prod).await.ready);
    }

    #[test]
    fn test_liveness() {
        let value = serde_json::to_value(HealthCheck::ok()).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    }
}
