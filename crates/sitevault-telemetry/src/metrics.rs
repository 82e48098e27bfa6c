//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Collector registration is encapsulated so callers only see typed helpers.
//! - Label values are the stable lowercase labels from the event payloads.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Prometheus-backed metrics registry for pipeline jobs.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    resources_total: IntCounterVec,
    validation_rejections_total: IntCounterVec,
    fetch_failures_total: IntCounterVec,
    jobs_total: IntCounterVec,
    optimizer_bytes_saved_total: IntCounter,
    active_jobs: IntGauge,
}

/// Snapshot of selected gauges and counters for summaries.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Jobs currently running.
    pub active_jobs: i64,
    /// Jobs that reached `done`.
    pub jobs_done: u64,
    /// Jobs that reached `failed`.
    pub jobs_failed: u64,
    /// Jobs that reached `cancelled`.
    pub jobs_cancelled: u64,
    /// Bytes removed by the optimizer across all jobs.
    pub optimizer_bytes_saved_total: u64,
}

impl Metrics {
    /// Construct a registry with the pipeline collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be built or registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let resources_total = counter_vec(
            "sitevault_resources_total",
            "Resources that reached a terminal outcome",
            &["kind", "outcome"],
        )?;
        let validation_rejections_total = counter_vec(
            "sitevault_validation_rejections_total",
            "Payloads rejected by content validation",
            &["kind"],
        )?;
        let fetch_failures_total = counter_vec(
            "sitevault_fetch_failures_total",
            "Direct acquisition failures by reason",
            &["reason"],
        )?;
        let jobs_total = counter_vec(
            "sitevault_jobs_total",
            "Jobs that reached a terminal stage",
            &["status"],
        )?;
        let optimizer_bytes_saved_total = IntCounter::with_opts(Opts::new(
            "sitevault_optimizer_bytes_saved_total",
            "Bytes removed by asset optimization",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "sitevault_optimizer_bytes_saved_total",
            source,
        })?;
        let active_jobs =
            IntGauge::with_opts(Opts::new("sitevault_active_jobs", "Jobs currently running"))
                .map_err(|source| TelemetryError::MetricsCollector {
                    name: "sitevault_active_jobs",
                    source,
                })?;

        register(&registry, "sitevault_resources_total", &resources_total)?;
        register(
            &registry,
            "sitevault_validation_rejections_total",
            &validation_rejections_total,
        )?;
        register(
            &registry,
            "sitevault_fetch_failures_total",
            &fetch_failures_total,
        )?;
        register(&registry, "sitevault_jobs_total", &jobs_total)?;
        register(
            &registry,
            "sitevault_optimizer_bytes_saved_total",
            &optimizer_bytes_saved_total,
        )?;
        register(&registry, "sitevault_active_jobs", &active_jobs)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                resources_total,
                validation_rejections_total,
                fetch_failures_total,
                jobs_total,
                optimizer_bytes_saved_total,
                active_jobs,
            }),
        })
    }

    /// Count a resource that reached `outcome`.
    pub fn inc_resource(&self, kind: &str, outcome: &str) {
        self.inner
            .resources_total
            .with_label_values(&[kind, outcome])
            .inc();
    }

    /// Count a payload rejected by validation.
    pub fn inc_validation_rejection(&self, kind: &str) {
        self.inner
            .validation_rejections_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Count a failed direct acquisition.
    pub fn inc_fetch_failure(&self, reason: &str) {
        self.inner
            .fetch_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record bytes removed by the optimizer.
    pub fn add_bytes_saved(&self, bytes: u64) {
        self.inner.optimizer_bytes_saved_total.inc_by(bytes);
    }

    /// Mark a job as started.
    pub fn job_started(&self) {
        self.inner.active_jobs.inc();
    }

    /// Mark a job as finished with the terminal `status` label.
    pub fn job_finished(&self, status: &str) {
        self.inner.active_jobs.dec();
        self.inner.jobs_total.with_label_values(&[status]).inc();
    }

    /// Render the registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the job-level collectors.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let jobs = |status: &str| self.inner.jobs_total.with_label_values(&[status]).get();
        MetricsSnapshot {
            active_jobs: self.inner.active_jobs.get(),
            jobs_done: jobs("done"),
            jobs_failed: jobs("failed"),
            jobs_cancelled: jobs("cancelled"),
            optimizer_bytes_saved_total: self.inner.optimizer_bytes_saved_total.get(),
        }
    }
}

fn counter_vec(
    name: &'static str,
    help: &str,
    labels: &[&str],
) -> TelemetryResult<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> TelemetryResult<()>
where
    C: Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() -> TelemetryResult<()> {
        let metrics = Metrics::new()?;
        metrics.job_started();
        metrics.job_started();
        metrics.inc_resource("css", "placeholder");
        metrics.inc_validation_rejection("css");
        metrics.inc_fetch_failure("status");
        metrics.add_bytes_saved(2_048);
        metrics.job_finished("done");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_jobs, 1);
        assert_eq!(snapshot.jobs_done, 1);
        assert_eq!(snapshot.jobs_failed, 0);
        assert_eq!(snapshot.optimizer_bytes_saved_total, 2_048);

        let rendered = metrics.render()?;
        assert!(rendered.contains("sitevault_resources_total"));
        assert!(rendered.contains("outcome=\"placeholder\""));
        assert!(rendered.contains("sitevault_validation_rejections_total"));
        assert!(rendered.contains("sitevault_active_jobs 1"));
        Ok(())
    }

    #[test]
    fn snapshot_serializes() -> Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        let json = serde_json::to_value(metrics.snapshot())?;
        assert_eq!(json["active_jobs"], 0);
        Ok(())
    }
}
