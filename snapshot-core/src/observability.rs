/*!
Observability for the snapshot task service.

- Structured logging through `tracing`, JSON or human readable
- Prometheus counters for task dispatch and bridge traffic (feature `metrics`)
*/

#[cfg(feature = "metrics")]
use crate::task::TaskName;
#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
#[cfg(feature = "metrics")]
use std::time::Instant;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, SnapshotError};

/// Directive applied when `RUST_LOG` does not mention the crate
const DEFAULT_DIRECTIVE: &str = "snapshot=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<SnapshotMetrics> = OnceLock::new();

/// Metrics collected by the dispatcher and the HTTP bridge gateway
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct SnapshotMetrics {
    pub task_requests_total: Counter,
    pub task_errors_total: Counter,
    pub task_latency_seconds: Histogram,
    pub bridge_requests_total: Counter,
    pub bridge_errors_total: Counter,
    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(name: &str, help: &str, registry: &Registry) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| SnapshotError::config(format!("Failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| SnapshotError::config(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl SnapshotMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let task_requests_total = counter(
            "snapshot_task_requests_total",
            "Total snapshot and restore tasks dispatched",
            &registry,
        )?;
        let task_errors_total = counter(
            "snapshot_task_errors_total",
            "Total dispatched tasks that failed",
            &registry,
        )?;
        let bridge_requests_total = counter(
            "snapshot_bridge_requests_total",
            "Total requests sent to the bridge",
            &registry,
        )?;
        let bridge_errors_total = counter(
            "snapshot_bridge_errors_total",
            "Total bridge requests that failed",
            &registry,
        )?;

        let task_latency_seconds = Histogram::with_opts(prometheus::HistogramOpts::new(
            "snapshot_task_latency_seconds",
            "Duration of task dispatch in seconds",
        ))
        .map_err(|e| {
            SnapshotError::config(format!("Failed to create task_latency_seconds metric: {e}"))
        })?;
        registry
            .register(Box::new(task_latency_seconds.clone()))
            .map_err(|e| {
                SnapshotError::config(format!("Failed to register task_latency_seconds: {e}"))
            })?;

        Ok(Self {
            task_requests_total,
            task_errors_total,
            task_latency_seconds,
            bridge_requests_total,
            bridge_errors_total,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> &'static SnapshotMetrics {
        METRICS.get_or_init(|| Self::new().expect("Failed to initialize snapshot metrics"))
    }

    pub fn record_task_request(&self, _task: TaskName) {
        self.task_requests_total.inc();
    }

    pub fn record_task_error(&self, _task: TaskName) {
        self.task_errors_total.inc();
    }

    pub fn record_task_latency(&self, _task: TaskName, duration: std::time::Duration) {
        self.task_latency_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_bridge_request(&self) {
        self.bridge_requests_total.inc();
    }

    pub fn record_bridge_error(&self) {
        self.bridge_errors_total.inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SnapshotError::config(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer)
            .map_err(|e| SnapshotError::config(format!("Failed to convert metrics to string: {e}")))
    }
}

/// Times one task dispatch
#[cfg(feature = "metrics")]
pub struct TaskTimer {
    start: Instant,
    task: TaskName,
}

#[cfg(feature = "metrics")]
impl TaskTimer {
    /// Count the request and start timing it
    pub fn start(task: TaskName) -> Self {
        SnapshotMetrics::global().record_task_request(task);
        Self {
            start: Instant::now(),
            task,
        }
    }

    pub fn finish(self) {
        SnapshotMetrics::global().record_task_latency(self.task, self.start.elapsed());
    }

    pub fn finish_with_error(self) {
        let metrics = SnapshotMetrics::global();
        metrics.record_task_latency(self.task, self.start.elapsed());
        metrics.record_task_error(self.task);
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` is honoured; `snapshot=info` is added on top of it. With
/// `json` set, events are written as one JSON object per line.
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    SnapshotMetrics::global();

    let filter = EnvFilter::from_default_env().add_directive(
        DEFAULT_DIRECTIVE
            .parse()
            .map_err(|e| SnapshotError::config(format!("Invalid log directive: {e}")))?,
    );

    let result = if json {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_current_span(true);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        set_global_default(TracingRegistry::default().with(filter).with(fmt_layer))
    };

    result.map_err(|e| {
        SnapshotError::config(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("Snapshot observability initialized");
    Ok(())
}
