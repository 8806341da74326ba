//! Metrics registry for the server.
//!
//! A thin explicit wrapper around a `prometheus::Registry`. One instance is
//! built at startup and shared through `AppState`; nothing here is global.
//! Updates are plain atomics with no await points, so handles can be used
//! from any task.

use dashmap::DashMap;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::MetricsError;

pub const TOTAL_REQUESTS_NAME: &str = "http_reques_counter";
pub const TOTAL_REQUESTS_HELP: &str = "This tells the total number of request made to the server";

pub const REQ_RES_TIME_NAME: &str = "http_express_req_res_time";
pub const REQ_RES_TIME_HELP: &str = "This tells how much time is taken by req and res";

// bucket upper bounds in milliseconds
pub const REQ_RES_TIME_BUCKETS: [f64; 9] =
    [1.0, 50.0, 100.0, 200.0, 400.0, 500.0, 800.0, 1000.0, 2000.0];

pub const REQ_RES_TIME_LABELS: [&str; 3] = ["method", "route", "status_code"];

#[derive(Clone, Default)]
pub struct MetricsRegistry {
    registry: Registry,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a monotonic counter. Fails if `name` is taken or invalid.
    pub fn register_counter(&self, name: &str, help: &str) -> Result<CounterHandle, MetricsError> {
        let counter = IntCounter::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(counter.clone()))?;
        Ok(CounterHandle { inner: counter })
    }

    /// Register a labelled cumulative histogram.
    ///
    /// `buckets` must be non-empty, strictly ascending and positive.
    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        buckets: &[f64],
        label_names: &[&str],
    ) -> Result<HistogramHandle, MetricsError> {
        validate_buckets(name, buckets)?;

        let opts = HistogramOpts::new(name, help).buckets(buckets.to_vec());
        let histogram = HistogramVec::new(opts, label_names)?;
        self.registry.register(Box::new(histogram.clone()))?;

        Ok(HistogramHandle {
            name: name.to_string(),
            label_names: label_names.iter().map(|l| l.to_string()).collect(),
            inner: histogram,
            children: Arc::new(DashMap::new()),
        })
    }

    pub fn register_gauge(&self, name: &str, help: &str) -> Result<GaugeHandle, MetricsError> {
        let gauge = Gauge::with_opts(Opts::new(name, help))?;
        self.registry.register(Box::new(gauge.clone()))?;
        Ok(GaugeHandle { inner: gauge })
    }

    // raw access for collectors that register themselves (process collector)
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition of everything registered, sorted by metric name.
    ///
    /// Each instrument is read from its own snapshot; there is no global
    /// atomicity across instruments. Two calls with no updates in between
    /// give the same text only when no sampling collector is registered:
    /// the linux process collector (see `process.rs`) reads cpu time and
    /// memory on every call.
    pub fn serialize(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!(error = %e, "failed to encode metrics");
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }

    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

fn validate_buckets(name: &str, buckets: &[f64]) -> Result<(), MetricsError> {
    if buckets.is_empty() {
        return Err(MetricsError::Config(format!("{name}: buckets must not be empty")));
    }
    if let Some(b) = buckets.iter().find(|b| !b.is_finite() || **b <= 0.0) {
        return Err(MetricsError::Config(format!(
            "{name}: bucket bound {b} is not a positive number"
        )));
    }
    if let Some(pair) = buckets.windows(2).find(|w| w[0] >= w[1]) {
        return Err(MetricsError::Config(format!(
            "{name}: buckets must be strictly ascending ({} >= {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct CounterHandle {
    inner: IntCounter,
}

impl CounterHandle {
    pub fn increment(&self) {
        self.inner.inc();
    }

    pub fn get(&self) -> u64 {
        self.inner.get()
    }
}

#[derive(Clone)]
pub struct GaugeHandle {
    inner: Gauge,
}

impl GaugeHandle {
    pub fn set(&self, value: f64) {
        self.inner.set(value);
    }

    pub fn get(&self) -> f64 {
        self.inner.get()
    }
}

#[derive(Clone)]
pub struct HistogramHandle {
    name: String,
    label_names: Vec<String>,
    inner: HistogramVec,
    // children seen so far, keyed by label values in declared order
    children: Arc<DashMap<Vec<String>, prometheus::Histogram>>,
}

impl fmt::Debug for HistogramHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramHandle")
            .field("name", &self.name)
            .field("label_names", &self.label_names)
            .field("series", &self.children.len())
            .finish()
    }
}

impl HistogramHandle {
    /// Record `value` into the child selected by `labels`.
    ///
    /// `labels` must name every declared label exactly once, in any order.
    /// Negative (or NaN) values are recorded as 0.
    pub fn observe(&self, labels: &[(&str, &str)], value: f64) -> Result<(), MetricsError> {
        let key = self.key(labels)?;
        let value = value.max(0.0);

        if let Some(child) = self.children.get(&key) {
            child.observe(value);
            return Ok(());
        }

        let map: HashMap<&str, &str> = labels.iter().copied().collect();
        let child = self
            .inner
            .get_metric_with(&map)
            .map_err(|_| self.mismatch(labels))?;
        child.observe(value);
        self.children.entry(key).or_insert(child);
        Ok(())
    }

    /// Number of observations recorded for one label set.
    ///
    /// Read only: a label set that was never observed reports 0 and does
    /// not show up in the exposition afterwards.
    pub fn sample_count(&self, labels: &[(&str, &str)]) -> Result<u64, MetricsError> {
        let key = self.key(labels)?;
        Ok(self
            .children
            .get(&key)
            .map(|child| child.get_sample_count())
            .unwrap_or(0))
    }

    // label values in declared order, or a mismatch
    fn key(&self, labels: &[(&str, &str)]) -> Result<Vec<String>, MetricsError> {
        let map: HashMap<&str, &str> = labels.iter().copied().collect();

        if map.len() != labels.len() || map.len() != self.label_names.len() {
            return Err(self.mismatch(labels));
        }

        self.label_names
            .iter()
            .map(|name| {
                map.get(name.as_str())
                    .map(|v| v.to_string())
                    .ok_or_else(|| self.mismatch(labels))
            })
            .collect()
    }

    fn mismatch(&self, labels: &[(&str, &str)]) -> MetricsError {
        MetricsError::LabelMismatch {
            metric: self.name.clone(),
            expected: self.label_names.clone(),
            got: labels.iter().map(|(k, _)| k.to_string()).collect(),
        }
    }
}

// One completed request, consumed right away by `HttpMetrics::record`
#[derive(Debug, Clone)]
pub struct Observation {
    pub method: String,
    pub route: String,
    pub status_code: u16,
    pub elapsed_ms: f64,
}

/// The request instruments every response is recorded into.
#[derive(Clone)]
pub struct HttpMetrics {
    pub total: CounterHandle,
    pub req_res_time: HistogramHandle,
}

impl HttpMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        let total = registry.register_counter(TOTAL_REQUESTS_NAME, TOTAL_REQUESTS_HELP)?;
        let req_res_time = registry.register_histogram(
            REQ_RES_TIME_NAME,
            REQ_RES_TIME_HELP,
            &REQ_RES_TIME_BUCKETS,
            &REQ_RES_TIME_LABELS,
        )?;
        Ok(Self { total, req_res_time })
    }

    pub fn record(&self, obs: &Observation) -> Result<(), MetricsError> {
        self.total.increment();

        let status = obs.status_code.to_string();
        self.req_res_time.observe(
            &[
                ("method", obs.method.as_str()),
                ("route", obs.route.as_str()),
                ("status_code", status.as_str()),
            ],
            obs.elapsed_ms,
        )
    }
}
