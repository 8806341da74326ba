//! Process-level gauges, registered once at startup.
//!
//! | metric                      | refreshed                         |
//! |-----------------------------|-----------------------------------|
//! | `app_start_time_seconds`    | once, at registration             |
//! | `process_uptime_seconds`    | every `--process-metrics-interval`|
//! | `process_*` (linux only)    | at scrape time, by the prometheus |
//! |                             | crate's process collector         |
//!
//! The linux collector covers cpu seconds, resident/virtual memory, open
//! and max fds, thread count and start time.

use std::time::{Duration, Instant};
use tokio::time::interval;

use crate::error::MetricsError;
use crate::metrics::{GaugeHandle, MetricsRegistry};

#[derive(Clone)]
pub struct ProcessGauges {
    started: Instant,
    start_time: GaugeHandle,
    uptime: GaugeHandle,
}

impl ProcessGauges {
    pub fn register(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        let start_time = registry.register_gauge(
            "app_start_time_seconds",
            "Start time of the server since unix epoch in seconds",
        )?;
        let uptime = registry.register_gauge(
            "process_uptime_seconds",
            "Seconds since the server started",
        )?;

        let now = chrono::Utc::now();
        start_time.set(now.timestamp_millis() as f64 / 1000.0);

        #[cfg(target_os = "linux")]
        {
            let collector = prometheus::process_collector::ProcessCollector::for_self();
            registry.registry().register(Box::new(collector))?;
        }

        Ok(Self {
            started: Instant::now(),
            start_time,
            uptime,
        })
    }

    pub fn refresh(&self) {
        self.uptime.set(self.started.elapsed().as_secs_f64());
    }

    pub fn start_time(&self) -> f64 {
        self.start_time.get()
    }

    pub fn uptime(&self) -> f64 {
        self.uptime.get()
    }
}

// Keeps the interval-driven gauges fresh for the life of the process
pub async fn process_collector(gauges: ProcessGauges, every: Duration) {
    let mut interval = interval(every);

    tracing::info!(interval = ?every, "process metrics collector started");

    loop {
        interval.tick().await;
        gauges.refresh();
    }
}
