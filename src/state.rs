use std::sync::Arc;
use crate::heavy_task::HeavyTask;
use crate::metrics::{HttpMetrics, MetricsRegistry};
// app's shared state

pub struct AppState {
    pub metrics: MetricsRegistry,        // everything /metrics exposes
    pub http_metrics: HttpMetrics,       // written by the timing middleware
    pub heavy_task: Arc<dyn HeavyTask>,  // what /slow runs
}

impl AppState {
    pub fn new(
        metrics: MetricsRegistry,
        http_metrics: HttpMetrics,
        heavy_task: Arc<dyn HeavyTask>,
    ) -> Self {
        Self {
            metrics,
            http_metrics,
            heavy_task,
        }
    }
}
