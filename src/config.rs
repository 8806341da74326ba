use clap::Parser;

// CLI argument structure, every flag can also come from the environment
#[derive(Parser, Debug, Clone)]
#[command(name = "express-metrics")]
#[command(about = "Demo HTTP server with request metrics and shipped logs")]
pub struct Args {
    // Port to run the server on
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    // Loki base url logs are pushed to
    #[arg(long, env = "LOKI_URL", default_value = "http://127.0.0.1:3100")]
    pub loki_url: String,

    // Don't ship logs to Loki (stdout only)
    #[arg(long, env = "NO_LOKI", default_value_t = false)]
    pub no_loki: bool,

    // `app` label on shipped log streams
    #[arg(long, env = "APP_NAME", default_value = "express-metrics")]
    pub app_name: String,

    // Chance that /slow fails, 0.0..=1.0
    #[arg(long, env = "SLOW_FAILURE_RATE", default_value_t = 0.125)]
    pub slow_failure_rate: f64,

    // Process gauge refresh interval in seconds
    #[arg(long, env = "PROCESS_METRICS_INTERVAL", default_value_t = 10)]
    pub process_metrics_interval: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "express-metrics",
            "--port",
            "9100",
            "--no-loki",
            "--slow-failure-rate",
            "0",
            "--loki-url",
            "http://loki:3100",
        ])
        .unwrap();
        assert_eq!(args.port, 9100);
        assert!(args.no_loki);
        assert_eq!(args.slow_failure_rate, 0.0);
        assert_eq!(args.loki_url, "http://loki:3100");
    }
}
