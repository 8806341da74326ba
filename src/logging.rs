//! Tracing setup and the Loki log sink.
//!
//! Events go to stdout through the fmt layer and, when enabled, to Loki:
//! `LokiLayer` turns each event into a `LogLine` and pushes it on a bounded
//! channel without waiting, `loki_shipper` drains the channel in batches and
//! POSTs them to the push API. Anything that goes wrong on the way is dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

// events from the sink itself (and the http client it uses) are never shipped
pub const SINK_TARGET: &str = "loki_sink";
const IGNORED_TARGETS: [&str; 5] = [SINK_TARGET, "reqwest", "hyper", "hyper_util", "h2"];

const CHANNEL_CAPACITY: usize = 1024;
const MAX_BATCH: usize = 100;
const FLUSH_EVERY: Duration = Duration::from_secs(1);
const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct LogLine {
    pub level: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

// collects the `message` field plus any other fields as `k=v`
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

impl MessageVisitor {
    fn finish(self) -> String {
        self.message + &self.fields
    }
}

pub struct LokiLayer {
    tx: mpsc::Sender<LogLine>,
}

impl LokiLayer {
    pub fn new() -> (Self, mpsc::Receiver<LogLine>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (Self { tx }, rx)
    }
}

impl<S: Subscriber> Layer<S> for LokiLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if IGNORED_TARGETS.iter().any(|t| meta.target().starts_with(t)) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let line = LogLine {
            level: meta.level().as_str().to_lowercase(),
            message: visitor.finish(),
            timestamp: Utc::now(),
        };

        // full or closed channel: the line is lost, requests never wait on logging
        let _ = self.tx.try_send(line);
    }
}

/// Install the global subscriber. Returns the Loki receiver when shipping is on.
pub fn init_tracing(ship_to_loki: bool) -> anyhow::Result<Option<mpsc::Receiver<LogLine>>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (loki, rx) = if ship_to_loki {
        let (layer, rx) = LokiLayer::new();
        (Some(layer), Some(rx))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .with(loki)
        .try_init()?;

    Ok(rx)
}

// Loki push body, one stream per level
pub fn push_payload(app: &str, lines: &[LogLine]) -> serde_json::Value {
    let mut by_level: BTreeMap<&str, Vec<[String; 2]>> = BTreeMap::new();

    for line in lines {
        let ts = line.timestamp.timestamp_nanos_opt().unwrap_or_default().to_string();
        let body = serde_json::to_string(line).unwrap_or_else(|_| line.message.clone());
        by_level.entry(line.level.as_str()).or_default().push([ts, body]);
    }

    let streams: Vec<_> = by_level
        .into_iter()
        .map(|(level, values)| {
            json!({
                "stream": { "app": app, "level": level },
                "values": values,
            })
        })
        .collect();

    json!({ "streams": streams })
}

async fn flush(client: &reqwest::Client, push_url: &str, app: &str, batch: &mut Vec<LogLine>) {
    if batch.is_empty() {
        return;
    }

    let payload = push_payload(app, batch);
    let sent = batch.len();
    batch.clear();

    match client
        .post(push_url)
        .json(&payload)
        .timeout(PUSH_TIMEOUT)
        .send()
        .await
    {
        Ok(res) if res.status().is_success() => {}
        Ok(res) => {
            tracing::warn!(target: SINK_TARGET, status = %res.status(), dropped = sent, "loki rejected log batch");
        }
        Err(e) => {
            tracing::warn!(target: SINK_TARGET, error = %e, dropped = sent, "failed to ship logs to loki");
        }
    }
}

/// Background worker: batches lines and pushes them until the channel closes.
pub async fn loki_shipper(
    mut rx: mpsc::Receiver<LogLine>,
    client: reqwest::Client,
    loki_url: String,
    app: String,
) {
    let push_url = format!("{}/loki/api/v1/push", loki_url.trim_end_matches('/'));
    let mut batch = Vec::with_capacity(MAX_BATCH);
    let mut ticker = interval(FLUSH_EVERY);

    tracing::info!(target: SINK_TARGET, url = %push_url, "loki shipper started");

    loop {
        tokio::select! {
            maybe_line = rx.recv() => match maybe_line {
                Some(line) => {
                    batch.push(line);
                    if batch.len() >= MAX_BATCH {
                        flush(&client, &push_url, &app, &mut batch).await;
                    }
                }
                None => {
                    flush(&client, &push_url, &app, &mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => flush(&client, &push_url, &app, &mut batch).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::State, routing::post};
    use tracing_subscriber::Registry;

    fn line(level: &str, message: &str) -> LogLine {
        LogLine {
            level: level.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn layer_captures_message_and_fields() {
        let (layer, mut rx) = LokiLayer::new();
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(code = 7, "DB Server is Down");
        });

        let got = rx.try_recv().unwrap();
        assert_eq!(got.level, "error");
        assert_eq!(got.message, "DB Server is Down code=7");
    }

    #[test]
    fn layer_skips_its_own_events() {
        let (layer, mut rx) = LokiLayer::new();
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: SINK_TARGET, "failed to ship");
            tracing::info!("Req came on / route");
        });

        assert_eq!(rx.try_recv().unwrap().message, "Req came on / route");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn layer_drops_when_channel_closed() {
        let (layer, rx) = LokiLayer::new();
        drop(rx);
        let subscriber = Registry::default().with(layer);

        // must not panic or block
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("nobody listening");
        });
    }

    #[test]
    fn payload_groups_by_level() {
        let lines = vec![line("info", "a"), line("error", "b"), line("info", "c")];
        let payload = push_payload("demo", &lines);

        let streams = payload["streams"].as_array().unwrap();
        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0]["stream"]["level"], "error");
        assert_eq!(streams[1]["stream"]["app"], "demo");
        assert_eq!(streams[1]["values"].as_array().unwrap().len(), 2);

        let entry: serde_json::Value =
            serde_json::from_str(streams[0]["values"][0][1].as_str().unwrap()).unwrap();
        assert_eq!(entry["message"], "b");
        assert_eq!(entry["level"], "error");
        assert!(entry["timestamp"].is_string());
    }

    #[tokio::test]
    async fn shipper_pushes_batch_to_loki() {
        let (seen_tx, mut seen_rx) = mpsc::channel::<serde_json::Value>(4);

        async fn push(
            State(seen): State<mpsc::Sender<serde_json::Value>>,
            Json(body): Json<serde_json::Value>,
        ) {
            let _ = seen.send(body).await;
        }

        let loki = Router::new()
            .route("/loki/api/v1/push", post(push))
            .with_state(seen_tx);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, loki).await.unwrap() });

        let (tx, rx) = mpsc::channel(8);
        tx.send(line("info", "hello")).await.unwrap();
        drop(tx);

        loki_shipper(rx, reqwest::Client::new(), format!("http://{addr}/"), "demo".into()).await;

        let body = seen_rx.recv().await.unwrap();
        assert_eq!(body["streams"][0]["stream"]["app"], "demo");
    }

    #[tokio::test]
    async fn shipper_swallows_unreachable_loki() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(line("info", "lost")).await.unwrap();
        drop(tx);

        // port 1 refuses connections; the shipper just returns
        loki_shipper(rx, reqwest::Client::new(), "http://127.0.0.1:1".into(), "demo".into()).await;
    }
}
