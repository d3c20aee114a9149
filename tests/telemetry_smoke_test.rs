//! Smoke tests against a live OTLP collector with Tempo and Prometheus
//! behind it (collector on :4317, Tempo on :3200, Prometheus on :9090).
//!
//! Run with:
//! ```sh
//! cargo test --test telemetry_smoke_test -- --ignored --nocapture
//! ```

use std::sync::OnceLock;
use std::time::Duration;

use jobrelay::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry, job, metrics};
use opentelemetry::KeyValue;

static TELEMETRY: OnceLock<TelemetryGuard> = OnceLock::new();

fn ensure_telemetry() -> &'static TelemetryGuard {
    TELEMETRY.get_or_init(|| {
        init_telemetry(TelemetryConfig {
            endpoint: Some("http://localhost:4317".to_string()),
            service_name: "jobrelay-smoke-test".to_string(),
            ..Default::default()
        })
        .expect("failed to init telemetry")
    })
}

async fn flush_and_wait(guard: &TelemetryGuard) {
    guard.force_flush();
    tokio::time::sleep(Duration::from_secs(8)).await;
}

#[test]
#[ignore]
fn smoke_traces() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();

        {
            let span = job::start_event_span("completed", "WzyPPh4qTG2fECo7TF1ufw", 0);
            let _enter = span.enter();
            job::record_project(&span, "gaia");
            let flush = job::start_flush_span("gaia", 1);
            let _flush = flush.enter();
            job::record_outcome(&span, "reported");
        }

        flush_and_wait(guard).await;

        let resp = reqwest::Client::new()
            .get("http://localhost:3200/api/search")
            .query(&[("tags", "service.name=jobrelay-smoke-test"), ("limit", "5")])
            .send()
            .await
            .expect("failed to query Tempo");
        assert!(resp.status().is_success(), "Tempo query failed: {}", resp.status());

        let body: serde_json::Value = resp.json().await.expect("failed to parse Tempo response");
        let traces = body["traces"].as_array();
        assert!(
            traces.is_some_and(|t| !t.is_empty()),
            "expected traces in Tempo, got: {body}"
        );
    });
}

#[test]
#[ignore]
fn smoke_metrics() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let guard = ensure_telemetry();

        metrics::events_received().add(2, &[KeyValue::new("kind", "completed")]);
        metrics::flush_duration_ms().record(42.5, &[]);

        flush_and_wait(guard).await;

        let resp = reqwest::Client::new()
            .get("http://localhost:9090/api/v1/query")
            .query(&[("query", "jobrelay_events_received_total")])
            .send()
            .await
            .expect("failed to query Prometheus");
        assert!(
            resp.status().is_success(),
            "Prometheus query failed: {}",
            resp.status()
        );

        let body: serde_json::Value = resp
            .json()
            .await
            .expect("failed to parse Prometheus response");
        let results = body["data"]["result"].as_array();
        assert!(
            results.is_some_and(|r| !r.is_empty()),
            "expected metric results in Prometheus, got: {body}"
        );
    });
}
