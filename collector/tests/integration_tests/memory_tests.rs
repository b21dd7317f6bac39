use crate::common::{get, post_json, test_app_with};
use axum::http::{header, StatusCode};
use collector::{Config, RETRY_AFTER_SECS};
use serde_json::json;
use shared::config::MemoryLimits;
use tokio_test::assert_ok;

fn tight() -> Config {
    Config {
        memory: MemoryLimits {
            limit_bytes: 4_096,
            spike_bytes: 1_024,
        },
        ..Config::default()
    }
}

fn padded_log_batch(message_len: usize) -> serde_json::Value {
    json!({
        "resource": { "service.name": "flask-backend" },
        "records": [{
            "timestamp": "2026-01-01T00:00:00Z",
            "message": "x".repeat(message_len)
        }]
    })
}

#[tokio::test]
async fn test_small_batches_accepted_for_every_signal() {
    let app = test_app_with(&tight());

    let bodies = [
        ("/v1/traces", json!({ "resource": { "service.name": "api" }, "records": [] })),
        ("/v1/metrics", json!({ "resource": { "service.name": "api" }, "records": [] })),
        ("/v1/logs", padded_log_batch(100)),
    ];
    for (uri, body) in bodies {
        let (status, _, _) = post_json(app.router.clone(), uri, &body).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn test_oversized_batch_refused_for_every_signal() {
    let app = test_app_with(&tight());

    for uri in ["/v1/traces", "/v1/metrics", "/v1/logs"] {
        let (status, headers, body) =
            post_json(app.router.clone(), uri, &padded_log_batch(5_000)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        assert_eq!(
            headers.get(header::RETRY_AFTER).unwrap(),
            &RETRY_AFTER_SECS.to_string()
        );
        assert_eq!(body["code"], 503);
    }

    let (_, stats) = get(app.router, "/stats").await;
    assert_eq!(stats["memory"]["refused"], 3);
    assert_eq!(stats["memory"]["in_use_bytes"], 0);
}

#[tokio::test]
async fn test_buffered_bytes_count_until_exported() {
    let mut config = tight();
    config.batch = config
        .batch
        .with_scheduled_delay(std::time::Duration::from_secs(3600));
    let app = test_app_with(&config);

    let (status, _, _) = post_json(app.router.clone(), "/v1/logs", &padded_log_batch(2_000)).await;
    assert_eq!(status, StatusCode::OK);
    let held = app.state.pipeline().guard().in_use();
    assert!(held > 2_000);

    // The first batch is still buffered, so a second one crosses the ceiling.
    let (status, _, _) = post_json(app.router.clone(), "/v1/logs", &padded_log_batch(2_000)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    assert_ok!(app.state.pipeline().force_flush().await);
    assert_eq!(app.state.pipeline().guard().in_use(), 0);

    let (status, _, _) = post_json(app.router, "/v1/logs", &padded_log_batch(2_000)).await;
    assert_eq!(status, StatusCode::OK);
}
