use crate::common::{get, test_app};
use axum::http::StatusCode;

#[tokio::test]
async fn test_health_endpoints() {
    let app = test_app();

    let (status, body) = get(app.router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = get(app.router.clone(), "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = get(app.router, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_stats_shape() {
    let app = test_app();

    let (status, body) = get(app.router, "/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["memory"]["in_use_bytes"], 0);
    for signal in ["traces", "metrics", "logs"] {
        assert_eq!(body[signal]["exported_records"], 0, "{signal}");
        assert_eq!(body[signal]["dropped_records"], 0, "{signal}");
    }
}

#[tokio::test]
async fn test_unknown_route() {
    let app = test_app();
    let (status, _) = get(app.router, "/v1/profiles").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
