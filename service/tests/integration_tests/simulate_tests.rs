use crate::common::{get, test_app, test_app_with};
use axum::http::StatusCode;
use std::time::Duration;

#[tokio::test]
async fn test_simulate_error() {
    let app = test_app();

    let (status, body) = get(&app.router, "/api/simulate-error").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "This is a simulated error");
}

#[tokio::test(start_paused = true)]
async fn test_simulate_slow_sleeps_for_delay() {
    let app = test_app();

    let started = tokio::time::Instant::now();
    let (status, body) = get(&app.router, "/api/simulate-slow?delay=1.5").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Delayed response after 1.5 seconds");
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test(start_paused = true)]
async fn test_simulate_slow_default_delay() {
    let app = test_app();

    let started = tokio::time::Instant::now();
    let (status, _) = get(&app.router, "/api/simulate-slow").await;

    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_simulate_slow_is_capped() {
    let app = test_app_with(|state| state.with_max_slow_delay(Duration::from_secs(5)));

    let started = tokio::time::Instant::now();
    let (status, body) = get(&app.router, "/api/simulate-slow?delay=3600").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Delayed response after 5 seconds");
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test]
async fn test_simulate_slow_rejects_negative_delay() {
    let app = test_app();

    let (status, body) = get(&app.router, "/api/simulate-slow?delay=-1").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("non-negative"));
}
