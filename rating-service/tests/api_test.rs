//! Integration tests for the v2 HTTP endpoints.

mod common;

use chrono::{Datelike, Duration, TimeZone, Utc};
use common::TestApp;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use std::str::FromStr;

#[tokio::test]
async fn health_check_works() {
    let app = TestApp::spawn().await;

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "rating-service");
    assert_eq!(body["erp"], "disabled");
    assert_eq!(body["collection"]["status"], "ok");
}

#[tokio::test]
async fn health_reports_collection_ok_for_fresh_tenants() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let body: serde_json::Value = app.get("/health").await.json().await.unwrap();
    assert_eq!(body["collection"]["status"], "ok");
    assert_eq!(body["collection"]["stale_tenants"], serde_json::json!([]));
}

#[tokio::test]
async fn health_reports_tenants_with_stale_checkpoints() {
    let app = TestApp::spawn().await;
    // Checkpoints land well past the two-hour staleness threshold.
    let old = Utc::now() - Duration::days(2);
    app.seed_project_at("p1", "demo", old).await;
    app.seed_project_at("p2", "ignored", old).await;

    let response = app.get("/health").await;
    // Stale collection is a warning, not a liveness failure.
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["collection"]["status"], "stale");
    // Tenants on the ignore list never count as stale.
    assert_eq!(
        body["collection"]["stale_tenants"],
        serde_json::json!(["demo"])
    );
}

#[tokio::test]
async fn missing_start_is_a_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let response = app.get("/v2/costs?project_id=p1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unparseable_dates_are_a_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    for query in [
        "/v2/costs?project_id=p1&start=01-02-2024",
        "/v2/costs?project_id=p1&start=2024-01-01T10:00",
        "/v2/costs?project_id=p1&start=2024-01-01&end=yesterday",
    ] {
        let response = app.get(query).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "for {}", query);
    }
}

#[tokio::test]
async fn inverted_range_is_a_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let response = app
        .get("/v2/costs?project_id=p1&start=2024-02-01&end=2024-01-01")
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .get("/v2/costs?project_id=nobody&start=2024-01-01")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn measurements_group_by_service_and_unit() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let w1 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    let w2 = w1 + Duration::hours(1);
    let w3 = w2 + Duration::hours(1);
    app.seed_usage("p1", "r1", "compute", "hour", "5", w1, w2)
        .await;
    app.seed_usage("p1", "r1", "compute", "hour", "3", w2, w3)
        .await;
    app.seed_usage("p1", "r1", "network", "second", "120", w1, w2)
        .await;

    let response = app
        .get("/v2/measurements?project_id=p1&start=2024-01-10&end=2024-01-11")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    let measurements = body["measurements"]["measurements"].as_array().unwrap();
    assert_eq!(measurements.len(), 2);

    let compute = measurements
        .iter()
        .find(|m| m["service"] == "compute")
        .unwrap();
    assert_eq!(compute["unit"], "hour");
    assert_eq!(
        Decimal::from_str(compute["volume"].as_str().unwrap()).unwrap(),
        Decimal::from(8)
    );
    assert_eq!(compute["resource"]["name"], "r1-name");
}

#[tokio::test]
async fn costs_multiply_aggregated_volume_by_the_file_rate() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let w1 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    let w2 = w1 + Duration::hours(1);
    app.seed_usage("p1", "r1", "compute", "hour", "8", w1, w2)
        .await;

    let response = app
        .get("/v2/costs?project_id=p1&start=2024-01-10&end=2024-01-11")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    let cost = &body["costs"]["cost"];
    assert_eq!(
        Decimal::from_str(cost["total_cost"].as_str().unwrap()).unwrap(),
        Decimal::from_str("4.0").unwrap()
    );
    assert_eq!(
        Decimal::from_str(cost["breakdown"]["compute"].as_str().unwrap()).unwrap(),
        Decimal::from_str("4.0").unwrap()
    );
}

#[tokio::test]
async fn tenant_parameter_is_accepted_as_an_alias() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let response = app.get("/v2/costs?tenant=p1&start=2024-01-10").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn quotation_covers_the_current_month_and_drops_sub_epsilon_lines() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let now = Utc::now();
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .unwrap();
    let start = (now - Duration::hours(2)).max(month_start);
    let end = now - Duration::seconds(1);
    app.seed_usage("p1", "r1", "compute", "hour", "8", start, end)
        .await;
    app.seed_usage("p1", "r2", "storage", "gigabyte", "0.000001", start, end)
        .await;

    let response = app.get("/v2/quotations?project_id=p1&detailed=true").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    let quotations = body["quotations"]["quotations"].as_object().unwrap();
    assert_eq!(quotations.len(), 1);

    let (key, quotation) = quotations.iter().next().unwrap();
    assert_eq!(key, &now.date_naive().to_string());
    assert_eq!(
        Decimal::from_str(quotation["total_cost"].as_str().unwrap()).unwrap(),
        Decimal::from_str("4.0").unwrap()
    );
    // The sub-epsilon storage line is absent entirely.
    assert!(quotation["breakdown"].get("storage").is_none());
    let details = quotation["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0]["resource_name"], "r1-name");
}

#[tokio::test]
async fn invoices_cover_whole_months_keyed_by_their_last_day() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let w1 = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
    let w2 = w1 + Duration::hours(1);
    app.seed_usage("p1", "r1", "compute", "hour", "10", w1, w2)
        .await;

    let response = app
        .get("/v2/invoices?project_id=p1&start=2024-01-01&end=2024-02-15")
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value = response.json().await.unwrap();
    let invoices = body["invoices"]["invoices"].as_object().unwrap();
    assert_eq!(invoices.len(), 1, "only January closed inside the range");
    let january = &invoices["2024-01-31"];
    assert_eq!(
        Decimal::from_str(january["total_cost"].as_str().unwrap()).unwrap(),
        Decimal::from_str("5.0").unwrap()
    );
}

#[tokio::test]
async fn invoices_are_deterministic_over_unchanged_usage() {
    let app = TestApp::spawn().await;
    app.seed_project("p1", "demo").await;

    let w1 = Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap();
    let w2 = w1 + Duration::hours(1);
    app.seed_usage("p1", "r1", "compute", "hour", "7", w1, w2)
        .await;

    let first: serde_json::Value = app
        .get("/v2/invoices?project_id=p1&start=2024-03-01&end=2024-04-01")
        .await
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = app
        .get("/v2/invoices?project_id=p1&start=2024-03-01&end=2024-04-01")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn products_are_unavailable_without_a_pricing_back_end() {
    let app = TestApp::spawn().await;

    let response = app.get("/v2/products").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_endpoint_serves_prometheus_text() {
    let app = TestApp::spawn().await;

    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
}
