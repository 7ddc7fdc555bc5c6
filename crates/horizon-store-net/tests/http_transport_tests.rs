//! Integration tests for the HTTP transport.

use horizon_store_net::{HttpClient, NetworkError, Transport, TransportRequest};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::builder()
        .base_url(server.uri())
        .expect("valid base url")
        .bearer_auth("secret")
        .build()
        .expect("Failed to build client")
}

#[tokio::test]
async fn test_get_sends_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users"))
        .and(query_param("start", "20"))
        .and(query_param("limit", "10"))
        .and(query_param("sorters", r#"{"age":"ASC"}"#))
        .and(header("authorization", "Bearer secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "records": [{"id": 1}],
            "total": 1
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let body = client
        .send(
            TransportRequest::get("/users")
                .param("start", 20)
                .param("limit", 10)
                .param("sorters", r#"{"age":"ASC"}"#),
        )
        .await
        .expect("request should succeed");

    assert_eq!(body["total"], json!(1));
    assert_eq!(body["records"][0]["id"], json!(1));
}

#[tokio::test]
async fn test_patch_sends_json_body() {
    let server = MockServer::start().await;
    let records = json!([{"origin": {"id": 7}, "updated": {"name": "Bob"}}]);
    Mock::given(method("PATCH"))
        .and(path("/users"))
        .and(body_json(json!({ "records": records.clone(), "tenant": "acme" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let body = client
        .send(
            TransportRequest::patch("users")
                .param("records", records)
                .param("tenant", "acme"),
        )
        .await
        .expect("request should succeed");

    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .send(TransportRequest::get("/users"))
        .await
        .expect_err("503 must fail");

    assert_eq!(
        err,
        NetworkError::HttpStatus {
            status: 503,
            message: Some("maintenance".to_string()),
        }
    );
}

#[tokio::test]
async fn test_non_json_body_is_a_json_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .send(TransportRequest::post("/users"))
        .await
        .expect_err("html is not json");

    assert!(matches!(err, NetworkError::Json(_)));
}
