//! ArangoDB client tests against a mock server.

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fingraph_arango::{ArangoClient, ArangoConfig, ArangoError};

fn test_client(server: &MockServer) -> ArangoClient {
    ArangoClient::new(ArangoConfig {
        url: server.uri(),
        database: "financial_kg".into(),
        username: "root".into(),
        password: String::new(),
        ..ArangoConfig::default()
    })
    .expect("Failed to create client")
}

#[tokio::test]
async fn test_get_document_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_db/financial_kg/_api/document/chats/c1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "_key": "c1", "title": "Chat c1" })),
        )
        .mount(&server)
        .await;

    let client = test_client(&server);
    let doc = client.get_document("chats", "c1").await.expect("get failed");
    assert_eq!(doc.unwrap()["title"], "Chat c1");
}

#[tokio::test]
async fn test_get_document_missing_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/_db/financial_kg/_api/document/chats/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let doc = client
        .get_document("chats", "missing")
        .await
        .expect("get failed");
    assert!(doc.is_none());
}

#[tokio::test]
async fn test_insert_conflict_maps_to_already_exists() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_db/financial_kg/_api/document/companies"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client
        .insert_document("companies", &json!({ "_key": "tcs" }))
        .await
        .unwrap_err();
    assert!(matches!(err, ArangoError::AlreadyExists(_)));
}

#[tokio::test]
async fn test_query_follows_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_db/financial_kg/_api/cursor"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "result": [{ "n": 1 }],
            "hasMore": true,
            "id": "42"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/_db/financial_kg/_api/cursor/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": [{ "n": 2 }],
            "hasMore": false
        })))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let rows = client
        .query("FOR c IN companies RETURN c", json!({}))
        .await
        .expect("query failed");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["n"], 2);
}

#[tokio::test]
async fn test_delete_missing_document_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/_db/financial_kg/_api/document/chats/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = test_client(&server);
    let err = client.delete_document("chats", "gone").await.unwrap_err();
    assert!(matches!(err, ArangoError::NotFound(_)));
}
