//! ArangoDB REST API client.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ArangoError, ArangoResult};

/// ArangoDB client configuration.
#[derive(Debug, Clone)]
pub struct ArangoConfig {
    /// Server URL, e.g. `http://localhost:8529`
    pub url: String,
    /// Database name
    pub database: String,
    /// Username for basic auth
    pub username: String,
    /// Password for basic auth
    pub password: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for ArangoConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8529".to_string(),
            database: "financial_kg".to_string(),
            username: "root".to_string(),
            password: String::new(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl ArangoConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("ARANGO_URL")
                .unwrap_or_else(|_| "http://localhost:8529".to_string()),
            database: std::env::var("ARANGO_DB").unwrap_or_else(|_| "financial_kg".to_string()),
            username: std::env::var("ARANGO_USERNAME").unwrap_or_else(|_| "root".to_string()),
            password: std::env::var("ARANGO_PASSWORD").unwrap_or_default(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Deserialize)]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(rename = "hasMore", default)]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Deserialize)]
struct IndexListResponse {
    #[serde(default)]
    indexes: Vec<Value>,
}

/// ArangoDB REST API client.
#[derive(Clone)]
pub struct ArangoClient {
    http: Client,
    config: ArangoConfig,
    base_url: String,
}

impl ArangoClient {
    /// Create a new client.
    pub fn new(config: ArangoConfig) -> ArangoResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ArangoError::Network)?;

        let base_url = format!("{}/_db/{}/_api", config.url, config.database);

        Ok(Self {
            http,
            config,
            base_url,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> ArangoResult<Self> {
        Self::new(ArangoConfig::from_env())
    }

    pub fn database(&self) -> &str {
        &self.config.database
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.config.username, Some(&self.config.password))
    }

    /// Create the configured database when it does not exist yet.
    pub async fn ensure_database(&self) -> ArangoResult<()> {
        let url = format!("{}/_db/_system/_api/database", self.config.url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "name": self.config.database }))
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => {
                debug!(database = %self.config.database, "Created database");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "POST {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Whether a collection exists.
    pub async fn has_collection(&self, name: &str) -> ArangoResult<bool> {
        let url = format!("{}/collection/{}", self.base_url, name);
        let response = self.request(reqwest::Method::GET, &url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "GET {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Create a collection when it does not exist yet.
    pub async fn ensure_collection(&self, name: &str, edge: bool) -> ArangoResult<()> {
        let url = format!("{}/collection", self.base_url);
        // ArangoDB collection types: 2 = document, 3 = edge
        let collection_type = if edge { 3 } else { 2 };
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "name": name, "type": collection_type }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                debug!(collection = name, "Created collection");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "POST {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Create a persistent index when no equivalent one exists.
    pub async fn ensure_persistent_index(
        &self,
        collection: &str,
        fields: &[&str],
    ) -> ArangoResult<()> {
        let url = format!("{}/index?collection={}", self.base_url, collection);
        let response = self.request(reqwest::Method::GET, &url).send().await?;

        if response.status() == StatusCode::OK {
            let existing: IndexListResponse = response.json().await?;
            let wanted: Vec<Value> = fields.iter().map(|f| json!(f)).collect();
            let already_there = existing.indexes.iter().any(|idx| {
                idx.get("type").and_then(Value::as_str) == Some("persistent")
                    && idx.get("fields").and_then(Value::as_array) == Some(&wanted)
            });
            if already_there {
                return Ok(());
            }
        }

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "type": "persistent", "fields": fields, "unique": false }))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "POST {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Get a document by key. Returns `None` when absent.
    pub async fn get_document(&self, collection: &str, key: &str) -> ArangoResult<Option<Value>> {
        let url = format!("{}/document/{}/{}", self.base_url, collection, key);
        let response = self.request(reqwest::Method::GET, &url).send().await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "GET {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Insert a document (the body should carry `_key`).
    pub async fn insert_document(&self, collection: &str, document: &Value) -> ArangoResult<()> {
        let url = format!("{}/document/{}", self.base_url, collection);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(document)
            .send()
            .await?;

        match response.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => Ok(()),
            StatusCode::CONFLICT => Err(ArangoError::AlreadyExists(format!(
                "{}/{}",
                collection,
                document
                    .get("_key")
                    .and_then(Value::as_str)
                    .unwrap_or("<no key>")
            ))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "POST {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Merge a partial document into an existing one.
    pub async fn patch_document(
        &self,
        collection: &str,
        key: &str,
        patch: &Value,
    ) -> ArangoResult<()> {
        let url = format!("{}/document/{}/{}", self.base_url, collection, key);
        let response = self
            .request(reqwest::Method::PATCH, &url)
            .json(patch)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED | StatusCode::CREATED => Ok(()),
            StatusCode::NOT_FOUND => {
                Err(ArangoError::not_found(format!("{}/{}", collection, key)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "PATCH {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Delete a document by key.
    pub async fn delete_document(&self, collection: &str, key: &str) -> ArangoResult<()> {
        let url = format!("{}/document/{}/{}", self.base_url, collection, key);
        let response = self.request(reqwest::Method::DELETE, &url).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => {
                Err(ArangoError::not_found(format!("{}/{}", collection, key)))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ArangoError::request_failed(format!(
                    "DELETE {} failed with {}: {}",
                    url, status, body
                )))
            }
        }
    }

    /// Run an AQL query and collect the full result set, following the
    /// cursor while the server reports more batches.
    pub async fn query(&self, aql: &str, bind_vars: Value) -> ArangoResult<Vec<Value>> {
        let url = format!("{}/cursor", self.base_url);
        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&json!({ "query": aql, "bindVars": bind_vars, "batchSize": 1000 }))
            .send()
            .await?;

        let status = response.status();
        if !(status == StatusCode::CREATED || status == StatusCode::OK) {
            let body = response.text().await.unwrap_or_default();
            return Err(ArangoError::request_failed(format!(
                "POST {} failed with {}: {}",
                url, status, body
            )));
        }

        let mut cursor: CursorResponse = response.json().await?;
        let mut results = std::mem::take(&mut cursor.result);

        while cursor.has_more {
            let Some(id) = cursor.id.as_deref() else {
                break;
            };
            let next_url = format!("{}/cursor/{}", self.base_url, id);
            let response = self
                .request(reqwest::Method::PUT, &next_url)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(ArangoError::request_failed(format!(
                    "PUT {} failed with {}: {}",
                    next_url, status, body
                )));
            }

            let id = cursor.id.clone();
            cursor = response.json().await?;
            if cursor.id.is_none() {
                cursor.id = id;
            }
            results.append(&mut cursor.result);
        }

        Ok(results)
    }
}
