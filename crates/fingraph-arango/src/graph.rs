//! Company and filing queries.

use serde_json::{json, Value};

use crate::client::ArangoClient;
use crate::error::ArangoResult;

/// List every company in the knowledge graph.
pub async fn list_companies(client: &ArangoClient) -> ArangoResult<Vec<Value>> {
    if !client.has_collection("companies").await? {
        return Ok(Vec::new());
    }
    client.query("FOR c IN companies RETURN c", json!({})).await
}

/// List all filings linked to a company.
pub async fn list_filings_for_company(
    client: &ArangoClient,
    company_id: &str,
) -> ArangoResult<Vec<Value>> {
    for collection in ["companies", "company_has_filing", "filings"] {
        if !client.has_collection(collection).await? {
            return Ok(Vec::new());
        }
    }

    let aql = r#"
    FOR c IN companies
      FILTER c._key == @company_id
      FOR f IN 1..1 OUTBOUND c company_has_filing
        RETURN f
    "#;

    client.query(aql, json!({ "company_id": company_id })).await
}
