//! Knowledge-graph schema bootstrap.

use tracing::info;

use crate::client::ArangoClient;
use crate::error::ArangoResult;

pub const DOCUMENT_COLLECTIONS: &[&str] = &["companies", "filings", "metrics", "documents", "chats"];

pub const EDGE_COLLECTIONS: &[&str] = &[
    "company_has_filing",
    "filing_has_metric",
    "subsidiary",
    "competitor",
];

/// Ensure the database, collections and indexes exist.
///
/// Safe to run on every startup; everything is create-if-missing.
pub async fn ensure_schema(client: &ArangoClient) -> ArangoResult<()> {
    client.ensure_database().await?;

    for name in DOCUMENT_COLLECTIONS {
        client.ensure_collection(name, false).await?;
    }
    for name in EDGE_COLLECTIONS {
        client.ensure_collection(name, true).await?;
    }

    ensure_indexes(client).await?;

    info!(database = %client.database(), "Schema ensured");
    Ok(())
}

async fn ensure_indexes(client: &ArangoClient) -> ArangoResult<()> {
    client.ensure_persistent_index("companies", &["name"]).await?;
    client
        .ensure_persistent_index("companies", &["nse_symbol"])
        .await?;
    client
        .ensure_persistent_index("filings", &["nse_symbol"])
        .await?;
    client
        .ensure_persistent_index("filings", &["period", "type"])
        .await?;
    Ok(())
}
