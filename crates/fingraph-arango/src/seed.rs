//! Development seed data for the knowledge graph.

use serde_json::{json, Value};
use tracing::info;

use crate::client::ArangoClient;
use crate::error::{ArangoError, ArangoResult};

fn seed_companies() -> Vec<Value> {
    vec![
        json!({ "_key": "reliance", "name": "Reliance Industries Limited", "nse_symbol": "RELIANCE" }),
        json!({ "_key": "tcs", "name": "Tata Consultancy Services", "nse_symbol": "TCS" }),
        json!({ "_key": "infosys", "name": "Infosys Limited", "nse_symbol": "INFY" }),
        json!({ "_key": "hdfc", "name": "HDFC Bank", "nse_symbol": "HDFCBANK" }),
    ]
}

fn seed_filings() -> Vec<Value> {
    vec![
        json!({
            "_key": "reliance_fy24_annual",
            "nse_symbol": "RELIANCE",
            "type": "annual",
            "period": "FY24",
            "pdf_url": "/data/filings/reliance_fy24.pdf"
        }),
        json!({
            "_key": "tcs_fy24_annual",
            "nse_symbol": "TCS",
            "type": "annual",
            "period": "FY24",
            "pdf_url": "/data/filings/tcs_fy24.pdf"
        }),
        json!({
            "_key": "infosys_fy24_annual",
            "nse_symbol": "INFY",
            "type": "annual",
            "period": "FY24",
            "pdf_url": "/data/filings/infosys_fy24.pdf"
        }),
        json!({
            "_key": "hdfc_fy24_annual",
            "nse_symbol": "HDFCBANK",
            "type": "annual",
            "period": "FY24",
            "pdf_url": "/data/filings/hdfc_fy24.pdf"
        }),
    ]
}

fn seed_edges() -> Vec<Value> {
    vec![
        json!({
            "_key": "reliance_has_reliance_fy24_annual",
            "_from": "companies/reliance",
            "_to": "filings/reliance_fy24_annual"
        }),
        json!({
            "_key": "tcs_has_tcs_fy24_annual",
            "_from": "companies/tcs",
            "_to": "filings/tcs_fy24_annual"
        }),
        json!({
            "_key": "infosys_has_infosys_fy24_annual",
            "_from": "companies/infosys",
            "_to": "filings/infosys_fy24_annual"
        }),
        json!({
            "_key": "hdfc_has_hdfc_fy24_annual",
            "_from": "companies/hdfc",
            "_to": "filings/hdfc_fy24_annual"
        }),
    ]
}

async fn ensure_document(
    client: &ArangoClient,
    collection: &str,
    document: &Value,
) -> ArangoResult<()> {
    match client.insert_document(collection, document).await {
        Ok(()) | Err(ArangoError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Insert the seed companies, filings and edges, skipping existing keys.
pub async fn seed_data(client: &ArangoClient) -> ArangoResult<()> {
    for company in seed_companies() {
        ensure_document(client, "companies", &company).await?;
    }
    for filing in seed_filings() {
        ensure_document(client, "filings", &filing).await?;
    }
    for edge in seed_edges() {
        ensure_document(client, "company_has_filing", &edge).await?;
    }

    info!("Seed data ensured");
    Ok(())
}
