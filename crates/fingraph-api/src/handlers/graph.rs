//! Company and filing handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

/// List all companies in the knowledge graph.
pub async fn list_companies(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let companies = fingraph_arango::list_companies(&state.graph).await?;
    Ok(Json(json!({ "companies": companies })))
}

/// List all filings for a company.
pub async fn list_filings(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let filings = fingraph_arango::list_filings_for_company(&state.graph, &company_id).await?;
    Ok(Json(json!({ "filings": filings, "company_id": company_id })))
}
