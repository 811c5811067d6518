//! Chat CRUD and chat-scoped query handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use fingraph_models::{ChatMessage, ChatMetadata, ChatMetadataUpdate};

use crate::error::{ApiError, ApiResult};
use crate::handlers::jobs::{JobResponse, QueryRequest};
use crate::metrics;
use crate::state::AppState;

/// Chat creation request.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub initial_message: Option<String>,
}

/// Pagination parameters for chat listing.
#[derive(Debug, Deserialize)]
pub struct ListChatsQuery {
    #[serde(default)]
    pub skip: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Chat listing response.
#[derive(Debug, Serialize)]
pub struct ChatListResponse {
    pub chats: Vec<ChatMetadata>,
    pub total: usize,
}

/// Full chat response: metadata plus the transcript body.
#[derive(Debug, Serialize)]
pub struct ChatDetailResponse {
    #[serde(flatten)]
    pub metadata: ChatMetadata,
    pub messages: Vec<ChatMessage>,
    pub settings: Map<String, Value>,
}

/// Chat deletion response.
#[derive(Debug, Serialize)]
pub struct DeleteChatResponse {
    pub status: String,
    pub chat_id: String,
}

/// Create a new chat.
pub async fn create_chat(
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> ApiResult<Json<ChatMetadata>> {
    let metadata = state
        .chats
        .create(request.title, request.initial_message)
        .await?;
    Ok(Json(metadata))
}

/// List chats, newest activity first.
pub async fn list_chats(
    State(state): State<AppState>,
    Query(query): Query<ListChatsQuery>,
) -> ApiResult<Json<ChatListResponse>> {
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(20).min(100);

    let chats = state.chats.list(skip, limit).await?;
    let total = state.chats.count().await?;

    Ok(Json(ChatListResponse { chats, total }))
}

/// Get a chat with its full transcript.
pub async fn get_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<ChatDetailResponse>> {
    let (metadata, transcript) = state
        .chats
        .get_content(&chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chat not found"))?;

    Ok(Json(ChatDetailResponse {
        metadata,
        messages: transcript.messages,
        settings: transcript.settings,
    }))
}

/// Update chat metadata.
pub async fn update_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(update): Json<ChatMetadataUpdate>,
) -> ApiResult<Json<ChatMetadata>> {
    if update.is_empty() {
        return Err(ApiError::Validation("No fields to update".to_string()));
    }

    let metadata = state.chats.update_metadata(&chat_id, update).await?;
    Ok(Json(metadata))
}

/// Delete a chat.
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<DeleteChatResponse>> {
    state.chats.delete(&chat_id).await?;
    Ok(Json(DeleteChatResponse {
        status: "deleted".to_string(),
        chat_id,
    }))
}

/// Submit a query within a chat.
///
/// The user message is appended to the transcript before the job is
/// enqueued so the history reflects the submission even if the worker is
/// slow to pick it up.
pub async fn submit_chat_query(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<JobResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    if state.chats.get_metadata(&chat_id).await?.is_none() {
        return Err(ApiError::not_found("Chat not found"));
    }

    state
        .chats
        .append_message(&chat_id, ChatMessage::user(request.query.as_str()))
        .await?;

    let job = state.jobs.enqueue(&request.query, Some(chat_id.as_str())).await?;
    state
        .bus
        .status(&job.job_id, "Job queued, waiting for worker...")
        .await?;

    metrics::record_job_enqueued();

    Ok(Json(JobResponse {
        job_id: job.job_id,
        status: "queued".to_string(),
        message: "Query submitted successfully".to_string(),
    }))
}
