//! HTTP 핸들러

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::ApiError;
use super::AppState;
use crate::knowledge::ScoredChunk;
use crate::llm::{ChatMessage, ChatRole};
use crate::rag::{render_answer, Answer, CriteriaAssistant};

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub lender_filter: Option<String>,
    /// 없으면 설정의 `retrieval.top_k`
    #[serde(default)]
    pub num_results: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// 이전 대화 (user/assistant)
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub query: String,
    #[serde(default)]
    pub lender_filter: Option<String>,
    #[serde(default)]
    pub num_results: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub search_results: Vec<ScoredChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 빈 문자열 필터는 "전체"로 취급
fn lender_filter(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn require_assistant(state: &AppState) -> Result<&CriteriaAssistant, ApiError> {
    state.assistant.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("OpenAI API key is not configured".to_string())
    })
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let database_available = match state.store.count().await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!("Vector store unavailable: {:#}", e);
            false
        }
    };

    Json(json!({
        "status": "healthy",
        "database_available": database_available,
        "openai_configured": state.assistant.is_some(),
    }))
}

/// 카탈로그 + 색인된 대출기관 이름
pub async fn lenders(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let indexed = state.store.lender_names().await.map_err(ApiError::internal)?;

    let mut body = match &state.catalog {
        Some(catalog) => serde_json::to_value(catalog).map_err(ApiError::internal)?,
        None => json!({ "lender_categories": {} }),
    };

    if let Some(object) = body.as_object_mut() {
        let display_names = state
            .catalog
            .as_ref()
            .map(|c| c.display_names(&state.normalizer))
            .unwrap_or_default();
        object.insert("display_names".to_string(), json!(display_names));
        object.insert("indexed_lenders".to_string(), json!(indexed));
    }

    Ok(Json(body))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let assistant = require_assistant(&state)?;
    let top_k = request.num_results.unwrap_or(state.default_top_k);

    let results = assistant
        .search(&request.query, top_k, lender_filter(&request.lender_filter))
        .await?;

    Ok(Json(results))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let assistant = require_assistant(&state)?;
    let top_k = request.num_results.unwrap_or(state.default_top_k);

    // 시스템 프롬프트는 서버가 만든다
    let conversation: Vec<ChatMessage> = request
        .messages
        .into_iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();

    let outcome = assistant
        .answer_query(
            &conversation,
            &request.query,
            lender_filter(&request.lender_filter),
            top_k,
        )
        .await;

    let error = match &outcome.answer {
        Answer::Failed(e) => Some(e.to_string()),
        _ => outcome.diagnostic.clone(),
    };

    Ok(Json(ChatResponse {
        response: render_answer(&outcome.answer),
        search_results: outcome.results,
        error,
    }))
}
