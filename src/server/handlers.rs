// src/server/handlers.rs

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::config::CONFIG;
use crate::engagement::TickInstant;
use crate::schedule::{generator, resolve_status};
use crate::settings::BehaviorSettings;
use crate::state::AppState;

use super::types::*;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!("Request failed: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

fn not_found(what: &str) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("{} not found", what))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn create_character(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCharacterRequest>,
) -> ApiResult<CreateCharacterResponse> {
    let character = state
        .roster
        .create_character(&req.name, &req.persona, req.mood.as_deref())
        .await
        .map_err(internal)?;

    let schedule = generator::schedule_for(
        state.content_engine.as_ref(),
        &character,
        CONFIG.llm_timeout(),
    )
    .await;
    state
        .roster
        .save_schedule(&character.id, &schedule)
        .await
        .map_err(internal)?;

    Ok(Json(CreateCharacterResponse {
        id: character.id,
        name: character.name,
        mood: character.mood,
    }))
}

pub async fn character_status(
    State(state): State<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> ApiResult<StatusResponse> {
    let Some(character) = state
        .roster
        .get_character(&character_id)
        .await
        .map_err(internal)?
    else {
        return Err(not_found("character"));
    };

    let schedule = state
        .roster
        .load_schedule(&character_id)
        .await
        .map_err(internal)?
        .unwrap_or_default();
    let resolved = resolve_status(&schedule, TickInstant::now().local);

    Ok(Json(StatusResponse {
        status: resolved.status,
        activity: resolved.activity,
        mood: character.mood,
    }))
}

pub async fn create_match(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateMatchRequest>,
) -> ApiResult<CreateMatchResponse> {
    if state
        .roster
        .get_character(&req.character_id)
        .await
        .map_err(internal)?
        .is_none()
    {
        return Err(not_found("character"));
    }

    if let Some(existing) = state
        .roster
        .get_match(&req.user_id, &req.character_id)
        .await
        .map_err(internal)?
    {
        return Err((
            StatusCode::CONFLICT,
            format!("match already exists with status {}", existing.status.as_str()),
        ));
    }

    let pair_match = state
        .roster
        .create_match(&req.user_id, &req.character_id)
        .await
        .map_err(internal)?;
    let conversation = state
        .conversations
        .ensure_conversation(&req.user_id, &req.character_id)
        .await
        .map_err(internal)?;
    state
        .engagement
        .get_or_create(&req.user_id, &req.character_id, pair_match.created_at)
        .await
        .map_err(internal)?;

    Ok(Json(CreateMatchResponse {
        match_id: pair_match.id,
        conversation_id: conversation.id,
    }))
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> ApiResult<BehaviorSettings> {
    let settings = state.settings.load(&user_id).await.map_err(internal)?;
    Ok(Json(settings))
}

pub async fn put_settings(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(settings): Json<BehaviorSettings>,
) -> ApiResult<BehaviorSettings> {
    use crate::settings::store::SaveError;

    match state.settings.save(&user_id, &settings).await {
        Ok(()) => Ok(Json(settings)),
        Err(SaveError::Invalid(e)) => {
            Err((StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))
        }
        Err(SaveError::Storage(e)) => Err(internal(e)),
    }
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path((user_id, character_id)): Path<(String, String)>,
    Json(req): Json<PostMessageRequest>,
) -> ApiResult<crate::chat::ChatMessage> {
    let Some(pair_match) = state
        .roster
        .get_match(&user_id, &character_id)
        .await
        .map_err(internal)?
    else {
        return Err(not_found("match"));
    };
    if !pair_match.is_active() {
        return Err((StatusCode::GONE, "match has ended".to_string()));
    }

    let message = state
        .messages
        .post_user_message(&user_id, &character_id, &req.content)
        .await
        .map_err(internal)?;

    Ok(Json(message))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path((user_id, character_id)): Path<(String, String)>,
) -> ApiResult<ReadResponse> {
    let event = state
        .messages
        .mark_read(&user_id, &character_id)
        .await
        .map_err(internal)?;

    match event {
        Some(event) => {
            let due_at = state
                .follow_up
                .arm_for_read(&user_id, &character_id, &event)
                .await
                .map_err(internal)?;
            Ok(Json(ReadResponse {
                follow_up_armed: true,
                due_at: Some(due_at.timestamp()),
            }))
        }
        None => Ok(Json(ReadResponse {
            follow_up_armed: false,
            due_at: None,
        })),
    }
}

pub async fn engagement_status(
    State(state): State<Arc<AppState>>,
    Path((user_id, character_id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let Some(pair_state) = state
        .engagement
        .get(&user_id, &character_id)
        .await
        .map_err(internal)?
    else {
        return Err(not_found("engagement state"));
    };

    let settings = state.settings.load(&user_id).await.map_err(internal)?;
    let phase = crate::engagement::derive_phase(
        &pair_state,
        settings.max_consecutive_proactive,
        chrono::Utc::now(),
    );

    Ok(Json(json!({
        "phase": phase,
        "consecutive_unanswered_proactive": pair_state.consecutive_unanswered_proactive,
        "last_message_at": pair_state.last_message_at.timestamp(),
        "proactive_cooldown_until": pair_state.proactive_cooldown_until.map(|t| t.timestamp()),
        "left_on_read_cooldown_until": pair_state.left_on_read_cooldown_until.map(|t| t.timestamp()),
    })))
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Path((user_id, character_id)): Path<(String, String)>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<HistoryResponse> {
    let limit = query.limit.clamp(1, 200);
    let (summary, messages) = state
        .messages
        .history(&user_id, &character_id, limit)
        .await
        .map_err(internal)?;

    Ok(Json(HistoryResponse { summary, messages }))
}
