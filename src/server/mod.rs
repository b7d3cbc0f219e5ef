// src/server/mod.rs

//! Thin HTTP surface over the engagement core:
//! - GET  /api/health - liveness
//! - GET  /api/characters/{id}/status - schedule-resolved presence
//! - POST /api/characters - create a character (+ generated schedule)
//! - POST /api/matches - match a user with a character
//! - GET/PUT /api/settings/{user_id} - behavior settings
//! - POST /api/chats/{user}/{character}/messages - user sends a message
//! - POST /api/chats/{user}/{character}/read - mark character messages read
//! - GET  /api/chats/{user}/{character}/messages - history page
//! - GET  /api/chats/{user}/{character}/engagement - derived pair phase

mod handlers;
pub mod types;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/characters", post(handlers::create_character))
        .route(
            "/api/characters/{id}/status",
            get(handlers::character_status),
        )
        .route("/api/matches", post(handlers::create_match))
        .route(
            "/api/settings/{user_id}",
            get(handlers::get_settings).put(handlers::put_settings),
        )
        .route(
            "/api/chats/{user_id}/{character_id}/messages",
            post(handlers::post_message).get(handlers::get_messages),
        )
        .route(
            "/api/chats/{user_id}/{character_id}/read",
            post(handlers::mark_read),
        )
        .route(
            "/api/chats/{user_id}/{character_id}/engagement",
            get(handlers::engagement_status),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
