use std::collections::BTreeMap;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::message::MessageType;
use crate::validation::{PSEUDO_MAX_LENGTH, PSEUDO_MIN_LENGTH};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/info", get(info))
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub max_message_length: usize,
    /// Upper-case label → wire name, e.g. `"URGENT": "urgent"`.
    pub message_types: BTreeMap<String, String>,
    pub history_capacity: usize,
    pub history_on_connect: usize,
    pub max_history_page: usize,
    pub persist_debounce_ms: u64,
    pub pseudo_min_length: usize,
    pub pseudo_max_length: usize,
    pub connected_users: usize,
    pub server_time: DateTime<Utc>,
}

#[utoipa::path(
    get,
    path = "/info",
    tag = "Info",
    responses(
        (status = 200, description = "Configured limits", body = InfoResponse),
    ),
)]
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let config = &state.config;
    let message_types = MessageType::ALL
        .iter()
        .map(|t| (t.as_str().to_uppercase(), t.as_str().to_string()))
        .collect();

    Json(InfoResponse {
        max_message_length: config.max_message_length,
        message_types,
        history_capacity: config.history_capacity,
        history_on_connect: config.history_on_connect,
        max_history_page: config.max_history_page,
        persist_debounce_ms: config.persist_debounce.as_millis() as u64,
        pseudo_min_length: PSEUDO_MIN_LENGTH,
        pseudo_max_length: PSEUDO_MAX_LENGTH,
        connected_users: state.hub.connected_users(),
        server_time: minitalk_common::time::now_millis(),
    })
}
