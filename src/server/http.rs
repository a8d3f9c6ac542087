//! # HTTP Endpoints
//!
//! Maps the peer-facing HTTP+JSON surface onto [`ServerMiddleware::handle_message`].
//!
//! | Endpoint                | Body                   | Success     | Failure          |
//! |-------------------------|------------------------|-------------|------------------|
//! | `POST /ping`            | `{}`                   | 200 `{}`    |                  |
//! | `POST /electation`      | `{}`                   | 200 `{}`    |                  |
//! | `POST /leader-elected`  | `{"leaderID": "..."}`  | 200 `{}`    | 400 `{"error"}`  |
//! | `GET  /status`          |                        | 200 status  |                  |

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use log::warn;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::common::error::ProtocolError;
use crate::common::messages::{parse_announcement, Message};
use crate::server::middleware::ServerMiddleware;
use crate::server::state::Snapshot;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    id: String,
    #[serde(flatten)]
    state: Snapshot,
}

type Rejection = (StatusCode, Json<ErrorResponse>);

pub fn router(node: Arc<ServerMiddleware>) -> Router {
    Router::new()
        .route("/ping", post(ping))
        .route("/electation", post(electation))
        .route("/leader-elected", post(leader_elected))
        .route("/status", get(status))
        .with_state(node)
}

async fn ping(State(node): State<Arc<ServerMiddleware>>) -> Result<Json<Value>, Rejection> {
    dispatch(&node, Message::Ping)
}

async fn electation(State(node): State<Arc<ServerMiddleware>>) -> Result<Json<Value>, Rejection> {
    dispatch(&node, Message::ElectionRequest)
}

async fn leader_elected(
    State(node): State<Arc<ServerMiddleware>>,
    body: Bytes,
) -> Result<Json<Value>, Rejection> {
    let leader_id = parse_announcement(&body).map_err(|e| {
        warn!("⚠️  {} rejected leader-elected request: {}", node.id(), e);
        reject(e)
    })?;
    dispatch(&node, Message::LeaderAnnouncement { leader_id })
}

async fn status(State(node): State<Arc<ServerMiddleware>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        id: node.id().to_string(),
        state: node.snapshot(),
    })
}

fn dispatch(node: &Arc<ServerMiddleware>, message: Message) -> Result<Json<Value>, Rejection> {
    node.handle_message(message).map_err(reject)?;
    Ok(Json(json!({})))
}

fn reject(error: ProtocolError) -> Rejection {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}
