//! `POST /api/command`: turn a natural-language command into catalog
//! operations, run them against the room store and broadcast the result.
//!
//! Order matters: field validation, then the rate limiter, then the planner.
//! A denied or malformed request never reaches the store or the upstream.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tandem_core::protocol::{encode_update, ServerMessage};
use tandem_core::Engine;
use tracing::{info, warn};

use crate::planner::Viewport;
use crate::AppState;

/// Sender id for frames the server itself originates. No connection ever
/// gets this id, so the echo filter never drops them.
pub const SERVER_SENDER: &str = "server";

/// Explicit OPTIONS answer; browser preflights are handled by the CORS
/// layer before they reach the router.
pub async fn options_command() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn handle_command(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(command) = body
        .get("command")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
    else {
        return bad_request("command is required");
    };
    let Some(user_id) = body
        .get("userId")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
    else {
        return bad_request("userId is required");
    };
    let viewport: Option<Viewport> = body
        .get("viewport")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());

    let decision = state.limiter.check(user_id);
    if !decision.allowed {
        let retry_after = decision.retry_after_seconds.unwrap_or(1);
        info!("Rate limited {}: retry in {}s", user_id, retry_after);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "error": "Rate limit exceeded. Try again later.",
                "retryAfter": retry_after,
            })),
        );
    }

    let Some(planner) = &state.planner else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Automation is not configured: set OPENAI_API_KEY" })),
        );
    };

    // Snapshot the shapes for the prompt, then release the lock for the
    // duration of the upstream call.
    let shapes = state.store.lock().await.list();

    let plan = match planner.plan(command, &shapes, viewport.as_ref()).await {
        Ok(plan) => plan,
        Err(err) => {
            warn!("Planning failed for {}: {}", user_id, err);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            );
        }
    };

    if plan.is_empty() {
        return (
            StatusCode::OK,
            Json(json!({
                "success": false,
                "error": "The model produced no canvas operations for this command.",
            })),
        );
    }

    let outcomes = {
        let mut store = state.store.lock().await;
        let outcomes = Engine::new().execute_all(&mut store, &plan);
        match store.updates_since_checkpoint() {
            Ok(bytes) if !bytes.is_empty() => {
                state.broadcast(
                    SERVER_SENDER,
                    ServerMessage::Sync {
                        from: SERVER_SENDER.to_string(),
                        data: encode_update(&bytes),
                    },
                );
            }
            Ok(_) => {}
            Err(err) => warn!("Export after automation failed: {}", err),
        }
        outcomes
    };

    let applied = outcomes.iter().filter(|o| o.success).count();
    info!(
        "Automation for {}: {} tool call(s), {} applied",
        user_id,
        plan.len(),
        applied
    );

    (
        StatusCode::OK,
        Json(json!({ "success": true, "toolsToExecute": plan })),
    )
}

fn bad_request(message: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}
