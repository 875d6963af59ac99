//! HTTP routes: token exchange, users, restaurants, orders.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, SET_COOKIE};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{clear_token_cookie, token_cookie, AuthUser};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{Collection, Filter};
use crate::types::Document;
use crate::ws;

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/", get(root))
        // Liveness check.
        .route("/healthz", get(healthz))
        // Realtime relay.
        .route("/ws", get(ws::ws_handler))
        // Token exchange.
        .route("/jwt", post(issue_token))
        .route("/logout", delete(logout))
        // Users.
        .route("/users", post(create_user))
        .route("/users/isBlocked/{email}", get(user_block_status))
        .route("/users/block-req-one/{email}", patch(block_user))
        // Catalogue and orders.
        .route("/restaurants", post(create_restaurant))
        .route("/orders", post(create_order))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(cors_origins(origins)))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
}

/// Header values for the CORS allow-list. Credentialed CORS cannot use a
/// wildcard, so `*` is dropped along with unparsable entries.
fn cors_origins(origins: &[String]) -> Vec<HeaderValue> {
    origins
        .iter()
        .filter_map(|o| {
            if o == "*" {
                warn!("ignoring wildcard CORS origin; list origins explicitly");
                return None;
            }
            match HeaderValue::from_str(o) {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "ignoring invalid CORS origin");
                    None
                }
            }
        })
        .collect()
}

async fn root() -> &'static str {
    "Food Swift Server is running"
}

async fn healthz() -> &'static str {
    "ok"
}

// ═══════════════════════════════════════════════════════════════
// Token exchange
// ═══════════════════════════════════════════════════════════════

/// POST /jwt — sign whatever claims the client sends into a cookie.
async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(claims): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let token = state.tokens.issue(claims)?;
    let cookie = token_cookie(&token, state.config.mode);
    Ok(([(SET_COOKIE, cookie)], Json(json!({ "success": true }))))
}

/// DELETE /logout
async fn logout(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cookie = clear_token_cookie(state.config.mode);
    ([(SET_COOKIE, cookie)], Json(json!({ "success": true })))
}

// ═══════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════

/// POST /users — insert unless the email is already taken.
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(user): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    let email = user
        .get("email")
        .and_then(Value::as_str)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| AppError::BadRequest("Email is required".into()))?
        .to_string();

    let existing = state
        .store
        .find_one(Collection::Users, &Filter::eq("email", email.as_str()))
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest("Email already exists".into()));
    }

    let result = state.store.insert_one(Collection::Users, user).await?;
    info!(email = %email, "user created");
    Ok((StatusCode::CREATED, Json(result)))
}

/// GET /users/isBlocked/{email}
async fn user_block_status(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .store
        .find_one(Collection::Users, &Filter::eq("email", email))
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    let is_block = user.get("isBlock").cloned().unwrap_or(Value::Null);
    Ok(Json(json!({ "isBlock": is_block })))
}

/// PATCH /users/block-req-one/{email}
async fn block_user(
    State(state): State<Arc<AppState>>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let mut set = Document::new();
    set.insert("isBlock".into(), Value::Bool(true));

    let result = state
        .store
        .update_one(Collection::Users, &Filter::eq("email", email.as_str()), set)
        .await?;
    if result.matched_count == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }
    info!(email = %email, "user blocked");
    Ok(Json(result))
}

// ═══════════════════════════════════════════════════════════════
// Restaurants & orders
// ═══════════════════════════════════════════════════════════════

/// POST /restaurants
async fn create_restaurant(
    State(state): State<Arc<AppState>>,
    Json(mut restaurant): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    restaurant.insert("createdAt".into(), Value::from(Utc::now().timestamp_millis()));
    let result = state
        .store
        .insert_one(Collection::Restaurants, restaurant)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

/// POST /orders — cookie-authenticated. New orders start as pending.
async fn create_order(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
    Json(mut order): Json<Document>,
) -> Result<impl IntoResponse, AppError> {
    order.insert("createdAt".into(), Value::String(Utc::now().to_rfc3339()));
    order.insert("status".into(), Value::String("pending".into()));

    let result = state.store.insert_one(Collection::Orders, order).await?;
    info!(
        order_id = %result.inserted_id,
        by = claims.email.as_deref().unwrap_or("-"),
        "order placed"
    );
    Ok((StatusCode::CREATED, Json(result)))
}
