//! API service routes

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::{TypedHeader, headers::Cookie};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    error::{ApiError, ApiResult},
    middleware::{SESSION_COOKIE, admin_middleware},
    state::AppState,
};

/// Long keystroke timelines exceed axum's default body limit
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Create the router for the API service
pub fn create_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/sessions", get(admin_sessions))
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/session/:id", get(admin_session))
        .route("/api/admin/download/:id", get(admin_download))
        .route("/api/admin/export", get(admin_export))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/save-data", post(save_data))
        .route("/api/save-data", post(save_data))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/admin/login", post(admin_login))
        .route("/api/admin/logout", post(admin_logout))
        .route("/api/admin/validate-token", get(validate_token))
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let writable = common::storage::health_check(state.store.root())
        .await
        .unwrap_or(false);

    Json(json!({
        "status": if writable { "ok" } else { "degraded" },
        "service": "api-service",
        "validationMode": state.gateway.mode().to_string(),
    }))
}

/// Accept a session in any of the supported payload shapes
pub async fn save_data(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed JSON: {}", e)))?;

    let session = state.gateway.normalize(payload).map_err(|e| {
        warn!("Rejected session payload: {}", e);
        e
    })?;

    let filename = state
        .store
        .append(&session.session_type, &session.record)
        .await?;
    info!(
        "Stored {} session {} as {}",
        session.session_type,
        session.session_id(),
        filename
    );

    Ok(Json(json!({
        "success": true,
        "message": "Data saved successfully",
        "sessionId": session.session_id(),
        "filename": filename,
    })))
}

/// Every stored session record
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let records: Vec<Value> = state
        .store
        .list()
        .await?
        .into_iter()
        .map(|session| session.record)
        .collect();

    Ok(Json(records))
}

/// One stored session record by id
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .store
        .find(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    Ok(Json(session.record))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.username != state.config.admin_username
        || payload.password != state.config.admin_password
    {
        warn!("Failed admin login for {}", payload.username);
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.admin.issue().await;
    let cookie = format!(
        "{}={}; HttpOnly; Max-Age={}; SameSite=Lax; Path=/",
        SESSION_COOKIE,
        token,
        state.admin.ttl().as_secs()
    );

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::BadRequest(e.to_string()))?,
    );

    Ok((
        headers,
        Json(json!({ "success": true, "message": "Login successful" })),
    ))
}

pub async fn admin_logout(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> impl IntoResponse {
    if let Some(token) = cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE))
    {
        state.admin.revoke(token).await;
    }

    let cookie = format!("{}=; HttpOnly; Max-Age=0; SameSite=Lax; Path=/", SESSION_COOKIE);
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "success": true })),
    )
}

pub async fn validate_token(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> impl IntoResponse {
    let valid = match cookies
        .as_ref()
        .and_then(|TypedHeader(cookies)| cookies.get(SESSION_COOKIE))
    {
        Some(token) => state.admin.is_valid(token).await,
        None => false,
    };

    let status = if valid {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    };
    (status, Json(json!({ "success": valid, "valid": valid })))
}

pub async fn admin_sessions(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.summaries().await?))
}

pub async fn admin_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.stats().await?))
}

pub async fn admin_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .store
        .find(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "data": session.record,
        "sessionId": id,
        "filename": session.filename,
        "downloadUrl": format!("/api/admin/download/{}", id),
    })))
}

pub async fn admin_download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let session = state
        .store
        .find(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;
    let body = state.store.read_raw(&session.filename).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", session.filename),
            ),
        ],
        body,
    ))
}

pub async fn admin_export(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let archive = state.store.export_zip().await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"export-data.zip\"",
            ),
        ],
        archive,
    ))
}
